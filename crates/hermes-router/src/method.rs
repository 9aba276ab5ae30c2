//! HTTP method sets attached to path selectors.

use http::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Set of HTTP methods a path selector accepts.
///
/// An empty set accepts every method, which is what a selector declaring
/// `methods: []` means.
///
/// # Example
///
/// ```rust
/// use hermes_router::MethodSet;
/// use http::Method;
///
/// let methods = MethodSet::new().with(Method::GET).with(Method::HEAD);
/// assert!(methods.allows(&Method::GET));
/// assert!(!methods.allows(&Method::POST));
///
/// assert!(MethodSet::any().allows(&Method::DELETE));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSet {
    methods: Vec<Method>,
}

impl MethodSet {
    /// Creates an empty set (accepting every method).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set accepting every method.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Adds a method.
    #[must_use]
    pub fn with(mut self, method: Method) -> Self {
        self.insert(method);
        self
    }

    /// Adds a method if not already present.
    pub fn insert(&mut self, method: Method) {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
    }

    /// Returns true if `method` is accepted.
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Returns true if the set accepts every method.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.methods.is_empty()
    }

    /// Iterates over the declared methods.
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut set = Self::new();
        for method in iter {
            set.insert(method);
        }
        set
    }
}

impl Serialize for MethodSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.methods.iter().map(Method::as_str))
    }
}

impl<'de> Deserialize<'de> for MethodSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names
            .iter()
            .map(|name| {
                Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                    .map_err(|_| <D::Error as serde::de::Error>::custom(format!("invalid HTTP method '{name}'")))
            })
            .collect()
    }
}
