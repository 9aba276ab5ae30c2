//! Path parameters bound by a pattern match.
//!
//! Parameters are bound positionally: the request segment at index `i` is
//! stored under the name declared by the pattern segment at index `i`.

use smallvec::SmallVec;

/// Number of bindings kept inline before spilling to the heap.
const INLINE_PARAMS: usize = 4;

/// Ordered `(name, value)` bindings produced by a path match.
///
/// # Example
///
/// ```rust
/// use hermes_router::Params;
///
/// let mut params = Params::new();
/// params.push("productId", "42");
///
/// assert_eq!(params.get("productId"), Some("42"));
/// assert!(params.contains("productId"));
/// assert_eq!(params.get("other"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    bindings: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a binding.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bindings.push((name.into(), value.into()));
    }

    /// Returns the first value bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Iterates over the bindings in match order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.bindings
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
