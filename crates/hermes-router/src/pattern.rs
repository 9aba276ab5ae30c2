//! Path pattern compilation and matching.
//!
//! A pattern is split on `/` into segments:
//!
//! | Syntax | Segment | Matches |
//! |--------|---------|---------|
//! | `users` | literal | exactly `users` |
//! | `:id` or `{id}` | parameter | any single segment, bound as `id` |
//! | `*` or `*rest` | wildcard | zero or more trailing segments |
//!
//! A wildcard must be the last segment.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::params::Params;

/// How a pattern is compared to a request path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// The whole path must match the pattern.
    #[serde(alias = "EQUALS")]
    Exact,
    /// The path must start with the pattern's segments.
    #[default]
    #[serde(alias = "STARTS_WITH")]
    Prefix,
}

/// A single compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Literal(String),
    /// Named parameter bound positionally.
    Param(String),
    /// Trailing catch-all, optionally bound to a name.
    Wildcard(Option<String>),
}

/// Error raised when a pattern cannot be compiled.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    /// A wildcard appears before the last segment.
    #[error("wildcard must be the last segment of '{0}'")]
    WildcardNotLast(String),
    /// A parameter has no name.
    #[error("unnamed parameter in '{0}'")]
    UnnamedParam(String),
}

/// A compiled path pattern.
///
/// # Example
///
/// ```rust
/// use hermes_router::{Operator, PathPattern};
///
/// let pattern: PathPattern = "/products/:productId".parse().unwrap();
///
/// let params = pattern.matches("/products/42/reviews", Operator::Prefix).unwrap();
/// assert_eq!(params.get("productId"), Some("42"));
///
/// assert!(pattern.matches("/products/42/reviews", Operator::Exact).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a pattern.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let parts: Vec<&str> = split(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (index, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix('*') {
                if index + 1 != parts.len() {
                    return Err(PatternError::WildcardNotLast(raw.to_string()));
                }
                let name = name.trim_start_matches('*');
                Segment::Wildcard((!name.is_empty()).then(|| name.to_string()))
            } else if let Some(name) = part
                .strip_prefix(':')
                .or_else(|| part.strip_prefix('{').and_then(|p| p.strip_suffix('}')))
            {
                if name.is_empty() {
                    return Err(PatternError::UnnamedParam(raw.to_string()));
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal((*part).to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the `/` pattern, which has no segments.
    #[must_use]
    pub fn root() -> Self {
        Self {
            raw: "/".to_string(),
            segments: Vec::new(),
        }
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the compiled segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Matches `path`, returning the bound parameters on success.
    #[must_use]
    pub fn matches(&self, path: &str, operator: Operator) -> Option<Params> {
        let parts: Vec<&str> = split(path).collect();
        let mut params = Params::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard(name) => {
                    if let Some(name) = name {
                        let rest = parts.get(index..).unwrap_or_default().join("/");
                        params.push(name.as_str(), rest);
                    }
                    return Some(params);
                }
                Segment::Literal(literal) => {
                    if parts.get(index) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(index)?;
                    params.push(name.as_str(), *value);
                }
            }
        }

        match operator {
            Operator::Exact if parts.len() != self.segments.len() => None,
            _ => Some(params),
        }
    }

    /// Returns the rank of this pattern under `operator`.
    #[must_use]
    pub fn specificity(&self, operator: Operator) -> Specificity {
        let mut specificity = Specificity {
            literals: 0,
            params: 0,
            segments: 0,
            exact: operator == Operator::Exact,
        };
        for segment in &self.segments {
            match segment {
                Segment::Literal(_) => {
                    specificity.literals += 1;
                    specificity.segments += 1;
                }
                Segment::Param(_) => {
                    specificity.params += 1;
                    specificity.segments += 1;
                }
                Segment::Wildcard(_) => {}
            }
        }
        specificity
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for PathPattern {}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for PathPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PathPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(<D::Error as serde::de::Error>::custom)
    }
}

/// Rank of a matching pattern; greater is more specific.
///
/// Compared lexicographically by literal segments, then parameter segments,
/// then total non-wildcard segments, then EXACT over PREFIX. Wildcards add
/// nothing, so they rank below any literal or parameter at the same depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Specificity {
    literals: usize,
    params: usize,
    segments: usize,
    exact: bool,
}

impl Specificity {
    /// Rank of a selector without any path constraint.
    pub const NONE: Self = Self {
        literals: 0,
        params: 0,
        segments: 0,
        exact: false,
    };
}

impl Ord for Specificity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.literals
            .cmp(&other.literals)
            .then(self.params.cmp(&other.params))
            .then(self.segments.cmp(&other.segments))
            .then(self.exact.cmp(&other.exact))
    }
}

impl PartialOrd for Specificity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
