//! Path pattern matching for Hermes flow selectors.
//!
//! Flow selectors declare a path pattern plus an operator. This crate compiles
//! those patterns, matches request paths against them, binds path parameters
//! positionally and ranks matching patterns by specificity for best-match
//! flow selection.
//!
//! # Features
//!
//! - **EXACT / PREFIX operators**: whole-path or segment-aligned prefix matching
//! - **Path Parameters**: `:id` and `{id}` segments bound by position
//! - **Wildcards**: trailing `*` / `*rest` catch-alls
//! - **Specificity**: a total order used to pick the most specific match
//! - **Method Sets**: HTTP method filters where empty means "any"
//!
//! # Example
//!
//! ```rust
//! use hermes_router::{MethodSet, Operator, PathPattern};
//! use http::Method;
//!
//! let users: PathPattern = "/users/:id".parse().unwrap();
//! let catch_all: PathPattern = "/users/*".parse().unwrap();
//!
//! let params = users.matches("/users/123", Operator::Exact).unwrap();
//! assert_eq!(params.get("id"), Some("123"));
//!
//! // Both match; the parameter pattern is more specific than the wildcard.
//! assert!(catch_all.matches("/users/123", Operator::Prefix).is_some());
//! assert!(users.specificity(Operator::Exact) > catch_all.specificity(Operator::Prefix));
//!
//! let methods = MethodSet::new().with(Method::GET);
//! assert!(methods.allows(&Method::GET));
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod method;
mod params;
mod pattern;

pub use method::MethodSet;
pub use params::Params;
pub use pattern::{Operator, PathPattern, PatternError, Segment, Specificity};
