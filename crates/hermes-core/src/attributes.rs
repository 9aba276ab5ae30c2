//! Well-known context attribute keys.
//!
//! Attribute values are strings by contract. Policies such as rate limiting
//! key off the caller identity attributes below.

/// Plan the request was attributed to.
pub const PLAN: &str = "plan";

/// Application the request was attributed to.
pub const APPLICATION: &str = "application";

/// Subscription the request was attributed to.
pub const SUBSCRIPTION_ID: &str = "subscriptionId";

/// Client identifier derived during attribution.
pub const CLIENT_IDENTIFIER: &str = "client-identifier";

/// Deployed API the request targets.
pub const API: &str = "api";

/// Sentinel plan identifier used when security was skipped.
pub const ANONYMOUS_PLAN: &str = "1";

/// Sentinel application identifier used when security was skipped.
pub const ANONYMOUS_APPLICATION: &str = "1";
