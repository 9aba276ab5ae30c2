//! Plan and subscription attribution.
//!
//! Runs before any flow is resolved and fixes the caller identity attributes
//! (`plan`, `application`, `subscriptionId`) that plan flows and policies key
//! off. The security layer is external: it leaves either a
//! [`ResolvedSubscription`] or a [`SecuritySkip`] marker on the context.

use hermes_core::attributes::{
    ANONYMOUS_APPLICATION, ANONYMOUS_PLAN, APPLICATION, CLIENT_IDENTIFIER, PLAN, SUBSCRIPTION_ID,
};
use hermes_core::{BoxFuture, ExecutionContext, ExecutionPhase, UnitOutcome, UnitResult};
use http::header::{HeaderName, HeaderValue};

use crate::processor::Processor;

/// Default header carrying a caller-chosen client identifier.
pub const DEFAULT_CLIENT_IDENTIFIER_HEADER: &str = "x-hermes-client-identifier";

/// Subscription value used when the remote address is unknown.
const UNKNOWN_REMOTE: &str = "unknown";

/// Marker extension: the request bypassed security.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecuritySkip;

/// Extension left by the security layer once it identified the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubscription {
    /// Plan id.
    pub plan: String,
    /// Application id.
    pub application: String,
    /// Subscription id.
    pub subscription_id: String,
}

impl ResolvedSubscription {
    /// Creates a resolved subscription.
    pub fn new(
        plan: impl Into<String>,
        application: impl Into<String>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            plan: plan.into(),
            application: application.into(),
            subscription_id: subscription_id.into(),
        }
    }
}

/// Attaches caller identity attributes to the context.
///
/// # Example
///
/// ```
/// use hermes_core::attributes::{PLAN, SUBSCRIPTION_ID};
/// use hermes_core::{ExecutionContext, ExecutionPhase};
/// use hermes_policy::{Processor, SecuritySkip, SubscriptionProcessor};
///
/// # tokio_test::block_on(async {
/// let mut ctx = ExecutionContext::builder()
///     .remote_address("10.0.0.7:5123".parse().unwrap())
///     .build();
/// ctx.set_extension(SecuritySkip);
///
/// SubscriptionProcessor::new().execute(&mut ctx, ExecutionPhase::Request).await.unwrap();
///
/// assert_eq!(ctx.attribute(PLAN), Some("1"));
/// assert_eq!(ctx.attribute(SUBSCRIPTION_ID), Some("10.0.0.7"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct SubscriptionProcessor {
    client_identifier_header: HeaderName,
}

impl SubscriptionProcessor {
    /// Creates a processor reading the default client identifier header.
    pub fn new() -> Self {
        Self {
            client_identifier_header: HeaderName::from_static(DEFAULT_CLIENT_IDENTIFIER_HEADER),
        }
    }

    /// Reads the client identifier from `header` instead.
    #[must_use]
    pub fn with_client_identifier_header(mut self, header: HeaderName) -> Self {
        self.client_identifier_header = header;
        self
    }

    /// Returns the client identifier header.
    pub const fn client_identifier_header(&self) -> &HeaderName {
        &self.client_identifier_header
    }

    /// Decides `plan`, `application` and `subscriptionId`.
    ///
    /// With [`SecuritySkip`] present the sentinel identities are written and
    /// nothing the security layer left is consulted.
    pub fn attribute(&self, ctx: &mut ExecutionContext) {
        if ctx.get_extension::<SecuritySkip>().is_some() {
            let remote = ctx
                .remote_address()
                .map_or_else(|| UNKNOWN_REMOTE.to_string(), |addr| addr.ip().to_string());
            ctx.set_attribute(PLAN, ANONYMOUS_PLAN);
            ctx.set_attribute(APPLICATION, ANONYMOUS_APPLICATION);
            ctx.set_attribute(SUBSCRIPTION_ID, remote);
        } else if let Some(subscription) = ctx.get_extension::<ResolvedSubscription>().cloned() {
            ctx.set_attribute(PLAN, subscription.plan);
            ctx.set_attribute(APPLICATION, subscription.application);
            ctx.set_attribute(SUBSCRIPTION_ID, subscription.subscription_id);
        }

        let client_identifier = ctx
            .request()
            .headers()
            .get(&self.client_identifier_header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| ctx.attribute(SUBSCRIPTION_ID).map(str::to_string))
            .unwrap_or_else(|| ctx.request_id().to_string());

        if let Ok(value) = HeaderValue::from_str(&client_identifier) {
            ctx.response_mut()
                .headers_mut()
                .insert(self.client_identifier_header.clone(), value);
        }
        tracing::trace!(
            request_id = %ctx.request_id(),
            plan = ?ctx.attribute(PLAN),
            application = ?ctx.attribute(APPLICATION),
            %client_identifier,
            "request attributed"
        );
        ctx.set_attribute(CLIENT_IDENTIFIER, client_identifier);
    }
}

impl Default for SubscriptionProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for SubscriptionProcessor {
    fn id(&self) -> &str {
        "subscription"
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        _phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult> {
        Box::pin(async move {
            self.attribute(ctx);
            Ok(UnitOutcome::Continue)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "192.168.1.20:40000".parse().unwrap()
    }

    #[test]
    fn test_skip_overrides_prior_attributes() {
        let mut ctx = ExecutionContext::builder()
            .remote_address(addr())
            .attribute(PLAN, "gold")
            .attribute(APPLICATION, "app-9")
            .attribute(SUBSCRIPTION_ID, "sub-9")
            .build();
        ctx.set_extension(SecuritySkip);
        ctx.set_extension(ResolvedSubscription::new("silver", "app-2", "sub-2"));

        SubscriptionProcessor::new().attribute(&mut ctx);

        assert_eq!(ctx.attribute(PLAN), Some(ANONYMOUS_PLAN));
        assert_eq!(ctx.attribute(APPLICATION), Some(ANONYMOUS_APPLICATION));
        assert_eq!(ctx.attribute(SUBSCRIPTION_ID), Some("192.168.1.20"));
    }

    #[test]
    fn test_copies_resolved_subscription() {
        let mut ctx = ExecutionContext::builder().remote_address(addr()).build();
        ctx.set_extension(ResolvedSubscription::new("gold", "app-1", "sub-1"));

        SubscriptionProcessor::new().attribute(&mut ctx);

        assert_eq!(ctx.attribute(PLAN), Some("gold"));
        assert_eq!(ctx.attribute(APPLICATION), Some("app-1"));
        assert_eq!(ctx.attribute(SUBSCRIPTION_ID), Some("sub-1"));
        assert_eq!(ctx.attribute(CLIENT_IDENTIFIER), Some("sub-1"));
    }

    #[test]
    fn test_keeps_existing_attributes_without_security_output() {
        let mut ctx = ExecutionContext::builder().attribute(PLAN, "bronze").build();

        SubscriptionProcessor::new().attribute(&mut ctx);

        assert_eq!(ctx.attribute(PLAN), Some("bronze"));
        assert_eq!(ctx.attribute(SUBSCRIPTION_ID), None);
        assert_eq!(
            ctx.attribute(CLIENT_IDENTIFIER).map(str::to_string),
            Some(ctx.request_id().to_string())
        );
    }

    #[test]
    fn test_client_identifier_header_wins_and_is_echoed() {
        let header = HeaderName::from_static("x-client");
        let mut ctx = ExecutionContext::builder()
            .header(header.clone(), HeaderValue::from_static("mobile-app"))
            .build();
        ctx.set_extension(ResolvedSubscription::new("gold", "app-1", "sub-1"));

        SubscriptionProcessor::new()
            .with_client_identifier_header(header.clone())
            .attribute(&mut ctx);

        assert_eq!(ctx.attribute(CLIENT_IDENTIFIER), Some("mobile-app"));
        assert_eq!(ctx.response().headers()[&header], "mobile-app");
    }

    #[test]
    fn test_skip_without_remote_address() {
        let mut ctx = ExecutionContext::builder().build();
        ctx.set_extension(SecuritySkip);

        SubscriptionProcessor::new().attribute(&mut ctx);

        assert_eq!(ctx.attribute(SUBSCRIPTION_ID), Some(UNKNOWN_REMOTE));
    }
}
