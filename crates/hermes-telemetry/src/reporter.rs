//! Request reporting sink.
//!
//! The reactor hands one [`RequestReport`] per request to a [`Reporter`].
//! Reporting is fire-and-forget: a reporter never influences the response.

use hermes_core::attributes::{APPLICATION, PLAN, SUBSCRIPTION_ID};
use hermes_core::{ExecutionContext, RequestId};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::record_request;

/// Caller identity and outcome of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReport {
    /// Request id.
    pub request_id: RequestId,
    /// Deployed API id.
    pub api: String,
    /// `plan` attribute, empty when absent.
    pub plan: String,
    /// `application` attribute, empty when absent.
    pub application: String,
    /// `subscriptionId` attribute, empty when absent.
    pub subscription_id: String,
    /// Final response status.
    pub status: u16,
    /// Time since the context was created.
    pub elapsed: Duration,
}

impl RequestReport {
    /// Captures the report of `ctx` for `api`.
    pub fn from_context(api: &str, ctx: &ExecutionContext) -> Self {
        let attribute = |name: &str| ctx.attribute(name).unwrap_or_default().to_string();
        Self {
            request_id: ctx.request_id(),
            api: api.to_string(),
            plan: attribute(PLAN),
            application: attribute(APPLICATION),
            subscription_id: attribute(SUBSCRIPTION_ID),
            status: ctx.response().status().as_u16(),
            elapsed: ctx.elapsed(),
        }
    }
}

/// Receives request reports.
pub trait Reporter: Send + Sync + 'static {
    /// Consumes one report.
    fn report(&self, report: &RequestReport);
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn report(&self, report: &RequestReport) {
        (**self).report(report);
    }
}

/// Turns reports into `hermes_requests_total` samples and a log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsReporter;

impl Reporter for MetricsReporter {
    fn report(&self, report: &RequestReport) {
        record_request(&report.api, &report.plan, &report.application, report.status);
        tracing::debug!(
            request_id = %report.request_id,
            api = %report.api,
            plan = %report.plan,
            application = %report.application,
            subscription = %report.subscription_id,
            status = report.status,
            elapsed_ms = report.elapsed.as_millis(),
            "request reported"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_report_from_context() {
        let mut ctx = ExecutionContext::builder()
            .attribute(PLAN, "gold")
            .attribute(APPLICATION, "app-1")
            .build();
        *ctx.response_mut().status_mut() = StatusCode::ACCEPTED;

        let report = RequestReport::from_context("echo", &ctx);

        assert_eq!(report.api, "echo");
        assert_eq!(report.plan, "gold");
        assert_eq!(report.application, "app-1");
        assert_eq!(report.subscription_id, "");
        assert_eq!(report.status, 202);
        assert_eq!(report.request_id, ctx.request_id());
    }

    #[test]
    fn test_metrics_reporter_counts() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let ctx = ExecutionContext::builder().attribute(PLAN, "silver").build();
        let report = RequestReport::from_context("echo", &ctx);

        metrics::with_local_recorder(&recorder, || {
            let reporter: Arc<dyn Reporter> = Arc::new(MetricsReporter);
            reporter.report(&report);
        });

        assert!(handle.render().contains(r#"plan="silver""#));
    }
}
