//! Processor hooks that observe chains for logs and metrics.

use dashmap::DashMap;
use hermes_core::{
    ExecutionContext, ExecutionFailure, ExecutionPhase, GatewayError, ProcessorHook, RequestId,
};
use std::time::Instant;

use crate::metrics::record_unit_duration;

type UnitKey = (RequestId, String, ExecutionPhase);

/// Records `hermes_chain_unit_duration_seconds` for every unit it observes.
///
/// `chain` is the label value written on every sample; attach one hook per
/// kind of chain (`policy`, `processor`, `invoker`).
#[derive(Debug)]
pub struct MetricsHook {
    id: String,
    chain: String,
    started: DashMap<UnitKey, Instant>,
}

impl MetricsHook {
    /// Creates a hook labelling samples with `chain`.
    pub fn new(chain: impl Into<String>) -> Self {
        let chain = chain.into();
        Self {
            id: format!("metrics-{chain}"),
            chain,
            started: DashMap::new(),
        }
    }

    /// Returns the number of units started but not finished.
    pub fn pending(&self) -> usize {
        self.started.len()
    }

    fn finish(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        if let Some((_, started)) = self
            .started
            .remove(&(ctx.request_id(), unit.to_string(), phase))
        {
            record_unit_duration(&self.chain, unit, phase, started.elapsed());
        }
    }
}

impl ProcessorHook for MetricsHook {
    fn id(&self) -> &str {
        &self.id
    }

    fn pre(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        self.started
            .insert((ctx.request_id(), unit.to_string(), phase), Instant::now());
    }

    fn post(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        self.finish(unit, ctx, phase);
    }

    fn error(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase, _error: &GatewayError) {
        self.finish(unit, ctx, phase);
    }

    fn interrupt(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        self.finish(unit, ctx, phase);
    }

    fn interrupt_with(
        &self,
        unit: &str,
        ctx: &ExecutionContext,
        phase: ExecutionPhase,
        _failure: &ExecutionFailure,
    ) {
        self.finish(unit, ctx, phase);
    }

    fn cancelled(&self, unit: &str, request_id: RequestId, phase: ExecutionPhase) {
        self.started.remove(&(request_id, unit.to_string(), phase));
    }
}

/// Logs every unit transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

impl ProcessorHook for LoggingHook {
    fn id(&self) -> &str {
        "logging"
    }

    fn pre(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        tracing::trace!(request_id = %ctx.request_id(), %unit, %phase, "unit started");
    }

    fn post(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        tracing::trace!(request_id = %ctx.request_id(), %unit, %phase, "unit completed");
    }

    fn error(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase, error: &GatewayError) {
        tracing::warn!(request_id = %ctx.request_id(), %unit, %phase, %error, "unit failed");
    }

    fn interrupt(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        tracing::debug!(request_id = %ctx.request_id(), %unit, %phase, "unit interrupted the chain");
    }

    fn interrupt_with(
        &self,
        unit: &str,
        ctx: &ExecutionContext,
        phase: ExecutionPhase,
        failure: &ExecutionFailure,
    ) {
        tracing::debug!(
            request_id = %ctx.request_id(),
            %unit,
            %phase,
            status = failure.status().as_u16(),
            key = ?failure.key_ref(),
            "unit interrupted the chain with a failure"
        );
    }

    fn cancelled(&self, unit: &str, request_id: RequestId, phase: ExecutionPhase) {
        tracing::debug!(%request_id, %unit, %phase, "unit cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{HookChain, UnitOutcome};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_metrics_hook_records_durations() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let hook = Arc::new(MetricsHook::new("policy"));
        let hooks = HookChain::new().with(hook.clone()).with(Arc::new(LoggingHook));
        let ctx = ExecutionContext::builder().build();

        metrics::with_local_recorder(&recorder, || {
            hooks.before("rate-limit", &ctx, ExecutionPhase::Request);
            assert_eq!(hook.pending(), 1);
            hooks.after("rate-limit", &ctx, ExecutionPhase::Request, &Ok(UnitOutcome::Continue));
        });

        assert_eq!(hook.pending(), 0);
        let rendered = handle.render();
        assert!(rendered.contains("hermes_chain_unit_duration_seconds"));
        assert!(rendered.contains(r#"unit="rate-limit""#));
        assert!(rendered.contains(r#"chain="policy""#));
    }

    #[test]
    fn test_failures_also_finish_units() {
        let hook = MetricsHook::new("processor");
        let ctx = ExecutionContext::builder().build();

        hook.pre("attribution", &ctx, ExecutionPhase::Request);
        hook.error(
            "attribution",
            &ctx,
            ExecutionPhase::Request,
            &GatewayError::internal("boom"),
        );
        hook.pre("auth", &ctx, ExecutionPhase::Request);
        hook.interrupt("auth", &ctx, ExecutionPhase::Request);

        assert_eq!(hook.pending(), 0);
    }

    #[tokio::test]
    async fn test_dropped_unit_is_not_left_pending() {
        let hook = Arc::new(MetricsHook::new("policy"));
        let hooks = HookChain::new().with(hook.clone());
        let ctx = ExecutionContext::builder().build();

        let stalled = async {
            let unit = hooks.start("slow-backend", &ctx, ExecutionPhase::Request);
            std::future::pending::<()>().await;
            unit.finish(&ctx, &Ok(UnitOutcome::Continue));
        };
        let timed_out = tokio::time::timeout(Duration::from_millis(10), stalled).await;

        assert!(timed_out.is_err());
        assert_eq!(hook.pending(), 0);
    }

    #[test]
    fn test_hook_ids_are_distinct_per_chain() {
        let hooks = HookChain::new()
            .with(Arc::new(MetricsHook::new("policy")))
            .with(Arc::new(MetricsHook::new("processor")))
            .with(Arc::new(LoggingHook));
        assert_eq!(hooks.len(), 3);
    }
}
