//! Prometheus metrics for Hermes.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `hermes_chain_executions_total` | Counter | `chain`, `phase`, `outcome` | Chain runs by outcome |
//! | `hermes_chain_unit_duration_seconds` | Histogram | `chain`, `unit`, `phase` | Time spent in one policy or processor |
//! | `hermes_policy_instantiation_failures_total` | Counter | `policy` | Declarations dropped at chain build |
//! | `hermes_requests_total` | Counter | `api`, `plan`, `application`, `status` | Reported requests |
//!
//! Recording functions are safe to call before [`init_metrics`]; the
//! `metrics` facade discards values until a recorder is installed.

use hermes_core::{ChainOutcome, ExecutionPhase};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Counter of chain executions.
pub const CHAIN_EXECUTIONS_TOTAL: &str = "hermes_chain_executions_total";
/// Histogram of unit durations.
pub const CHAIN_UNIT_DURATION_SECONDS: &str = "hermes_chain_unit_duration_seconds";
/// Counter of dropped policy declarations.
pub const POLICY_INSTANTIATION_FAILURES_TOTAL: &str = "hermes_policy_instantiation_failures_total";
/// Counter of reported requests.
pub const REQUESTS_TOTAL: &str = "hermes_requests_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address of the Prometheus scrape listener (e.g. "0.0.0.0:9090").
    pub addr: String,

    /// Service name, exported as a global label.
    pub service_name: String,

    /// Buckets for unit durations, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: "0.0.0.0:9090".to_string(),
            service_name: "hermes".to_string(),
            // 100us .. 1s; policies are expected to be fast
            duration_buckets: vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ],
        }
    }
}

/// Renders the metrics of an installed Prometheus recorder.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Wraps a recorder handle.
    #[must_use]
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Returns the registry of the globally installed recorder, if any.
    #[must_use]
    pub fn global() -> Option<Self> {
        METRICS_HANDLE.get().cloned().map(Self::new)
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Installs the Prometheus recorder.
///
/// Does nothing when `config.enabled` is false. The embedding gateway serves
/// scrapes through [`render_metrics`] or [`MetricsRegistry::render`].
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let handle = PrometheusBuilder::new()
        .with_http_listener(addr)
        .add_global_label("service", config.service_name.clone())
        .set_buckets(&config.duration_buckets)
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

/// Renders the global recorder, `None` before [`init_metrics`].
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Registers descriptions of the standard metrics with the current recorder.
pub fn describe_metrics() {
    describe_counter!(CHAIN_EXECUTIONS_TOTAL, "Policy and processor chain executions by outcome");
    describe_histogram!(
        CHAIN_UNIT_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent executing one policy or processor"
    );
    describe_counter!(
        POLICY_INSTANTIATION_FAILURES_TOTAL,
        "Policy declarations dropped because they could not be instantiated"
    );
    describe_counter!(REQUESTS_TOTAL, "Requests reported by the API reactor");
}

/// Returns the `outcome` label of a chain result.
#[must_use]
pub const fn outcome_label(outcome: &ChainOutcome) -> &'static str {
    match outcome {
        ChainOutcome::Completed => "completed",
        ChainOutcome::Interrupted(_) => "interrupted",
        ChainOutcome::Failed(_) => "failed",
    }
}

/// Records one chain execution.
pub fn record_chain_execution(chain: &str, phase: ExecutionPhase, outcome: &ChainOutcome) {
    counter!(
        CHAIN_EXECUTIONS_TOTAL,
        "chain" => chain.to_string(),
        "phase" => phase.to_string(),
        "outcome" => outcome_label(outcome)
    )
    .increment(1);
}

/// Records the duration of one unit.
pub fn record_unit_duration(chain: &str, unit: &str, phase: ExecutionPhase, duration: Duration) {
    histogram!(
        CHAIN_UNIT_DURATION_SECONDS,
        "chain" => chain.to_string(),
        "unit" => unit.to_string(),
        "phase" => phase.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a reported request.
pub fn record_request(api: &str, plan: &str, application: &str, status: u16) {
    counter!(
        REQUESTS_TOTAL,
        "api" => api.to_string(),
        "plan" => plan.to_string(),
        "application" => application.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
