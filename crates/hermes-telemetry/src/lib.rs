//! Observability for the Hermes gateway engine.
//!
//! - **Logging**: `tracing-subscriber` with an `EnvFilter`, JSON or pretty output
//! - **Metrics**: Prometheus exposition through the `metrics` facade
//! - **Hooks**: [`MetricsHook`] and [`LoggingHook`] observe every policy and processor
//! - **Reporting**: [`Reporter`] sink fed once per request by the reactor
//!
//! # Example
//!
//! ```rust,ignore
//! use hermes_telemetry::{init_telemetry, MetricsConfig, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::builder()
//!         .service_name("edge-gateway")
//!         .metrics(MetricsConfig { addr: "0.0.0.0:9090".into(), ..MetricsConfig::default() })
//!         .build();
//!
//!     init_telemetry(&config).expect("telemetry");
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod metrics;
pub mod reporter;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use hooks::{LoggingHook, MetricsHook};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{
    init_metrics, record_chain_execution, render_metrics, MetricsConfig, MetricsRegistry,
};
pub use reporter::{MetricsReporter, Reporter, RequestReport};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Installs logging, then metrics.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    Ok(())
}
