//! Combined logging and metrics settings.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;

/// What [`init_telemetry`](crate::init_telemetry) installs.
///
/// The service name is stamped onto both subsystems when the value is built,
/// so log lines and the metrics endpoint always agree on it.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Gateway instance name.
    pub service_name: String,

    /// Prometheus recorder settings.
    pub metrics: MetricsConfig,

    /// Subscriber settings.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Starts from the defaults.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfigBuilder::default().build()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    metrics: MetricsConfig,
    logging: LogConfig,
}

impl TelemetryConfigBuilder {
    /// Names the gateway instance. Defaults to `hermes`.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Replaces the metrics settings.
    #[must_use]
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.metrics = config;
        self
    }

    /// Replaces the logging settings.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = config;
        self
    }

    /// Turns the Prometheus recorder off.
    #[must_use]
    pub fn without_metrics(mut self) -> Self {
        self.metrics.enabled = false;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let Self {
            service_name,
            mut metrics,
            mut logging,
        } = self;
        let service_name = service_name.unwrap_or_else(|| "hermes".to_string());
        metrics.service_name.clone_from(&service_name);
        logging.service_name.clone_from(&service_name);

        TelemetryConfig {
            service_name,
            metrics,
            logging,
        }
    }
}
