//! The root [`HermesConfig`] type and its builder.

use hermes_flow::FlowMode;
use hermes_telemetry::LogFormat;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, DeploymentSection, FlowsSection, GatewaySection, TelemetrySection};

/// Complete gateway configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and environment
/// variables over the defaults.
///
/// # Example
///
/// ```
/// use hermes_config::HermesConfig;
///
/// let config = HermesConfig::default();
/// assert!(config.gateway.sharding_tags.is_empty());
/// assert_eq!(config.deployment.debounce_ms, 500);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct HermesConfig {
    /// Gateway-wide settings.
    #[serde(default)]
    pub gateway: GatewaySection,

    /// Flow resolution settings.
    #[serde(default)]
    pub flows: FlowsSection,

    /// Definition sources.
    #[serde(default)]
    pub deployment: DeploymentSection,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl HermesConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> HermesConfigBuilder {
        HermesConfigBuilder::new()
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the metrics address does not
    /// parse, the log level is empty, the debounce is zero, the client
    /// identifier header is not a valid header name or watching is enabled
    /// without a definitions path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let metrics = &self.telemetry.metrics;
        if metrics.enabled && metrics.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", metrics.addr),
            ));
        }

        if self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("telemetry.logging.level", "must not be empty"));
        }

        if self.deployment.debounce_ms == 0 {
            return Err(ConfigError::invalid_value(
                "deployment.debounce_ms",
                "must be greater than zero",
            ));
        }

        if self.deployment.watch && self.deployment.definitions_path.is_none() {
            return Err(ConfigError::validation_error(
                "deployment.definitions_path must be set when deployment.watch is enabled",
            ));
        }

        if http_header_name_is_invalid(&self.gateway.client_identifier_header) {
            return Err(ConfigError::invalid_value(
                "gateway.client_identifier_header",
                format!("not a header name: {}", self.gateway.client_identifier_header),
            ));
        }

        Ok(())
    }

    /// Development preset: pretty debug logs, no metrics exporter, hot reload.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi = true;
        config.telemetry.metrics.enabled = false;
        config.deployment.watch = true;
        config.deployment.debounce_ms = 200;
        config.deployment.definitions_path = Some("api.yaml".into());
        config
    }

    /// Production preset: JSON logs, metrics on, best-match API flows.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;
        config.flows.mode = FlowMode::BestMatch;
        config
    }
}

// RFC 7230 token characters.
fn http_header_name_is_invalid(name: &str) -> bool {
    name.is_empty()
        || !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
}

/// Builder for [`HermesConfig`].
#[derive(Debug, Default)]
pub struct HermesConfigBuilder {
    config: HermesConfig,
}

impl HermesConfigBuilder {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway section.
    #[must_use]
    pub fn gateway(mut self, gateway: GatewaySection) -> Self {
        self.config.gateway = gateway;
        self
    }

    /// Sets the flows section.
    #[must_use]
    pub fn flows(mut self, flows: FlowsSection) -> Self {
        self.config.flows = flows;
        self
    }

    /// Sets the deployment section.
    #[must_use]
    pub fn deployment(mut self, deployment: DeploymentSection) -> Self {
        self.config.deployment = deployment;
        self
    }

    /// Sets the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Builds without validating.
    #[must_use]
    pub fn build(self) -> HermesConfig {
        self.config
    }

    /// Builds and validates.
    ///
    /// # Errors
    ///
    /// Returns the first failed constraint of [`HermesConfig::validate`].
    pub fn build_validated(self) -> Result<HermesConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
