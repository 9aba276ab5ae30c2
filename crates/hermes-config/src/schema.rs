//! Configuration schema types.
//!
//! Every section rejects unknown fields and fills missing ones with defaults.

use hermes_flow::{FlowMode, TagFilter};
use hermes_telemetry::{LogConfig, LogFormat, MetricsConfig, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default header carrying a caller-chosen client identifier.
pub const DEFAULT_CLIENT_IDENTIFIER_HEADER: &str = "x-hermes-client-identifier";

/// Gateway-wide settings.
///
/// # Example
///
/// ```
/// use hermes_config::GatewaySection;
///
/// let section: GatewaySection = toml::from_str(r#"sharding_tags = ["eu", "!internal"]"#).unwrap();
/// assert_eq!(section.sharding_tags.len(), 2);
/// assert_eq!(section.client_identifier_header, "x-hermes-client-identifier");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    /// Sharding tags this gateway serves; `!tag` excludes. Empty means no constraint.
    #[serde(default)]
    pub sharding_tags: Vec<String>,

    /// Request header read for the client identifier.
    #[serde(default = "default_client_identifier_header")]
    pub client_identifier_header: String,
}

impl GatewaySection {
    /// Returns the parsed sharding tag constraint.
    pub fn tag_filter(&self) -> TagFilter {
        TagFilter::new(&self.sharding_tags)
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            sharding_tags: Vec::new(),
            client_identifier_header: default_client_identifier_header(),
        }
    }
}

fn default_client_identifier_header() -> String {
    DEFAULT_CLIENT_IDENTIFIER_HEADER.to_string()
}

/// Flow resolution settings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FlowsSection {
    /// Narrowing mode for organization flows, and for API flows whose
    /// definition does not choose one.
    #[serde(default)]
    pub mode: FlowMode,

    /// Only plan flows with a path or channel selector are eligible.
    #[serde(default)]
    pub plan_match_required: bool,

    /// Only API flows with a path or channel selector are eligible.
    #[serde(default)]
    pub api_match_required: bool,
}

/// Where flow definitions come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSection {
    /// API definition file (`.json`, `.yaml` or `.yml`).
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,

    /// Organization definition file, same formats.
    #[serde(default)]
    pub organization_path: Option<PathBuf>,

    /// Redeploy when a definition file changes.
    #[serde(default)]
    pub watch: bool,

    /// Quiet period before a change is redeployed, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl DeploymentSection {
    /// Returns the debounce period.
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for DeploymentSection {
    fn default() -> Self {
        Self {
            definitions_path: None,
            organization_path: None,
            watch: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether logging is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Colorize pretty output.
    #[serde(default)]
    pub ansi: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            ansi: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Whether the Prometheus exporter is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Scrape listener address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name used by logs and metrics.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl TelemetrySection {
    /// Converts the section into the settings `hermes-telemetry` installs.
    pub fn to_telemetry_config(&self) -> TelemetryConfig {
        let logging = LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.logging.format,
            ansi: self.logging.ansi,
            ..LogConfig::default()
        };
        let metrics = MetricsConfig {
            enabled: self.metrics.enabled,
            addr: self.metrics.addr.clone(),
            ..MetricsConfig::default()
        };
        TelemetryConfig::builder()
            .service_name(&self.service_name)
            .logging(logging)
            .metrics(metrics)
            .build()
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            logging: LoggingSection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

fn default_service_name() -> String {
    "hermes".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_section_default() {
        let section = GatewaySection::default();
        assert!(section.sharding_tags.is_empty());
        assert!(section.tag_filter().is_empty());
        assert_eq!(section.client_identifier_header, DEFAULT_CLIENT_IDENTIFIER_HEADER);
    }

    #[test]
    fn test_gateway_section_unknown_field_rejected() {
        let result: Result<GatewaySection, _> = toml::from_str("shard = [\"eu\"]");
        assert!(result.is_err());
    }

    #[test]
    fn test_flows_section_mode() {
        let section: FlowsSection =
            toml::from_str("mode = \"best_match\"\nplan_match_required = true").unwrap();
        assert_eq!(section.mode, FlowMode::BestMatch);
        assert!(section.plan_match_required);
        assert!(!section.api_match_required);
    }

    #[test]
    fn test_deployment_section_default() {
        let section = DeploymentSection::default();
        assert_eq!(section.definitions_path, None);
        assert!(!section.watch);
        assert_eq!(section.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_log_format_deserialize() {
        let section: LoggingSection = toml::from_str("format = \"pretty\"").unwrap();
        assert_eq!(section.format, LogFormat::Pretty);
        assert_eq!(section.level, "info");
        assert!(section.enabled);
    }

    #[test]
    fn test_to_telemetry_config() {
        let section = TelemetrySection {
            service_name: "edge".to_string(),
            logging: LoggingSection {
                level: "debug".to_string(),
                ..LoggingSection::default()
            },
            metrics: MetricsSection {
                enabled: false,
                addr: "127.0.0.1:9464".to_string(),
            },
        };

        let config = section.to_telemetry_config();

        assert_eq!(config.service_name, "edge");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.service_name, "edge");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.addr, "127.0.0.1:9464");
    }
}
