//! Typed configuration for the Hermes gateway engine.
//!
//! - TOML and JSON configuration files, strict (unknown fields fail)
//! - Layered loading: defaults → file → `HERMES__SECTION__KEY` environment
//! - JSON and YAML flow definition documents
//! - Hot redeployment of definitions through a file watcher
//!
//! # Configuration File Format
//!
//! ```toml
//! [gateway]
//! sharding_tags = ["eu", "!internal"]
//! client_identifier_header = "x-hermes-client-identifier"
//!
//! [flows]
//! mode = "best_match"
//! plan_match_required = false
//! api_match_required = false
//!
//! [deployment]
//! definitions_path = "/etc/hermes/api.yaml"
//! watch = true
//! debounce_ms = 500
//!
//! [telemetry]
//! service_name = "edge-gateway"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Example
//!
//! ```no_run
//! use hermes_config::ConfigLoader;
//!
//! # fn main() -> Result<(), hermes_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("hermes.toml")?
//!     .with_default_env()
//!     .load()?;
//!
//! if let Some(path) = &config.deployment.definitions_path {
//!     let api = hermes_config::load_api_definition(path)?;
//!     println!("deploying {}", api.id);
//! }
//! # Ok(())
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod definition;
mod error;
mod loader;
mod schema;
mod watcher;

pub use config::{HermesConfig, HermesConfigBuilder};
pub use definition::{load_api_definition, load_deployment, load_organization_definition};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    DeploymentSection, FlowsSection, GatewaySection, LoggingSection, MetricsSection,
    TelemetrySection, DEFAULT_CLIENT_IDENTIFIER_HEADER,
};
pub use watcher::{DefinitionWatcher, DefinitionWatcherBuilder, DeploymentListener};

pub use hermes_telemetry::LogFormat;
