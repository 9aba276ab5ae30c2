//! Errors raised while assembling a gateway.

use hermes_config::ConfigError;
use hermes_telemetry::TelemetryError;
use thiserror::Error;

/// Result alias for gateway assembly.
pub type HermesResult<T> = Result<T, HermesError>;

/// Failure while wiring configuration, telemetry and deployments together.
///
/// Request handling never returns this type: once assembled, the reactor
/// reports problems through chain outcomes and responses.
#[derive(Debug, Error)]
pub enum HermesError {
    /// Configuration or definition loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The configured client identifier header is not a valid header name.
    #[error("Invalid client identifier header '{0}'")]
    InvalidHeader(String),
}

impl HermesError {
    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader(name.into())
    }
}
