//! Error types for Hermes.
//!
//! Two kinds of early termination leave a chain, and they must never be
//! confused:
//!
//! - [`GatewayError`] is an unexpected failure. The chain that produced it
//!   transitions to `Failed` and whatever response state was already in place
//!   is what the client receives.
//! - [`ExecutionFailure`] is the well-formed payload of an intentional
//!   interruption (access denied, quota exceeded). The interrupting unit owns
//!   the status and body.
//!
//! Resolution mismatches, condition evaluation failures and policy
//! instantiation failures are absorbed inside the engine and never surface
//! as either type.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::Response;

/// Result type alias using [`GatewayError`].
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid deployed definition or policy configuration.
    Validation,
    /// Internal engine or policy failure.
    Internal,
    /// Backend (invoker) failure.
    External,
    /// Backend did not answer in time.
    Timeout,
    /// Gateway is draining or otherwise unable to serve.
    Unavailable,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Standard error type for the Hermes engine.
///
/// # Example
///
/// ```
/// use hermes_core::{ErrorCategory, GatewayError};
///
/// let error = GatewayError::policy_execution("rate-limit", "counter store unreachable");
/// assert_eq!(error.category(), ErrorCategory::Internal);
/// assert_eq!(error.policy(), Some("rate-limit"));
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A policy raised an unexpected failure while executing.
    #[error("Policy '{policy}' failed: {message}")]
    PolicyExecution {
        /// Name of the failing policy.
        policy: String,
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A policy could not be instantiated from its declaration.
    #[error("Policy '{policy}' could not be instantiated: {message}")]
    PolicyInstantiation {
        /// Name of the policy.
        policy: String,
        /// Human-readable error message.
        message: String,
    },

    /// An expression could not be evaluated where a value was required.
    #[error("Expression evaluation failed: {0}")]
    Evaluation(#[from] crate::expression::EvaluationError),

    /// A deployed definition is malformed.
    #[error("Invalid definition: {message}")]
    InvalidDefinition {
        /// Human-readable error message.
        message: String,
    },

    /// The backend invoker failed.
    #[error("Invoker error: {message}")]
    Invoker {
        /// Human-readable error message.
        message: String,
        /// Whether the failure was a timeout.
        timed_out: bool,
        /// The underlying error.
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Internal engine error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl GatewayError {
    /// Creates a policy execution error.
    #[must_use]
    pub fn policy_execution(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PolicyExecution {
            policy: policy.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a policy execution error with a source error.
    pub fn policy_execution_with_source(
        policy: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::PolicyExecution {
            policy: policy.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a policy instantiation error.
    #[must_use]
    pub fn policy_instantiation(policy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PolicyInstantiation {
            policy: policy.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid definition error.
    #[must_use]
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Creates an invoker error.
    #[must_use]
    pub fn invoker(message: impl Into<String>) -> Self {
        Self::Invoker {
            message: message.into(),
            timed_out: false,
            source: None,
        }
    }

    /// Creates an invoker timeout error.
    #[must_use]
    pub fn invoker_timeout(message: impl Into<String>) -> Self {
        Self::Invoker {
            message: message.into(),
            timed_out: true,
            source: None,
        }
    }

    /// Creates an invoker error with a source error.
    pub fn invoker_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Invoker {
            message: message.into(),
            timed_out: false,
            source: Some(source.into()),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::PolicyExecution { .. } | Self::Evaluation(_) | Self::Internal { .. } => {
                ErrorCategory::Internal
            }
            Self::PolicyInstantiation { .. } | Self::InvalidDefinition { .. } => {
                ErrorCategory::Validation
            }
            Self::Invoker {
                timed_out: true, ..
            } => ErrorCategory::Timeout,
            Self::Invoker { .. } => ErrorCategory::External,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns the name of the policy involved, if any.
    #[must_use]
    pub fn policy(&self) -> Option<&str> {
        match self {
            Self::PolicyExecution { policy, .. } | Self::PolicyInstantiation { policy, .. } => {
                Some(policy)
            }
            _ => None,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::PolicyExecution { .. } => "POLICY_EXECUTION_ERROR",
            Self::PolicyInstantiation { .. } => "POLICY_INSTANTIATION_ERROR",
            Self::Evaluation(_) => "EVALUATION_ERROR",
            Self::InvalidDefinition { .. } => "INVALID_DEFINITION",
            Self::Invoker {
                timed_out: true, ..
            } => "GATEWAY_TIMEOUT",
            Self::Invoker { .. } => "BAD_GATEWAY",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Converts this error into the failure payload sent to the client.
    ///
    /// The message is deliberately generic: internal details stay in logs.
    #[must_use]
    pub fn to_failure(&self) -> ExecutionFailure {
        let status = self.status_code();
        ExecutionFailure::new(status)
            .key(self.error_code())
            .message(status.canonical_reason().unwrap_or("Gateway error"))
    }
}

/// Payload of an intentional, well-formed chain interruption.
///
/// The interrupting unit decides the status, an optional machine key (used
/// for response templates), a message and optional template parameters.
///
/// # Example
///
/// ```
/// use hermes_core::ExecutionFailure;
/// use http::StatusCode;
///
/// let failure = ExecutionFailure::new(StatusCode::FORBIDDEN)
///     .key("IP_FILTERED")
///     .message("Your IP is not allowed")
///     .parameter("ip", "10.0.0.1");
///
/// assert_eq!(failure.status(), StatusCode::FORBIDDEN);
/// assert_eq!(failure.key_ref(), Some("IP_FILTERED"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    status: StatusCode,
    key: Option<String>,
    message: Option<String>,
    content_type: Option<String>,
    parameters: HashMap<String, String>,
}

impl ExecutionFailure {
    /// Creates a failure with the given status code.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            key: None,
            message: None,
            content_type: None,
            parameters: HashMap::new(),
        }
    }

    /// Sets the machine-readable key.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the human-readable message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the content type of the message.
    ///
    /// When set, the message is written verbatim as the response body instead
    /// of being wrapped in a JSON envelope.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Adds a template parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the key, if any.
    #[must_use]
    pub fn key_ref(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns the message, if any.
    #[must_use]
    pub fn message_ref(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the content type, if any.
    #[must_use]
    pub fn content_type_ref(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the template parameters.
    #[must_use]
    pub const fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    /// Converts this failure to a serializable error envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self
                    .key
                    .clone()
                    .unwrap_or_else(|| default_code(self.status)),
                message: self
                    .message
                    .clone()
                    .or_else(|| self.status.canonical_reason().map(ToString::to_string))
                    .unwrap_or_default(),
                status: self.status.as_u16(),
                parameters: (!self.parameters.is_empty()).then(|| self.parameters.clone()),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Renders this failure into an HTTP response.
    #[must_use]
    pub fn to_response(&self, request_id: Option<&str>) -> Response {
        let (content_type, body) = match (&self.content_type, &self.message) {
            (Some(content_type), Some(message)) => (content_type.clone(), message.clone().into_bytes()),
            _ => (
                "application/json".to_string(),
                serde_json::to_vec(&self.to_envelope(request_id)).unwrap_or_default(),
            ),
        };

        let mut response = http::Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = self.status;
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        response
    }
}

fn default_code(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(|reason| reason.to_ascii_uppercase().replace(' ', "_"))
        .unwrap_or_else(|| status.as_str().to_string())
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// HTTP status code.
    pub status: u16,
    /// Template parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<HashMap<String, String>>,
}
