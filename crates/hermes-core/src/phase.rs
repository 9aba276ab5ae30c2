//! Execution phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of processing for a chain.
///
/// Inbound phases run policies in resolution order; outbound phases run them
/// in the exact reverse order so that every policy unwraps what it wrapped.
///
/// # Example
///
/// ```
/// use hermes_core::ExecutionPhase;
///
/// assert!(ExecutionPhase::Request.is_inbound());
/// assert!(ExecutionPhase::Response.is_outbound());
/// assert_eq!(ExecutionPhase::MessageResponse.name(), "message_response");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    /// Request on its way to the backend.
    Request,
    /// Response on its way back to the client.
    Response,
    /// Message published by the client (message-style APIs).
    MessageRequest,
    /// Message delivered to a subscriber (message-style APIs).
    MessageResponse,
}

impl ExecutionPhase {
    /// Returns true for phases processed in resolution order.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::Request | Self::MessageRequest)
    }

    /// Returns true for phases processed in reverse resolution order.
    #[must_use]
    pub const fn is_outbound(self) -> bool {
        !self.is_inbound()
    }

    /// Returns the phase name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::MessageRequest => "message_request",
            Self::MessageResponse => "message_response",
        }
    }

    /// Returns the phase processing the other direction of the same exchange.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Request => Self::Response,
            Self::Response => Self::Request,
            Self::MessageRequest => Self::MessageResponse,
            Self::MessageResponse => Self::MessageRequest,
        }
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
