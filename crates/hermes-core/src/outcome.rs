//! Typed results of units and chains.

use crate::error::{ExecutionFailure, GatewayError};

/// What a single unit (policy, processor, invoker) asks the chain to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Proceed with the next unit.
    Continue,
    /// Stop the chain; the unit already left a well-formed response in place.
    Interrupt,
    /// Stop the chain and render the given failure as the response.
    InterruptWith(ExecutionFailure),
}

impl UnitOutcome {
    /// Returns true when the chain should stop.
    #[must_use]
    pub const fn is_interrupt(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// Result returned by every unit. `Err` is an unexpected failure.
pub type UnitResult = Result<UnitOutcome, GatewayError>;

/// Terminal result of executing a whole chain.
///
/// `Interrupted` is a successful-shaped stop (the request was correctly
/// rejected); `Failed` means the gateway broke.
#[derive(Debug)]
pub enum ChainOutcome {
    /// Every unit ran and asked to continue.
    Completed,
    /// A unit stopped the chain on purpose.
    Interrupted(Option<ExecutionFailure>),
    /// A unit failed unexpectedly; remaining units were skipped.
    Failed(GatewayError),
}

impl ChainOutcome {
    /// Returns true if the chain ran to completion.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the chain was interrupted.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Returns true if the chain failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Interrupted(_) => "interrupted",
            Self::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_unit_outcome_interrupt() {
        assert!(!UnitOutcome::Continue.is_interrupt());
        assert!(UnitOutcome::Interrupt.is_interrupt());
        assert!(UnitOutcome::InterruptWith(ExecutionFailure::new(StatusCode::FORBIDDEN)).is_interrupt());
    }

    #[test]
    fn test_chain_outcome_labels() {
        assert_eq!(ChainOutcome::Completed.label(), "completed");
        assert_eq!(ChainOutcome::Interrupted(None).label(), "interrupted");
        assert_eq!(
            ChainOutcome::Failed(GatewayError::internal("x")).label(),
            "failed"
        );
    }
}
