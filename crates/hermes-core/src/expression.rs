//! Expression backend boundary.
//!
//! Hermes never interprets expression languages itself. Conditions on flows
//! and steps are handed to an [`ExpressionBackend`] carried by the
//! [`ExecutionContext`](crate::ExecutionContext), and the engine only looks at
//! the resulting JSON value.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::context::ExecutionContext;

/// Failure raised by an expression backend on malformed input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// The expression could not be parsed.
    #[error("cannot parse expression '{expression}': {message}")]
    Parse {
        /// The offending expression.
        expression: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The expression produced a value of an unexpected type.
    #[error("expression '{expression}' did not produce a {expected}")]
    Type {
        /// The offending expression.
        expression: String,
        /// Expected type name.
        expected: &'static str,
    },

    /// The backend does not support expressions at all.
    #[error("expressions are not supported (got '{expression}')")]
    Unsupported {
        /// The expression that was submitted.
        expression: String,
    },
}

/// An expression language evaluated against the per-request context.
///
/// Implementations must be pure with respect to the context: evaluating an
/// expression never mutates request state.
///
/// # Example
///
/// ```
/// use hermes_core::{EvaluationError, ExecutionContext, ExpressionBackend};
/// use serde_json::Value;
///
/// struct AlwaysTrue;
///
/// impl ExpressionBackend for AlwaysTrue {
///     fn evaluate(&self, _expression: &str, _ctx: &ExecutionContext) -> Result<Value, EvaluationError> {
///         Ok(Value::Bool(true))
///     }
/// }
/// ```
pub trait ExpressionBackend: Send + Sync + 'static {
    /// Evaluates `expression` and returns its value.
    fn evaluate(
        &self,
        expression: &str,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, EvaluationError>;

    /// Returns a short name for logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Backend used when none is configured: every expression fails.
///
/// Combined with the condition evaluator this excludes every flow or step
/// that carries a condition, which is the safe default.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedExpressionBackend;

impl ExpressionBackend for UnsupportedExpressionBackend {
    fn evaluate(
        &self,
        expression: &str,
        _ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, EvaluationError> {
        Err(EvaluationError::Unsupported {
            expression: expression.to_string(),
        })
    }

    fn name(&self) -> &str {
        "unsupported"
    }
}

/// Evaluates `expression` and converts the value to `T`.
pub(crate) fn evaluate_as<T: DeserializeOwned>(
    backend: &dyn ExpressionBackend,
    expression: &str,
    ctx: &ExecutionContext,
) -> Result<T, EvaluationError> {
    let value = backend.evaluate(expression, ctx)?;
    serde_json::from_value(value).map_err(|_| EvaluationError::Type {
        expression: expression.to_string(),
        expected: std::any::type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_backend_rejects_everything() {
        let ctx = ExecutionContext::builder().build();
        let result = UnsupportedExpressionBackend.evaluate("true", &ctx);
        assert!(matches!(result, Err(EvaluationError::Unsupported { .. })));
    }

    #[test]
    fn test_evaluate_as_type_mismatch() {
        struct Number;
        impl ExpressionBackend for Number {
            fn evaluate(
                &self,
                _expression: &str,
                _ctx: &ExecutionContext,
            ) -> Result<serde_json::Value, EvaluationError> {
                Ok(serde_json::json!(42))
            }
        }

        let ctx = ExecutionContext::builder().build();
        assert_eq!(evaluate_as::<u32>(&Number, "x", &ctx), Ok(42));
        assert!(matches!(
            evaluate_as::<bool>(&Number, "x", &ctx),
            Err(EvaluationError::Type { .. })
        ));
    }
}
