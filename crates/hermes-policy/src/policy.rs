//! The executable policy unit.
//!
//! A [`Policy`] is the runtime counterpart of a declared flow step. It runs
//! against the mutable [`ExecutionContext`] and reports how the chain should
//! proceed through a [`UnitResult`]:
//!
//! - `Ok(UnitOutcome::Continue)` advances to the next policy
//! - `Ok(UnitOutcome::Interrupt)` stops the chain; the policy already wrote the response
//! - `Ok(UnitOutcome::InterruptWith(failure))` stops the chain with a failure payload
//! - `Err(error)` fails the chain
//!
//! # Example
//!
//! ```
//! use hermes_core::{BoxFuture, ExecutionContext, ExecutionPhase, UnitOutcome, UnitResult};
//! use hermes_policy::Policy;
//!
//! struct AddHeader;
//!
//! impl Policy for AddHeader {
//!     fn id(&self) -> &str {
//!         "add-header"
//!     }
//!
//!     fn execute<'a>(
//!         &'a self,
//!         ctx: &'a mut ExecutionContext,
//!         _phase: ExecutionPhase,
//!     ) -> BoxFuture<'a, UnitResult> {
//!         Box::pin(async move {
//!             ctx.response_mut()
//!                 .headers_mut()
//!                 .insert("x-gateway", http::HeaderValue::from_static("hermes"));
//!             Ok(UnitOutcome::Continue)
//!         })
//!     }
//! }
//! ```

use hermes_core::{BoxFuture, ExecutionContext, ExecutionPhase, UnitOutcome, UnitResult};
use hermes_flow::ExpressionConditionEvaluator;
use std::sync::Arc;

/// A runtime-instantiated unit of a policy chain.
pub trait Policy: Send + Sync + 'static {
    /// Returns the policy name, used by hooks, logs and metrics.
    fn id(&self) -> &str;

    /// Runs the policy for `phase`.
    ///
    /// The future may suspend on I/O; it must not block the worker thread.
    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult>;
}

/// A policy built from a synchronous closure.
///
/// # Example
///
/// ```
/// use hermes_core::{UnitOutcome, ExecutionFailure};
/// use hermes_policy::FnPolicy;
/// use http::StatusCode;
///
/// let deny = FnPolicy::new("deny-all", |_ctx, _phase| {
///     Ok(UnitOutcome::InterruptWith(ExecutionFailure::new(StatusCode::FORBIDDEN)))
/// });
/// ```
pub struct FnPolicy<F> {
    id: String,
    func: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&mut ExecutionContext, ExecutionPhase) -> UnitResult + Send + Sync + 'static,
{
    /// Creates a closure policy named `id`.
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

impl<F> Policy for FnPolicy<F>
where
    F: Fn(&mut ExecutionContext, ExecutionPhase) -> UnitResult + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult> {
        Box::pin(async move { (self.func)(ctx, phase) })
    }
}

impl<F> std::fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPolicy").field("id", &self.id).finish()
    }
}

/// Wraps a policy with a step condition evaluated at execution time.
///
/// When the condition is not provably true the inner policy is skipped and
/// the chain continues.
pub struct ConditionalPolicy {
    inner: Arc<dyn Policy>,
    condition: String,
}

impl ConditionalPolicy {
    /// Guards `inner` with `condition`.
    pub fn new(inner: Arc<dyn Policy>, condition: impl Into<String>) -> Self {
        Self {
            inner,
            condition: condition.into(),
        }
    }

    /// Returns the guarding expression.
    pub fn condition(&self) -> &str {
        &self.condition
    }
}

impl Policy for ConditionalPolicy {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult> {
        Box::pin(async move {
            if ExpressionConditionEvaluator.evaluate_expression(ctx, Some(&self.condition)) {
                self.inner.execute(ctx, phase).await
            } else {
                tracing::debug!(
                    policy = %self.inner.id(),
                    condition = %self.condition,
                    %phase,
                    "policy condition not met, skipping"
                );
                Ok(UnitOutcome::Continue)
            }
        })
    }
}

impl std::fmt::Debug for ConditionalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalPolicy")
            .field("policy", &self.inner.id())
            .field("condition", &self.condition)
            .finish()
    }
}
