//! Backend invocation.
//!
//! The invoker sits between the inbound and outbound chains. It fills the
//! response (or fails) and runs wrapped by the invoker hooks like any other
//! unit.

use hermes_core::{
    BoxFuture, ExecutionContext, ExecutionPhase, GatewayResult, UnitOutcome, UnitResult,
};
use hermes_policy::Processor;
use std::sync::Arc;

/// Calls the backend of a request.
///
/// # Example
///
/// ```
/// use hermes::invoker::Invoker;
/// use hermes_core::{BoxFuture, ExecutionContext, GatewayResult};
/// use http::StatusCode;
///
/// struct Accepted;
///
/// impl Invoker for Accepted {
///     fn invoke<'a>(&'a self, ctx: &'a mut ExecutionContext) -> BoxFuture<'a, GatewayResult<()>> {
///         Box::pin(async move {
///             *ctx.response_mut().status_mut() = StatusCode::ACCEPTED;
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Invoker: Send + Sync + 'static {
    /// Returns the invoker id seen by hooks.
    fn id(&self) -> &str {
        "invoker"
    }

    /// Invokes the backend and writes its response into `ctx`.
    fn invoke<'a>(&'a self, ctx: &'a mut ExecutionContext) -> BoxFuture<'a, GatewayResult<()>>;
}

impl<I: Invoker + ?Sized> Invoker for Arc<I> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn invoke<'a>(&'a self, ctx: &'a mut ExecutionContext) -> BoxFuture<'a, GatewayResult<()>> {
        (**self).invoke(ctx)
    }
}

/// Invoker leaving the response untouched.
///
/// Used by message-style APIs and by gateways that only run policies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInvoker;

impl Invoker for NoopInvoker {
    fn id(&self) -> &str {
        "noop-invoker"
    }

    fn invoke<'a>(&'a self, _ctx: &'a mut ExecutionContext) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Invoker backed by a synchronous closure.
pub struct FnInvoker<F> {
    id: String,
    func: F,
}

impl<F> FnInvoker<F>
where
    F: Fn(&mut ExecutionContext) -> GatewayResult<()> + Send + Sync + 'static,
{
    /// Creates a closure invoker named `id`.
    pub fn new(id: impl Into<String>, func: F) -> Self {
        Self {
            id: id.into(),
            func,
        }
    }
}

impl<F> Invoker for FnInvoker<F>
where
    F: Fn(&mut ExecutionContext) -> GatewayResult<()> + Send + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    fn invoke<'a>(&'a self, ctx: &'a mut ExecutionContext) -> BoxFuture<'a, GatewayResult<()>> {
        Box::pin(async move { (self.func)(ctx) })
    }
}

impl<F> std::fmt::Debug for FnInvoker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvoker").field("id", &self.id).finish()
    }
}

/// Runs an invoker as a processor so it gets the processor hook protocol.
pub(crate) struct InvokerProcessor {
    invoker: Arc<dyn Invoker>,
}

impl InvokerProcessor {
    pub(crate) fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }
}

impl Processor for InvokerProcessor {
    fn id(&self) -> &str {
        self.invoker.id()
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        _phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult> {
        Box::pin(async move {
            self.invoker.invoke(ctx).await?;
            Ok(UnitOutcome::Continue)
        })
    }
}
