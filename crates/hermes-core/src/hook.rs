//! Processor hooks.
//!
//! Hooks observe every unit a chain executes. They are attached when the
//! chain is built and never change while it runs.

use std::sync::Arc;

use crate::context::{ExecutionContext, RequestId};
use crate::error::{ExecutionFailure, GatewayError};
use crate::outcome::{UnitOutcome, UnitResult};
use crate::phase::ExecutionPhase;

/// Stateless cross-cutting observer invoked around each unit of a chain.
///
/// Every method has an empty default so hooks only implement what they need.
/// `unit` is the id of the unit being executed (policy name, processor id).
///
/// # Example
///
/// ```
/// use hermes_core::{ExecutionContext, ExecutionPhase, ProcessorHook};
///
/// struct Announce;
///
/// impl ProcessorHook for Announce {
///     fn id(&self) -> &str {
///         "announce"
///     }
///
///     fn pre(&self, unit: &str, _ctx: &ExecutionContext, phase: ExecutionPhase) {
///         println!("running {unit} on {phase}");
///     }
/// }
/// ```
pub trait ProcessorHook: Send + Sync + 'static {
    /// Unique id of this hook.
    fn id(&self) -> &str;

    /// Called before the unit runs.
    fn pre(&self, _unit: &str, _ctx: &ExecutionContext, _phase: ExecutionPhase) {}

    /// Called after the unit asked to continue.
    fn post(&self, _unit: &str, _ctx: &ExecutionContext, _phase: ExecutionPhase) {}

    /// Called after the unit failed unexpectedly.
    fn error(
        &self,
        _unit: &str,
        _ctx: &ExecutionContext,
        _phase: ExecutionPhase,
        _error: &GatewayError,
    ) {
    }

    /// Called after the unit interrupted the chain with its own response.
    fn interrupt(&self, _unit: &str, _ctx: &ExecutionContext, _phase: ExecutionPhase) {}

    /// Called after the unit interrupted the chain with a failure payload.
    fn interrupt_with(
        &self,
        _unit: &str,
        _ctx: &ExecutionContext,
        _phase: ExecutionPhase,
        _failure: &ExecutionFailure,
    ) {
    }

    /// Called instead of any outcome when the request was dropped while the
    /// unit ran (client gone, server timeout).
    fn cancelled(&self, _unit: &str, _request_id: RequestId, _phase: ExecutionPhase) {}
}

/// Ordered set of hooks attached to a chain, unique by id.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn ProcessorHook>>,
}

impl HookChain {
    /// Creates an empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook; a hook with an id already present is ignored.
    #[must_use]
    pub fn with(mut self, hook: Arc<dyn ProcessorHook>) -> Self {
        self.push(hook);
        self
    }

    /// Adds a hook; a hook with an id already present is ignored.
    pub fn push(&mut self, hook: Arc<dyn ProcessorHook>) {
        if self.hooks.iter().all(|existing| existing.id() != hook.id()) {
            self.hooks.push(hook);
        }
    }

    /// Adds every hook of `other`.
    pub fn extend(&mut self, other: &Self) {
        for hook in &other.hooks {
            self.push(Arc::clone(hook));
        }
    }

    /// Returns true if no hook is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Returns the number of hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns the ids of the attached hooks, in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(|hook| hook.id())
    }

    /// Notifies every hook that `unit` is about to run.
    pub fn before(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase) {
        for hook in &self.hooks {
            hook.pre(unit, ctx, phase);
        }
    }

    /// Notifies every hook of the result of `unit`.
    pub fn after(&self, unit: &str, ctx: &ExecutionContext, phase: ExecutionPhase, result: &UnitResult) {
        for hook in &self.hooks {
            match result {
                Ok(UnitOutcome::Continue) => hook.post(unit, ctx, phase),
                Ok(UnitOutcome::Interrupt) => hook.interrupt(unit, ctx, phase),
                Ok(UnitOutcome::InterruptWith(failure)) => {
                    hook.interrupt_with(unit, ctx, phase, failure);
                }
                Err(error) => hook.error(unit, ctx, phase, error),
            }
        }
    }

    /// Notifies [`before`](Self::before) and returns a guard that reports the
    /// outcome on [`UnitGuard::finish`], or `cancelled` if it is dropped first.
    pub fn start<'a>(
        &'a self,
        unit: &'a str,
        ctx: &ExecutionContext,
        phase: ExecutionPhase,
    ) -> UnitGuard<'a> {
        self.before(unit, ctx, phase);
        UnitGuard {
            hooks: self,
            unit,
            request_id: ctx.request_id(),
            phase,
            finished: false,
        }
    }
}

/// A unit that hooks saw start and have not yet seen finish.
#[must_use = "dropping the guard reports the unit as cancelled"]
pub struct UnitGuard<'a> {
    hooks: &'a HookChain,
    unit: &'a str,
    request_id: RequestId,
    phase: ExecutionPhase,
    finished: bool,
}

impl UnitGuard<'_> {
    /// Reports `result` to every hook.
    pub fn finish(mut self, ctx: &ExecutionContext, result: &UnitResult) {
        self.finished = true;
        self.hooks.after(self.unit, ctx, self.phase, result);
    }
}

impl Drop for UnitGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for hook in &self.hooks.hooks {
            hook.cancelled(self.unit, self.request_id, self.phase);
        }
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
