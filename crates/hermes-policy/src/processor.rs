//! Processors and processor chains.
//!
//! A [`Processor`] is a named unit of request handling that is not a declared
//! policy: attribution, a whole flow chain, a custom step. A
//! [`ProcessorChain`] runs processors in order, one at a time, wrapping each
//! with the attached [`HookChain`]. Unlike a [`PolicyChain`](crate::PolicyChain)
//! it holds no per-request state and is reused across requests.

use hermes_core::{
    BoxFuture, ChainOutcome, ExecutionContext, ExecutionPhase, HookChain, UnitOutcome, UnitResult,
};
use std::sync::Arc;

use crate::chain::observe_connection;

/// A named unit executed by a [`ProcessorChain`].
pub trait Processor: Send + Sync + 'static {
    /// Returns the processor id, used by hooks and logs.
    fn id(&self) -> &str;

    /// Runs the processor.
    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult>;
}

/// Sequential executor of processors.
///
/// # Example
///
/// ```
/// use hermes_core::fixtures::{self, JsonLiteralBackend};
/// use hermes_core::{BoxFuture, ExecutionContext, ExecutionPhase, UnitOutcome, UnitResult};
/// use hermes_policy::{Processor, ProcessorChain};
/// use std::sync::Arc;
///
/// struct Stamp;
///
/// impl Processor for Stamp {
///     fn id(&self) -> &str {
///         "stamp"
///     }
///
///     fn execute<'a>(&'a self, ctx: &'a mut ExecutionContext, _: ExecutionPhase) -> BoxFuture<'a, UnitResult> {
///         Box::pin(async move {
///             ctx.set_attribute("stamped", "yes");
///             Ok(UnitOutcome::Continue)
///         })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let chain = ProcessorChain::builder("before-api").processor(Arc::new(Stamp)).build();
/// let mut ctx = fixtures::get("/", Arc::new(JsonLiteralBackend::new()));
///
/// assert!(chain.execute(&mut ctx, ExecutionPhase::Request).await.is_completed());
/// assert_eq!(ctx.attribute("stamped"), Some("yes"));
/// # });
/// ```
#[derive(Clone)]
pub struct ProcessorChain {
    id: String,
    processors: Vec<Arc<dyn Processor>>,
    hooks: HookChain,
}

impl ProcessorChain {
    /// Starts building a chain named `id`.
    pub fn builder(id: impl Into<String>) -> ProcessorChainBuilder {
        ProcessorChainBuilder {
            id: id.into(),
            processors: Vec::new(),
            hooks: HookChain::new(),
        }
    }

    /// Returns the chain id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the number of processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns true if the chain has no processor.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Returns the processor ids in execution order.
    pub fn processor_ids(&self) -> Vec<&str> {
        self.processors.iter().map(|processor| processor.id()).collect()
    }

    /// Runs every processor in order until one interrupts or fails.
    pub async fn execute(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> ChainOutcome {
        if !observe_connection(ctx, &self.id) {
            ctx.interrupt();
            return ChainOutcome::Interrupted(None);
        }

        for processor in &self.processors {
            let unit = self.hooks.start(processor.id(), ctx, phase);
            let result = processor.execute(ctx, phase).await;
            unit.finish(ctx, &result);

            match result {
                Ok(UnitOutcome::Continue) => {}
                Ok(UnitOutcome::Interrupt) => {
                    ctx.interrupt();
                    return ChainOutcome::Interrupted(ctx.failure().cloned());
                }
                Ok(UnitOutcome::InterruptWith(failure)) => {
                    ctx.interrupt_with(failure.clone());
                    return ChainOutcome::Interrupted(Some(failure));
                }
                Err(error) => {
                    tracing::error!(
                        chain = %self.id,
                        processor = %processor.id(),
                        %phase,
                        request_id = %ctx.request_id(),
                        error = %error,
                        "processor failed"
                    );
                    return ChainOutcome::Failed(error);
                }
            }
        }

        ChainOutcome::Completed
    }
}

impl std::fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("id", &self.id)
            .field("processors", &self.processor_ids())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builder for [`ProcessorChain`].
pub struct ProcessorChainBuilder {
    id: String,
    processors: Vec<Arc<dyn Processor>>,
    hooks: HookChain,
}

impl ProcessorChainBuilder {
    /// Appends a processor.
    #[must_use]
    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Appends several processors.
    #[must_use]
    pub fn processors(mut self, processors: impl IntoIterator<Item = Arc<dyn Processor>>) -> Self {
        self.processors.extend(processors);
        self
    }

    /// Attaches hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: HookChain) -> Self {
        self.hooks.extend(&hooks);
        self
    }

    /// Builds the chain.
    pub fn build(self) -> ProcessorChain {
        ProcessorChain {
            id: self.id,
            processors: self.processors,
            hooks: self.hooks,
        }
    }
}

impl std::fmt::Debug for ProcessorChainBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorChainBuilder")
            .field("id", &self.id)
            .field("processors", &self.processors.len())
            .finish_non_exhaustive()
    }
}
