//! Flow chains: resolved flows of one scope executed as a policy chain.

use hermes_core::{
    BoxFuture, ChainOutcome, ExecutionContext, ExecutionPhase, UnitOutcome, UnitResult,
};
use hermes_flow::{Flow, FlowResolver, ResolvedPolicy};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::PolicyChain;
use crate::factory::PolicyChainFactory;
use crate::processor::Processor;

/// Flows resolved per flow chain, stored on the request context.
///
/// The request phase resolves and records; the response phase reads the same
/// flows back so that both directions run over one set.
#[derive(Debug, Default)]
pub struct ResolvedFlows {
    by_chain: HashMap<String, Vec<Arc<Flow>>>,
}

impl ResolvedFlows {
    /// Returns the flows recorded for `chain`.
    pub fn get(&self, chain: &str) -> Option<&[Arc<Flow>]> {
        self.by_chain.get(chain).map(Vec::as_slice)
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.by_chain.is_empty()
    }
}

/// Runs the flows of one scope (organization, plan or API) for a phase.
///
/// # Example
///
/// ```
/// use hermes_core::fixtures::{self, JsonLiteralBackend};
/// use hermes_core::{ExecutionPhase, UnitOutcome};
/// use hermes_flow::{resolver_for, Flow, FlowMode, Step, StaticFlowScope, TagFilter};
/// use hermes_policy::{FlowChain, FnPolicy, Policy, PolicyChainFactory, PolicyPluginRegistry};
/// use std::sync::Arc;
///
/// let registry = PolicyPluginRegistry::new();
/// registry.register("stamp", |_, _| {
///     Ok(Arc::new(FnPolicy::new("stamp", |ctx, _| {
///         ctx.set_attribute("stamped", "yes");
///         Ok(UnitOutcome::Continue)
///     })) as Arc<dyn Policy>)
/// });
///
/// let scope = StaticFlowScope::new([
///     Flow::new("all").step(ExecutionPhase::Request, Step::new("stamp")),
/// ]);
/// let chain = FlowChain::new(
///     "api",
///     resolver_for(scope, FlowMode::Default, false, TagFilter::default()),
///     PolicyChainFactory::new(Arc::new(registry)),
/// );
///
/// # tokio_test::block_on(async {
/// let mut ctx = fixtures::get("/", Arc::new(JsonLiteralBackend::new()));
/// assert!(chain.execute(&mut ctx, ExecutionPhase::Request).await.is_completed());
/// assert_eq!(ctx.attribute("stamped"), Some("yes"));
/// # });
/// ```
#[derive(Clone)]
pub struct FlowChain {
    id: String,
    resolver: Arc<dyn FlowResolver>,
    factory: PolicyChainFactory,
}

impl FlowChain {
    /// Creates a flow chain named `id`; the id also keys the resolved-flow record.
    pub fn new(
        id: impl Into<String>,
        resolver: Arc<dyn FlowResolver>,
        factory: PolicyChainFactory,
    ) -> Self {
        Self {
            id: id.into(),
            resolver,
            factory,
        }
    }

    /// Returns the chain id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the flows of this scope for the request.
    ///
    /// The first call resolves and records them on the context; later calls
    /// return the recorded set.
    pub fn resolve(&self, ctx: &mut ExecutionContext) -> Vec<Arc<Flow>> {
        if let Some(flows) = ctx
            .get_extension::<ResolvedFlows>()
            .and_then(|resolved| resolved.get(&self.id))
        {
            return flows.to_vec();
        }

        let flows: Vec<Arc<Flow>> = self.resolver.resolve(ctx).collect();
        tracing::debug!(
            chain = %self.id,
            request_id = %ctx.request_id(),
            flows = ?flows.iter().map(|flow| flow.name.as_str()).collect::<Vec<_>>(),
            "flows resolved"
        );

        for flow in &flows {
            if let Some(selector) = flow.path_selector() {
                if let Some(params) = selector.path.matches(ctx.path(), selector.operator) {
                    ctx.merge_path_parameters(&params);
                }
            }
        }

        if ctx.get_extension::<ResolvedFlows>().is_none() {
            ctx.set_extension(ResolvedFlows::default());
        }
        if let Some(resolved) = ctx.get_extension_mut::<ResolvedFlows>() {
            resolved.by_chain.insert(self.id.clone(), flows.clone());
        }
        flows
    }

    /// Builds the policy chain of `phase` from the resolved flows.
    pub fn build(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> PolicyChain {
        let flows = self.resolve(ctx);
        let policies: Vec<ResolvedPolicy> = flows
            .iter()
            .flat_map(|flow| flow.resolved_policies(phase))
            .collect();
        self.factory
            .create(&format!("{}-{}", self.id, phase), &policies, phase, ctx)
    }

    /// Resolves, builds and runs the chain of `phase`.
    pub async fn execute(&self, ctx: &mut ExecutionContext, phase: ExecutionPhase) -> ChainOutcome {
        let mut chain = self.build(ctx, phase);
        chain.execute(ctx).await
    }
}

impl Processor for FlowChain {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> BoxFuture<'a, UnitResult> {
        Box::pin(async move {
            // The policy chain already applied any interruption to the context.
            match FlowChain::execute(self, ctx, phase).await {
                ChainOutcome::Completed => Ok(UnitOutcome::Continue),
                ChainOutcome::Interrupted(Some(failure)) => Ok(UnitOutcome::InterruptWith(failure)),
                ChainOutcome::Interrupted(None) => Ok(UnitOutcome::Interrupt),
                ChainOutcome::Failed(error) => Err(error),
            }
        })
    }
}

impl std::fmt::Debug for FlowChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowChain")
            .field("id", &self.id)
            .field("factory", &self.factory)
            .finish_non_exhaustive()
    }
}
