//! Building policy chains from resolved declarations.

use hermes_core::{ExecutionContext, ExecutionPhase, HookChain};
use hermes_flow::ResolvedPolicy;
use std::sync::Arc;

use crate::chain::{ChainOrder, PolicyChain};
use crate::policy::Policy;
use crate::registry::PolicyRegistry;

/// Turns resolved policy declarations into executable chains.
///
/// Declarations that cannot be instantiated are logged and dropped; the rest
/// of the chain is still built.
#[derive(Clone)]
pub struct PolicyChainFactory {
    registry: Arc<dyn PolicyRegistry>,
    hooks: HookChain,
}

impl PolicyChainFactory {
    /// Creates a factory instantiating policies through `registry`.
    pub fn new(registry: Arc<dyn PolicyRegistry>) -> Self {
        Self {
            registry,
            hooks: HookChain::new(),
        }
    }

    /// Attaches hooks to every chain this factory builds.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the hooks attached to built chains.
    pub const fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    /// Builds the chain `id` for `phase`.
    ///
    /// Inbound phases run `policies` in order, outbound phases in reverse.
    /// An empty list yields a no-op chain.
    pub fn create(
        &self,
        id: &str,
        policies: &[ResolvedPolicy],
        phase: ExecutionPhase,
        ctx: &ExecutionContext,
    ) -> PolicyChain {
        if policies.is_empty() {
            return PolicyChain::noop(id, phase);
        }

        let instances: Vec<Arc<dyn Policy>> = policies
            .iter()
            .filter_map(|declared| match self.registry.create(phase, declared) {
                Ok(policy) => Some(policy),
                Err(error) => {
                    tracing::warn!(
                        chain = %id,
                        policy = %declared.name,
                        %phase,
                        request_id = %ctx.request_id(),
                        error = %error,
                        "policy instantiation failed, entry dropped"
                    );
                    metrics::counter!(
                        "hermes_policy_instantiation_failures_total",
                        "policy" => declared.name.clone()
                    )
                    .increment(1);
                    None
                }
            })
            .collect();

        PolicyChain::new(id, phase, instances, ChainOrder::for_phase(phase))
            .with_hooks(self.hooks.clone())
    }
}

impl std::fmt::Debug for PolicyChainFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyChainFactory")
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}
