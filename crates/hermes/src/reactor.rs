//! The API reactor: one request through every chain of a deployed API.
//!
//! The order is fixed and cannot be reconfigured:
//!
//! ```text
//! attribution → organization(request) → plan(request) → api(request) → invoker
//!                                                                        ↓
//!            organization(response) ← plan(response) ← api(response) ←───┘
//! ```
//!
//! An interruption or failure on the way in skips everything up to the
//! outbound organization chain, which always runs. A failing policy keeps
//! whatever response it left; attribution and invoker failures are rendered
//! as an error response before the outbound chains see it.

use hermes_config::HermesConfig;
use hermes_core::attributes::{API, CLIENT_IDENTIFIER};
use hermes_core::{
    ChainOutcome, ExecutionContext, ExecutionPhase, GatewayError, HookChain, ProcessorHook,
};
use hermes_flow::{
    resolver_for, ApiFlowScope, Deployment, DeploymentRegistry, FlowMode, OrganizationFlowScope,
    PlanFlowScope, TagFilter,
};
use hermes_policy::{
    FlowChain, PolicyChainFactory, PolicyPluginRegistry, PolicyRegistry, ProcessorChain,
    SubscriptionProcessor, DEFAULT_CLIENT_IDENTIFIER_HEADER,
};
use hermes_telemetry::metrics::record_chain_execution;
use hermes_telemetry::{LoggingHook, MetricsHook, Reporter, RequestReport};
use http::header::{HeaderName, HeaderValue};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{HermesError, HermesResult};
use crate::invoker::{Invoker, InvokerProcessor, NoopInvoker};

/// Chain id of the attribution processor chain.
pub const ATTRIBUTION_CHAIN: &str = "attribution";
/// Chain id of organization flows.
pub const ORGANIZATION_CHAIN: &str = "organization";
/// Chain id of plan flows.
pub const PLAN_CHAIN: &str = "plan";
/// Chain id of API flows.
pub const API_CHAIN: &str = "api";
/// Chain id of the invoker processor chain.
pub const INVOKER_CHAIN: &str = "invoker";

/// Flow resolution and attribution settings of a reactor.
#[derive(Debug, Clone)]
pub struct ReactorSettings {
    /// Sharding tag constraint applied to every scope.
    pub tags: TagFilter,
    /// Mode for organization flows, and for API and plan flows when the
    /// deployed definition keeps the default mode.
    pub mode: FlowMode,
    /// Plan flows need a path or channel selector.
    pub plan_match_required: bool,
    /// API flows need a path or channel selector, on top of what the
    /// definition asks for.
    pub api_match_required: bool,
    /// Header read and echoed for the client identifier.
    pub client_identifier_header: HeaderName,
}

impl ReactorSettings {
    /// Derives reactor settings from the gateway configuration.
    pub fn from_config(config: &HermesConfig) -> HermesResult<Self> {
        let header = &config.gateway.client_identifier_header;
        let client_identifier_header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|_| HermesError::invalid_header(header.clone()))?;
        Ok(Self {
            tags: config.gateway.tag_filter(),
            mode: config.flows.mode,
            plan_match_required: config.flows.plan_match_required,
            api_match_required: config.flows.api_match_required,
            client_identifier_header,
        })
    }
}

impl Default for ReactorSettings {
    fn default() -> Self {
        Self {
            tags: TagFilter::default(),
            mode: FlowMode::Default,
            plan_match_required: false,
            api_match_required: false,
            client_identifier_header: HeaderName::from_static(DEFAULT_CLIENT_IDENTIFIER_HEADER),
        }
    }
}

/// Flow chains of one deployment generation.
struct FlowChains {
    generation: u64,
    organization: FlowChain,
    plan: FlowChain,
    api: FlowChain,
}

/// Runs requests of one API through attribution, flow chains and the invoker.
///
/// # Example
///
/// ```
/// use hermes::reactor::ApiReactor;
/// use hermes_core::ExecutionContext;
/// use hermes_flow::DeploymentRegistry;
///
/// # tokio_test::block_on(async {
/// let reactor = ApiReactor::builder(DeploymentRegistry::default()).build();
/// let mut ctx = ExecutionContext::builder().build();
///
/// assert!(reactor.handle(&mut ctx).await.is_completed());
/// assert_eq!(ctx.response().status(), 200);
/// # });
/// ```
pub struct ApiReactor {
    registry: DeploymentRegistry,
    factory: PolicyChainFactory,
    attribution: ProcessorChain,
    invoker: ProcessorChain,
    reporter: Option<Arc<dyn Reporter>>,
    settings: ReactorSettings,
    chains: RwLock<Option<Arc<FlowChains>>>,
}

impl ApiReactor {
    /// Starts a builder serving the deployments of `registry`.
    pub fn builder(registry: DeploymentRegistry) -> ApiReactorBuilder {
        ApiReactorBuilder::new(registry)
    }

    /// Returns the deployment registry.
    pub const fn registry(&self) -> &DeploymentRegistry {
        &self.registry
    }

    /// Returns the settings.
    pub const fn settings(&self) -> &ReactorSettings {
        &self.settings
    }

    /// Handles one request.
    ///
    /// Returns the outcome of the inbound side (attribution, request flows
    /// and invoker). The response in `ctx` is final once this returns.
    pub async fn handle(&self, ctx: &mut ExecutionContext) -> ChainOutcome {
        let deployment = self.registry.current();
        ctx.set_attribute(API, deployment.api_id());
        let chains = self.flow_chains(&deployment);

        let mut inbound = self.attribution.execute(ctx, ExecutionPhase::Request).await;
        record_chain_execution(ATTRIBUTION_CHAIN, ExecutionPhase::Request, &inbound);
        if inbound.is_completed() {
            inbound = run_in_order(
                ctx,
                [&chains.organization, &chains.plan, &chains.api],
                ExecutionPhase::Request,
            )
            .await;
            if inbound.is_completed() {
                inbound = self.invoker.execute(ctx, ExecutionPhase::Request).await;
                record_chain_execution(INVOKER_CHAIN, ExecutionPhase::Request, &inbound);
                render_failure(ctx, &inbound);
            }
        } else {
            render_failure(ctx, &inbound);
        }
        self.restore_client_identifier(ctx);

        if inbound.is_completed() {
            run_in_order(
                ctx,
                [&chains.api, &chains.plan],
                ExecutionPhase::Response,
            )
            .await;
        }
        let platform = chains
            .organization
            .execute(ctx, ExecutionPhase::Response)
            .await;
        record_chain_execution(ORGANIZATION_CHAIN, ExecutionPhase::Response, &platform);

        tracing::debug!(
            request_id = %ctx.request_id(),
            api = %deployment.api_id(),
            generation = deployment.generation(),
            status = ctx.response().status().as_u16(),
            outcome = inbound.label(),
            "request handled"
        );
        if let Some(reporter) = &self.reporter {
            reporter.report(&RequestReport::from_context(deployment.api_id(), ctx));
        }
        inbound
    }

    /// Handles one message of a message-style API.
    ///
    /// Published messages run organization, plan then API flows; delivered
    /// messages run them in reverse. The first interruption or failure
    /// stops the remaining scopes.
    pub async fn handle_message(
        &self,
        ctx: &mut ExecutionContext,
        phase: ExecutionPhase,
    ) -> ChainOutcome {
        if !matches!(
            phase,
            ExecutionPhase::MessageRequest | ExecutionPhase::MessageResponse
        ) {
            return ChainOutcome::Failed(GatewayError::internal(format!(
                "'{phase}' is not a message phase"
            )));
        }

        let deployment = self.registry.current();
        ctx.set_attribute(API, deployment.api_id());
        let chains = self.flow_chains(&deployment);

        if ctx.attribute(CLIENT_IDENTIFIER).is_none() {
            let attributed = self.attribution.execute(ctx, phase).await;
            record_chain_execution(ATTRIBUTION_CHAIN, phase, &attributed);
            if !attributed.is_completed() {
                render_failure(ctx, &attributed);
                return attributed;
            }
        }

        if phase.is_inbound() {
            run_in_order(
                ctx,
                [&chains.organization, &chains.plan, &chains.api],
                phase,
            )
            .await
        } else {
            run_in_order(
                ctx,
                [&chains.api, &chains.plan, &chains.organization],
                phase,
            )
            .await
        }
    }

    /// Chains resolving against `deployment` only, cached per generation.
    fn flow_chains(&self, deployment: &Arc<Deployment>) -> Arc<FlowChains> {
        if let Some(chains) = self
            .chains
            .read()
            .as_ref()
            .filter(|chains| chains.generation == deployment.generation())
        {
            return Arc::clone(chains);
        }

        let chains = Arc::new(self.build_chains(deployment));
        let mut cached = self.chains.write();
        if cached
            .as_ref()
            .map_or(true, |current| current.generation < chains.generation)
        {
            *cached = Some(Arc::clone(&chains));
        }
        chains
    }

    fn build_chains(&self, deployment: &Arc<Deployment>) -> FlowChains {
        let execution = deployment.flow_execution();
        let api_mode = match execution.mode {
            FlowMode::BestMatch => FlowMode::BestMatch,
            FlowMode::Default => self.settings.mode,
        };
        let tags = &self.settings.tags;
        tracing::debug!(
            api = %deployment.api_id(),
            generation = deployment.generation(),
            mode = ?api_mode,
            "flow chains built"
        );

        FlowChains {
            generation: deployment.generation(),
            organization: FlowChain::new(
                ORGANIZATION_CHAIN,
                resolver_for(
                    OrganizationFlowScope::new(Arc::clone(deployment)),
                    self.settings.mode,
                    false,
                    tags.clone(),
                ),
                self.factory.clone(),
            ),
            plan: FlowChain::new(
                PLAN_CHAIN,
                resolver_for(
                    PlanFlowScope::new(Arc::clone(deployment)),
                    api_mode,
                    self.settings.plan_match_required,
                    tags.clone(),
                ),
                self.factory.clone(),
            ),
            api: FlowChain::new(
                API_CHAIN,
                resolver_for(
                    ApiFlowScope::new(Arc::clone(deployment)),
                    api_mode,
                    execution.match_required || self.settings.api_match_required,
                    tags.clone(),
                ),
                self.factory.clone(),
            ),
        }
    }

    /// The invoker or an error rendering may have replaced the response.
    fn restore_client_identifier(&self, ctx: &mut ExecutionContext) {
        let Some(value) = ctx
            .attribute(CLIENT_IDENTIFIER)
            .and_then(|id| HeaderValue::from_str(id).ok())
        else {
            return;
        };
        ctx.response_mut()
            .headers_mut()
            .insert(self.settings.client_identifier_header.clone(), value);
    }
}

impl std::fmt::Debug for ApiReactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiReactor")
            .field("api", &self.registry.current().api_id())
            .field("attribution", &self.attribution)
            .field("invoker", &self.invoker)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

async fn run_in_order<const N: usize>(
    ctx: &mut ExecutionContext,
    chains: [&FlowChain; N],
    phase: ExecutionPhase,
) -> ChainOutcome {
    for chain in chains {
        let outcome = chain.execute(ctx, phase).await;
        record_chain_execution(chain.id(), phase, &outcome);
        if !outcome.is_completed() {
            return outcome;
        }
    }
    ChainOutcome::Completed
}

/// Renders a processor failure as an error response.
///
/// Never applied to flow chains: a failing policy's response stands.
fn render_failure(ctx: &mut ExecutionContext, outcome: &ChainOutcome) {
    if let ChainOutcome::Failed(error) = outcome {
        ctx.interrupt_with(error.to_failure());
    }
}

/// Builder for [`ApiReactor`].
pub struct ApiReactorBuilder {
    registry: DeploymentRegistry,
    policies: Arc<dyn PolicyRegistry>,
    invoker: Arc<dyn Invoker>,
    policy_hooks: HookChain,
    processor_hooks: HookChain,
    invoker_hooks: HookChain,
    reporter: Option<Arc<dyn Reporter>>,
    settings: ReactorSettings,
}

impl ApiReactorBuilder {
    fn new(registry: DeploymentRegistry) -> Self {
        Self {
            registry,
            policies: Arc::new(PolicyPluginRegistry::new()),
            invoker: Arc::new(NoopInvoker),
            policy_hooks: HookChain::new(),
            processor_hooks: HookChain::new(),
            invoker_hooks: HookChain::new(),
            reporter: None,
            settings: ReactorSettings::default(),
        }
    }

    /// Sets the registry policies are instantiated from.
    pub fn policies(mut self, policies: Arc<dyn PolicyRegistry>) -> Self {
        self.policies = policies;
        self
    }

    /// Sets the backend invoker.
    pub fn invoker(mut self, invoker: impl Invoker) -> Self {
        self.invoker = Arc::new(invoker);
        self
    }

    /// Adds a hook around every policy.
    pub fn policy_hook(mut self, hook: Arc<dyn ProcessorHook>) -> Self {
        self.policy_hooks.push(hook);
        self
    }

    /// Adds a hook around attribution.
    pub fn processor_hook(mut self, hook: Arc<dyn ProcessorHook>) -> Self {
        self.processor_hooks.push(hook);
        self
    }

    /// Adds a hook around the invoker.
    pub fn invoker_hook(mut self, hook: Arc<dyn ProcessorHook>) -> Self {
        self.invoker_hooks.push(hook);
        self
    }

    /// Attaches a metrics hook and the logging hook to every kind of unit.
    pub fn with_telemetry_hooks(self) -> Self {
        let logging: Arc<dyn ProcessorHook> = Arc::new(LoggingHook);
        self.policy_hook(Arc::new(MetricsHook::new("policy")))
            .policy_hook(Arc::clone(&logging))
            .processor_hook(Arc::new(MetricsHook::new("processor")))
            .processor_hook(Arc::clone(&logging))
            .invoker_hook(Arc::new(MetricsHook::new("invoker")))
            .invoker_hook(logging)
    }

    /// Sets the request reporter.
    pub fn reporter(mut self, reporter: impl Reporter) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Sets the resolution settings.
    pub fn settings(mut self, settings: ReactorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Builds the reactor.
    pub fn build(self) -> ApiReactor {
        let attribution = ProcessorChain::builder(ATTRIBUTION_CHAIN)
            .processor(Arc::new(
                SubscriptionProcessor::new()
                    .with_client_identifier_header(self.settings.client_identifier_header.clone()),
            ))
            .hooks(self.processor_hooks)
            .build();
        let invoker = ProcessorChain::builder(INVOKER_CHAIN)
            .processor(Arc::new(InvokerProcessor::new(self.invoker)))
            .hooks(self.invoker_hooks)
            .build();

        ApiReactor {
            registry: self.registry,
            factory: PolicyChainFactory::new(self.policies).with_hooks(self.policy_hooks),
            attribution,
            invoker,
            reporter: self.reporter,
            settings: self.settings,
            chains: RwLock::new(None),
        }
    }
}

impl std::fmt::Debug for ApiReactorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiReactorBuilder")
            .field("invoker", &self.invoker.id())
            .field("policy_hooks", &self.policy_hooks)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_config::HermesConfigBuilder;

    #[test]
    fn test_settings_from_config() {
        let mut config = HermesConfig::default();
        config.gateway.sharding_tags = vec!["eu".to_string()];
        config.gateway.client_identifier_header = "X-Client".to_string();
        config.flows.mode = FlowMode::BestMatch;
        config.flows.plan_match_required = true;

        let settings = ReactorSettings::from_config(&config).unwrap();

        assert_eq!(settings.mode, FlowMode::BestMatch);
        assert!(settings.plan_match_required);
        assert!(!settings.api_match_required);
        assert_eq!(settings.client_identifier_header.as_str(), "x-client");
        assert!(!settings.tags.is_empty());
    }

    #[test]
    fn test_settings_reject_bad_header() {
        let mut config = HermesConfigBuilder::new().build();
        config.gateway.client_identifier_header = "bad header".to_string();

        let err = ReactorSettings::from_config(&config).unwrap_err();
        assert!(matches!(err, HermesError::InvalidHeader(_)));
    }

    #[test]
    fn test_default_settings_use_default_header() {
        let settings = ReactorSettings::default();
        assert_eq!(
            settings.client_identifier_header.as_str(),
            DEFAULT_CLIENT_IDENTIFIER_HEADER
        );
        assert_eq!(settings.mode, FlowMode::Default);
    }

    #[test]
    fn test_chains_are_cached_per_generation() {
        let registry = DeploymentRegistry::default();
        let reactor = ApiReactor::builder(registry.clone()).build();

        let first = reactor.flow_chains(&registry.current());
        let again = reactor.flow_chains(&registry.current());
        assert!(Arc::ptr_eq(&first, &again));

        registry.swap(Deployment::empty());
        let next = reactor.flow_chains(&registry.current());
        assert!(!Arc::ptr_eq(&first, &next));
        assert_eq!(next.generation, 2);
    }

    #[test]
    fn test_in_flight_generation_keeps_its_own_chains() {
        let registry = DeploymentRegistry::default();
        let reactor = ApiReactor::builder(registry.clone()).build();
        let started_on = registry.current();

        registry.swap(Deployment::empty());
        let latest = reactor.flow_chains(&registry.current());
        let in_flight = reactor.flow_chains(&started_on);

        assert_eq!(in_flight.generation, 1);
        assert!(Arc::ptr_eq(&latest, &reactor.flow_chains(&registry.current())));
    }

    #[tokio::test]
    async fn test_rejects_non_message_phase() {
        let reactor = ApiReactor::builder(DeploymentRegistry::default()).build();
        let mut ctx = ExecutionContext::builder().build();

        let outcome = reactor.handle_message(&mut ctx, ExecutionPhase::Request).await;
        assert!(outcome.is_failed());
    }
}
