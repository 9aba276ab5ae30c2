//! Deployed flow generations.
//!
//! A [`Deployment`] is the read-only flow set of one API generation. The
//! [`DeploymentRegistry`] swaps generations atomically: requests that already
//! took a snapshot keep reading the old generation until they complete, and
//! the old generation is dropped with its last reference.

use hermes_core::{GatewayError, GatewayResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::model::{ApiDefinition, Flow, FlowExecution, OrganizationDefinition};

/// One immutable generation of deployed flows.
#[derive(Debug, Clone, Default)]
pub struct Deployment {
    generation: u64,
    api_id: String,
    api_tags: Vec<String>,
    flow_execution: FlowExecution,
    api_flows: Vec<Arc<Flow>>,
    plan_flows: HashMap<String, Vec<Arc<Flow>>>,
    organization_flows: Vec<Arc<Flow>>,
}

impl Deployment {
    /// Compiles a definition into a deployable generation.
    ///
    /// Fails when two plans share an id.
    pub fn new(
        api: ApiDefinition,
        organization: Option<OrganizationDefinition>,
    ) -> GatewayResult<Self> {
        let mut plan_flows = HashMap::with_capacity(api.plans.len());
        for plan in api.plans {
            let flows = plan.flows.into_iter().map(Arc::new).collect();
            if plan_flows.insert(plan.id.clone(), flows).is_some() {
                return Err(GatewayError::invalid_definition(format!(
                    "API '{}' declares plan '{}' more than once",
                    api.id, plan.id
                )));
            }
        }

        Ok(Self {
            generation: 0,
            api_id: api.id,
            api_tags: api.tags,
            flow_execution: api.flow_execution,
            api_flows: api.flows.into_iter().map(Arc::new).collect(),
            plan_flows,
            organization_flows: organization
                .map(|org| org.flows.into_iter().map(Arc::new).collect())
                .unwrap_or_default(),
        })
    }

    /// Creates an empty generation (no flows anywhere).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the generation number assigned by the registry.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the deployed API id.
    #[must_use]
    pub fn api_id(&self) -> &str {
        &self.api_id
    }

    /// Returns the sharding tags of the API.
    #[must_use]
    pub fn api_tags(&self) -> &[String] {
        &self.api_tags
    }

    /// Returns the flow execution settings of the API.
    #[must_use]
    pub const fn flow_execution(&self) -> FlowExecution {
        self.flow_execution
    }

    /// Returns the API-scoped flows.
    #[must_use]
    pub fn api_flows(&self) -> &[Arc<Flow>] {
        &self.api_flows
    }

    /// Returns the flows of `plan`, empty for an unknown plan.
    #[must_use]
    pub fn plan_flows(&self, plan: &str) -> &[Arc<Flow>] {
        self.plan_flows.get(plan).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the organization flows.
    #[must_use]
    pub fn organization_flows(&self) -> &[Arc<Flow>] {
        &self.organization_flows
    }
}

/// Event emitted by a deployment source.
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// A new generation is available.
    Deployed(Arc<Deployment>),
    /// A definition could not be loaded; the current generation stays.
    Rejected {
        /// Where the definition came from.
        source: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Holder of the current deployment generation, shared by every request.
///
/// Cloning the registry shares the same slot.
///
/// # Example
///
/// ```
/// use hermes_flow::{ApiDefinition, Deployment, DeploymentRegistry};
///
/// let registry = DeploymentRegistry::new(Deployment::empty());
/// let before = registry.current();
///
/// registry.swap(Deployment::new(ApiDefinition::new("api-1"), None).unwrap());
///
/// assert_eq!(before.api_id(), "");
/// assert_eq!(registry.current().api_id(), "api-1");
/// assert!(registry.current().generation() > before.generation());
/// ```
#[derive(Debug, Clone)]
pub struct DeploymentRegistry {
    slot: Arc<RwLock<Arc<Deployment>>>,
    generations: Arc<AtomicU64>,
}

impl DeploymentRegistry {
    /// Creates a registry holding `initial` as generation 1.
    #[must_use]
    pub fn new(mut initial: Deployment) -> Self {
        initial.generation = 1;
        Self {
            slot: Arc::new(RwLock::new(Arc::new(initial))),
            generations: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Returns a snapshot of the current generation.
    #[must_use]
    pub fn current(&self) -> Arc<Deployment> {
        Arc::clone(&self.slot.read())
    }

    /// Installs `deployment` as the next generation and returns the previous one.
    pub fn swap(&self, mut deployment: Deployment) -> Arc<Deployment> {
        deployment.generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let next = Arc::new(deployment);
        let previous = std::mem::replace(&mut *self.slot.write(), next);
        tracing::info!(
            api = %previous.api_id(),
            from = previous.generation(),
            to = self.current().generation(),
            "deployment generation swapped"
        );
        previous
    }

    /// Applies a deployment event.
    ///
    /// Returns true when a new generation was installed.
    pub fn apply(&self, event: DeploymentEvent) -> bool {
        match event {
            DeploymentEvent::Deployed(deployment) => {
                let deployment =
                    Arc::try_unwrap(deployment).unwrap_or_else(|shared| (*shared).clone());
                self.swap(deployment);
                true
            }
            DeploymentEvent::Rejected { source, reason } => {
                tracing::warn!(%source, %reason, "deployment rejected, keeping current generation");
                false
            }
        }
    }
}

impl Default for DeploymentRegistry {
    fn default() -> Self {
        Self::new(Deployment::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Plan;

    fn api_with_plans(plans: &[&str]) -> ApiDefinition {
        let mut api = ApiDefinition::new("api");
        api.flows.push(Flow::new("api-flow"));
        api.plans = plans
            .iter()
            .map(|id| Plan {
                id: (*id).to_string(),
                name: String::new(),
                flows: vec![Flow::new(format!("{id}-flow"))],
            })
            .collect();
        api
    }

    #[test]
    fn test_compiles_scopes() {
        let org = OrganizationDefinition {
            flows: vec![Flow::new("platform")],
            ..OrganizationDefinition::default()
        };
        let deployment = Deployment::new(api_with_plans(&["gold", "silver"]), Some(org)).unwrap();

        assert_eq!(deployment.api_flows().len(), 1);
        assert_eq!(deployment.plan_flows("gold")[0].name, "gold-flow");
        assert!(deployment.plan_flows("bronze").is_empty());
        assert_eq!(deployment.organization_flows()[0].name, "platform");
    }

    #[test]
    fn test_duplicate_plan_rejected() {
        let result = Deployment::new(api_with_plans(&["gold", "gold"]), None);
        assert!(matches!(result, Err(GatewayError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_old_generation_survives_swap() {
        let registry = DeploymentRegistry::new(Deployment::new(api_with_plans(&[]), None).unwrap());
        let snapshot = registry.current();

        let mut next = ApiDefinition::new("api");
        next.flows = vec![Flow::new("a"), Flow::new("b")];
        let previous = registry.swap(Deployment::new(next, None).unwrap());

        assert!(Arc::ptr_eq(&previous, &snapshot));
        assert_eq!(snapshot.api_flows().len(), 1);
        assert_eq!(registry.current().api_flows().len(), 2);
        assert_eq!(registry.current().generation(), 2);
    }

    #[test]
    fn test_clones_share_slot() {
        let registry = DeploymentRegistry::default();
        let clone = registry.clone();
        registry.swap(Deployment::new(ApiDefinition::new("x"), None).unwrap());
        assert_eq!(clone.current().api_id(), "x");
    }

    #[test]
    fn test_apply_events() {
        let registry = DeploymentRegistry::default();
        let deployed = DeploymentEvent::Deployed(Arc::new(
            Deployment::new(ApiDefinition::new("y"), None).unwrap(),
        ));
        assert!(registry.apply(deployed));
        assert_eq!(registry.current().api_id(), "y");

        let rejected = DeploymentEvent::Rejected {
            source: "api.yaml".into(),
            reason: "bad".into(),
        };
        assert!(!registry.apply(rejected));
        assert_eq!(registry.current().api_id(), "y");
    }
}
