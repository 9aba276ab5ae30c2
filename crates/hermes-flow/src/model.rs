//! Declarative flow model.
//!
//! Everything here is immutable once deployed. A redeploy builds a new
//! [`Deployment`](crate::Deployment) generation instead of editing flows.

use hermes_core::{ExecutionPhase, MessageOperation};
use hermes_router::{MethodSet, Operator, PathPattern, Specificity};
use serde::{Deserialize, Serialize};

const fn default_true() -> bool {
    true
}

fn root_pattern() -> PathPattern {
    PathPattern::root()
}

/// A declared rule: when its selectors match, its steps run.
///
/// # Example
///
/// ```
/// use hermes_flow::Flow;
///
/// let flow: Flow = serde_json::from_value(serde_json::json!({
///     "name": "users",
///     "selectors": [{ "type": "PATH", "path": "/users", "operator": "EXACT", "methods": ["GET"] }],
///     "request": [{ "name": "Rate limit", "policy": "rate-limit", "configuration": { "limit": 10 } }]
/// }))
/// .unwrap();
///
/// assert!(flow.enabled);
/// assert_eq!(flow.request.len(), 1);
/// assert!(flow.path_selector().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Flow {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Disabled flows are never resolved.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Selectors; all must match.
    #[serde(default)]
    pub selectors: Vec<Selector>,
    /// Steps executed on the request phase.
    #[serde(default)]
    pub request: Vec<Step>,
    /// Steps executed on the response phase.
    #[serde(default)]
    pub response: Vec<Step>,
    /// Steps executed on messages delivered to subscribers.
    #[serde(default)]
    pub subscribe: Vec<Step>,
    /// Steps executed on messages published by clients.
    #[serde(default)]
    pub publish: Vec<Step>,
    /// Sharding tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Flow {
    /// Creates an enabled flow with no selectors and no steps.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            selectors: Vec::new(),
            request: Vec::new(),
            response: Vec::new(),
            subscribe: Vec::new(),
            publish: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Adds a selector.
    #[must_use]
    pub fn selector(mut self, selector: Selector) -> Self {
        self.selectors.push(selector);
        self
    }

    /// Adds a step to the steps of `phase`.
    #[must_use]
    pub fn step(mut self, phase: ExecutionPhase, step: Step) -> Self {
        match phase {
            ExecutionPhase::Request => self.request.push(step),
            ExecutionPhase::Response => self.response.push(step),
            ExecutionPhase::MessageRequest => self.publish.push(step),
            ExecutionPhase::MessageResponse => self.subscribe.push(step),
        }
        self
    }

    /// Adds a sharding tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the declared steps for `phase`.
    #[must_use]
    pub fn steps(&self, phase: ExecutionPhase) -> &[Step] {
        match phase {
            ExecutionPhase::Request => &self.request,
            ExecutionPhase::Response => &self.response,
            ExecutionPhase::MessageRequest => &self.publish,
            ExecutionPhase::MessageResponse => &self.subscribe,
        }
    }

    /// Returns the enabled steps of `phase` as resolved policies, in order.
    pub fn resolved_policies(&self, phase: ExecutionPhase) -> impl Iterator<Item = ResolvedPolicy> + '_ {
        self.steps(phase)
            .iter()
            .filter(|step| step.enabled)
            .map(ResolvedPolicy::from)
    }

    /// Returns the first path selector, if any.
    #[must_use]
    pub fn path_selector(&self) -> Option<&PathSelector> {
        self.selectors.iter().find_map(|selector| match selector {
            Selector::Path(path) => Some(path),
            _ => None,
        })
    }

    /// Returns the first channel selector, if any.
    #[must_use]
    pub fn channel_selector(&self) -> Option<&ChannelSelector> {
        self.selectors.iter().find_map(|selector| match selector {
            Selector::Channel(channel) => Some(channel),
            _ => None,
        })
    }

    /// Returns true if the flow constrains the path or channel.
    #[must_use]
    pub fn has_match_selector(&self) -> bool {
        self.selectors
            .iter()
            .any(|selector| matches!(selector, Selector::Path(_) | Selector::Channel(_)))
    }

    /// Returns the rank used by best-match selection.
    ///
    /// Flows without a path or channel selector rank lowest.
    #[must_use]
    pub fn specificity(&self) -> Specificity {
        self.selectors
            .iter()
            .filter_map(|selector| match selector {
                Selector::Path(path) => Some(path.path.specificity(path.operator)),
                Selector::Channel(channel) => Some(channel.channel.specificity(channel.operator)),
                Selector::Condition(_) => None,
            })
            .max()
            .unwrap_or(Specificity::NONE)
    }
}

/// A match predicate attached to a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Selector {
    /// Path pattern, operator and HTTP methods.
    Path(PathSelector),
    /// Free-form boolean expression.
    Condition(ConditionSelector),
    /// Channel pattern, operator and operations (message-style APIs).
    Channel(ChannelSelector),
}

/// Path-based selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSelector {
    /// Path pattern.
    #[serde(default = "root_pattern")]
    pub path: PathPattern,
    /// Exact or prefix semantics.
    #[serde(default, alias = "pathOperator")]
    pub operator: Operator,
    /// Allowed methods; empty allows all.
    #[serde(default)]
    pub methods: MethodSet,
}

impl PathSelector {
    /// Creates a selector accepting every method.
    pub fn new(path: &str, operator: Operator) -> Result<Self, hermes_router::PatternError> {
        Ok(Self {
            path: PathPattern::parse(path)?,
            operator,
            methods: MethodSet::any(),
        })
    }

    /// Restricts the accepted methods.
    #[must_use]
    pub fn methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }
}

/// Expression-based selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSelector {
    /// Boolean expression evaluated by the expression backend.
    pub condition: String,
}

/// Channel-based selector for message-style APIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSelector {
    /// Channel pattern.
    #[serde(default = "root_pattern")]
    pub channel: PathPattern,
    /// Exact or prefix semantics.
    #[serde(default, alias = "channelOperator")]
    pub operator: Operator,
    /// Allowed operations; empty allows all.
    #[serde(default)]
    pub operations: Vec<MessageOperation>,
}

/// One declared behavior inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Disabled steps are never instantiated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Name of the policy in the registry.
    pub policy: String,
    /// Opaque policy configuration.
    #[serde(default)]
    pub configuration: serde_json::Value,
    /// Optional condition evaluated when the step runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Step {
    /// Creates an enabled step for `policy` with a null configuration.
    #[must_use]
    pub fn new(policy: impl Into<String>) -> Self {
        let policy = policy.into();
        Self {
            name: policy.clone(),
            enabled: true,
            policy,
            configuration: serde_json::Value::Null,
            condition: None,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = configuration;
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// The part of a step needed to instantiate its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// Policy name.
    pub name: String,
    /// Opaque configuration.
    pub configuration: serde_json::Value,
    /// Optional execution-time condition.
    pub condition: Option<String>,
}

impl ResolvedPolicy {
    /// Creates a resolved policy without a condition.
    #[must_use]
    pub fn new(name: impl Into<String>, configuration: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            configuration,
            condition: None,
        }
    }

    /// Sets the condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

impl From<&Step> for ResolvedPolicy {
    fn from(step: &Step) -> Self {
        Self {
            name: step.policy.clone(),
            configuration: step.configuration.clone(),
            condition: step.condition.clone().filter(|c| !c.trim().is_empty()),
        }
    }
}

/// How flows of a scope are narrowed after selector filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowMode {
    /// Every matching flow runs, in declaration order.
    #[default]
    #[serde(alias = "DEFAULT")]
    Default,
    /// Only the most specific matching flow runs.
    #[serde(alias = "BEST_MATCH")]
    BestMatch,
}

/// Flow execution settings of a definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowExecution {
    /// Narrowing mode.
    pub mode: FlowMode,
    /// When true, only flows with a path or channel selector are eligible.
    #[serde(alias = "matchRequired")]
    pub match_required: bool,
}

/// A plan of an API and the flows declared on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier, compared with the `plan` attribute.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Plan-scoped flows.
    #[serde(default)]
    pub flows: Vec<Flow>,
}

/// A deployable API definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    /// API identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Flow execution settings.
    #[serde(default, alias = "flowExecution")]
    pub flow_execution: FlowExecution,
    /// API-scoped flows.
    #[serde(default)]
    pub flows: Vec<Flow>,
    /// Plans.
    #[serde(default)]
    pub plans: Vec<Plan>,
    /// Sharding tags of the API.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ApiDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            flow_execution: FlowExecution::default(),
            flows: Vec::new(),
            plans: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Organization-wide (platform) flows applied to every API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDefinition {
    /// Organization identifier.
    #[serde(default)]
    pub id: String,
    /// Flow execution settings.
    #[serde(default, alias = "flowExecution")]
    pub flow_execution: FlowExecution,
    /// Organization flows.
    #[serde(default)]
    pub flows: Vec<Flow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flow_defaults() {
        let flow: Flow = serde_json::from_value(json!({ "name": "f" })).unwrap();
        assert!(flow.enabled);
        assert!(flow.selectors.is_empty());
        assert!(flow.request.is_empty());
        assert!(!flow.has_match_selector());
    }

    #[test]
    fn test_selector_variants() {
        let flow: Flow = serde_json::from_value(json!({
            "name": "mixed",
            "selectors": [
                { "type": "PATH", "path": "/orders/:id", "operator": "STARTS_WITH" },
                { "type": "CONDITION", "condition": "{#request.headers['x'] != null}" },
                { "type": "CHANNEL", "channel": "orders", "operations": ["SUBSCRIBE"] }
            ]
        }))
        .unwrap();

        assert_eq!(flow.selectors.len(), 3);
        let path = flow.path_selector().unwrap();
        assert_eq!(path.operator, Operator::Prefix);
        assert!(path.methods.is_any());
        let channel = flow.channel_selector().unwrap();
        assert_eq!(channel.operations, vec![MessageOperation::Subscribe]);
        assert!(flow.has_match_selector());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result: Result<Flow, _> = serde_json::from_value(json!({
            "selectors": [{ "type": "PATH", "path": "/a/*/b" }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolved_policies_skip_disabled_steps() {
        let flow = Flow::new("f")
            .step(ExecutionPhase::Request, Step::new("a"))
            .step(ExecutionPhase::Request, Step::new("b").enabled(false))
            .step(ExecutionPhase::Request, Step::new("c").condition("  "));

        let names: Vec<_> = flow
            .resolved_policies(ExecutionPhase::Request)
            .map(|p| (p.name, p.condition))
            .collect();
        assert_eq!(names, vec![("a".to_string(), None), ("c".to_string(), None)]);
    }

    #[test]
    fn test_message_phases_map_to_publish_and_subscribe() {
        let flow = Flow::new("m")
            .step(ExecutionPhase::MessageRequest, Step::new("pub"))
            .step(ExecutionPhase::MessageResponse, Step::new("sub"));
        assert_eq!(flow.publish[0].policy, "pub");
        assert_eq!(flow.subscribe[0].policy, "sub");
    }

    #[test]
    fn test_specificity_without_path_is_lowest() {
        let plain = Flow::new("plain");
        let rooted = Flow::new("root")
            .selector(Selector::Path(PathSelector::new("/", Operator::Prefix).unwrap()));
        assert_eq!(plain.specificity(), Specificity::NONE);
        assert!(rooted.specificity() >= plain.specificity());
    }

    #[test]
    fn test_api_definition_aliases() {
        let api: ApiDefinition = serde_json::from_value(json!({
            "id": "api-1",
            "flowExecution": { "mode": "BEST_MATCH", "matchRequired": true },
            "plans": [{ "id": "gold" }]
        }))
        .unwrap();
        assert_eq!(api.flow_execution.mode, FlowMode::BestMatch);
        assert!(api.flow_execution.match_required);
        assert_eq!(api.plans[0].id, "gold");
    }
}
