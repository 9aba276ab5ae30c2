//! Condition evaluation.
//!
//! Every predicate here is pure: it reads the context and never mutates it.
//! A condition that cannot prove `true` evaluates to `false`, so a malformed
//! expression excludes traffic instead of silently admitting it.

use hermes_core::ExecutionContext;
use std::collections::HashSet;
use std::sync::Arc;

use crate::model::{ChannelSelector, Flow, PathSelector, Selector};

/// A boolean predicate over a subject in the scope of a request.
pub trait ConditionEvaluator<T: ?Sized>: Send + Sync {
    /// Returns true when `subject` matches the request.
    fn evaluate(&self, ctx: &ExecutionContext, subject: &T) -> bool;
}

/// Evaluates textual expressions through the context's expression backend.
///
/// # Example
///
/// ```
/// use hermes_core::fixtures::{self, JsonLiteralBackend};
/// use hermes_flow::ExpressionConditionEvaluator;
/// use std::sync::Arc;
///
/// let ctx = fixtures::get("/", Arc::new(JsonLiteralBackend::new()));
/// let evaluator = ExpressionConditionEvaluator;
///
/// assert!(evaluator.evaluate_expression(&ctx, None));
/// assert!(evaluator.evaluate_expression(&ctx, Some("")));
/// assert!(evaluator.evaluate_expression(&ctx, Some("true")));
/// assert!(!evaluator.evaluate_expression(&ctx, Some("false")));
/// assert!(!evaluator.evaluate_expression(&ctx, Some("not a boolean expression")));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionConditionEvaluator;

impl ExpressionConditionEvaluator {
    /// Evaluates `expression`; absent or blank expressions are true.
    #[must_use]
    pub fn evaluate_expression(&self, ctx: &ExecutionContext, expression: Option<&str>) -> bool {
        let Some(expression) = expression.map(str::trim).filter(|e| !e.is_empty()) else {
            return true;
        };

        match ctx.evaluate_as::<bool>(expression) {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    expression,
                    %error,
                    "condition evaluation failed, treating as false"
                );
                false
            }
        }
    }
}

impl ConditionEvaluator<str> for ExpressionConditionEvaluator {
    fn evaluate(&self, ctx: &ExecutionContext, expression: &str) -> bool {
        self.evaluate_expression(ctx, Some(expression))
    }
}

/// ANDs an ordered list of evaluators, stopping at the first `false`.
///
/// Evaluators after a negative result are never invoked.
pub struct CompositeConditionEvaluator<T: ?Sized> {
    evaluators: Vec<Arc<dyn ConditionEvaluator<T>>>,
}

impl<T: ?Sized> CompositeConditionEvaluator<T> {
    /// Creates an empty composite, which is always true.
    #[must_use]
    pub fn new() -> Self {
        Self {
            evaluators: Vec::new(),
        }
    }

    /// Appends an evaluator.
    #[must_use]
    pub fn with(mut self, evaluator: Arc<dyn ConditionEvaluator<T>>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Returns the number of evaluators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    /// Returns true if no evaluator is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl<T: ?Sized> Default for CompositeConditionEvaluator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> ConditionEvaluator<T> for CompositeConditionEvaluator<T> {
    fn evaluate(&self, ctx: &ExecutionContext, subject: &T) -> bool {
        self.evaluators
            .iter()
            .all(|evaluator| evaluator.evaluate(ctx, subject))
    }
}

/// Matches the path selectors of a flow against the request path and method.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathSelectorEvaluator;

impl PathSelectorEvaluator {
    /// Returns true when `selector` accepts the request.
    #[must_use]
    pub fn matches(ctx: &ExecutionContext, selector: &PathSelector) -> bool {
        selector.methods.allows(ctx.method())
            && selector.path.matches(ctx.path(), selector.operator).is_some()
    }
}

impl ConditionEvaluator<Flow> for PathSelectorEvaluator {
    fn evaluate(&self, ctx: &ExecutionContext, flow: &Flow) -> bool {
        flow.selectors.iter().all(|selector| match selector {
            Selector::Path(path) => Self::matches(ctx, path),
            _ => true,
        })
    }
}

/// Evaluates the condition selectors of a flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionSelectorEvaluator {
    expressions: ExpressionConditionEvaluator,
}

impl ConditionEvaluator<Flow> for ConditionSelectorEvaluator {
    fn evaluate(&self, ctx: &ExecutionContext, flow: &Flow) -> bool {
        flow.selectors.iter().all(|selector| match selector {
            Selector::Condition(condition) => self
                .expressions
                .evaluate_expression(ctx, Some(&condition.condition)),
            _ => true,
        })
    }
}

/// Matches the channel selectors of a flow against a message-style request.
///
/// A plain HTTP request (no channel on the context) never matches a channel
/// selector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelSelectorEvaluator;

impl ChannelSelectorEvaluator {
    /// Returns true when `selector` accepts the request.
    #[must_use]
    pub fn matches(ctx: &ExecutionContext, selector: &ChannelSelector) -> bool {
        let (Some(channel), Some(operation)) = (ctx.channel(), ctx.operation()) else {
            return false;
        };
        (selector.operations.is_empty() || selector.operations.contains(&operation))
            && selector.channel.matches(channel, selector.operator).is_some()
    }
}

impl ConditionEvaluator<Flow> for ChannelSelectorEvaluator {
    fn evaluate(&self, ctx: &ExecutionContext, flow: &Flow) -> bool {
        flow.selectors.iter().all(|selector| match selector {
            Selector::Channel(channel) => Self::matches(ctx, channel),
            _ => true,
        })
    }
}

/// Sharding-tag constraint.
///
/// Entries prefixed with `!` are exclusions. A flow passes when it carries
/// one of the included tags, or when exclusions are configured and it carries
/// none of them. An empty constraint accepts every flow.
///
/// # Example
///
/// ```
/// use hermes_flow::{Flow, TagFilter};
///
/// let filter = TagFilter::new(["internal", "!partner"]);
///
/// assert!(filter.accepts(&Flow::new("a").tag("internal")));
/// assert!(filter.accepts(&Flow::new("b").tag("public")));
/// assert!(!filter.accepts(&Flow::new("c").tag("partner")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    included: HashSet<String>,
    excluded: HashSet<String>,
}

impl TagFilter {
    /// Parses a tag constraint.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = Self::default();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if let Some(excluded) = tag.strip_prefix('!') {
                filter.excluded.insert(excluded.trim().to_string());
            } else if !tag.is_empty() {
                filter.included.insert(tag.to_string());
            }
        }
        filter
    }

    /// Returns true if no constraint is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty()
    }

    /// Returns true when a flow carrying `flow.tags` passes the constraint.
    #[must_use]
    pub fn accepts(&self, flow: &Flow) -> bool {
        if self.is_empty() {
            return true;
        }
        let included = flow.tags.iter().any(|tag| self.included.contains(tag));
        let not_excluded = !self.excluded.is_empty()
            && flow.tags.iter().all(|tag| !self.excluded.contains(tag));
        included || not_excluded
    }
}

impl ConditionEvaluator<Flow> for TagFilter {
    fn evaluate(&self, _ctx: &ExecutionContext, flow: &Flow) -> bool {
        self.accepts(flow)
    }
}

/// Builds the composite used by the base resolver: path, channel and condition
/// selectors, then the optional tag constraint.
///
/// Condition selectors run last so the expression backend is only consulted
/// for flows whose structural selectors already matched.
#[must_use]
pub fn selector_evaluator(tags: TagFilter) -> CompositeConditionEvaluator<Flow> {
    let mut composite = CompositeConditionEvaluator::new()
        .with(Arc::new(PathSelectorEvaluator))
        .with(Arc::new(ChannelSelectorEvaluator));
    if !tags.is_empty() {
        composite = composite.with(Arc::new(tags));
    }
    composite.with(Arc::new(ConditionSelectorEvaluator::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConditionSelector, PathSelector};
    use hermes_core::fixtures::{self, JsonLiteralBackend};
    use hermes_core::MessageOperation;
    use hermes_router::{MethodSet, Operator};
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(bool);

    impl ConditionEvaluator<Flow> for Fixed {
        fn evaluate(&self, _ctx: &ExecutionContext, _flow: &Flow) -> bool {
            self.0
        }
    }

    struct Counting(AtomicUsize);

    impl ConditionEvaluator<Flow> for Counting {
        fn evaluate(&self, _ctx: &ExecutionContext, _flow: &Flow) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn ctx(method: Method, path: &str) -> ExecutionContext {
        fixtures::request(method, path, Arc::new(JsonLiteralBackend::new()))
    }

    fn path_flow(path: &str, operator: Operator, methods: MethodSet) -> Flow {
        Flow::new(path).selector(Selector::Path(
            PathSelector::new(path, operator).unwrap().methods(methods),
        ))
    }

    #[test]
    fn test_expression_evaluator_contract() {
        let ctx = ctx(Method::GET, "/");
        let evaluator = ExpressionConditionEvaluator;

        assert!(evaluator.evaluate_expression(&ctx, None));
        assert!(evaluator.evaluate_expression(&ctx, Some("")));
        assert!(evaluator.evaluate_expression(&ctx, Some("   ")));
        assert!(evaluator.evaluate_expression(&ctx, Some("true")));
        assert!(!evaluator.evaluate_expression(&ctx, Some("false")));
        assert!(!evaluator.evaluate_expression(&ctx, Some("not a boolean expression")));
        assert!(!evaluator.evaluate_expression(&ctx, Some("\"true\"")));
        assert!(!evaluator.evaluate_expression(&ctx, Some("1")));
    }

    #[test]
    fn test_composite_short_circuits() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let composite = CompositeConditionEvaluator::new()
            .with(Arc::new(Fixed(false)))
            .with(counter.clone());

        assert!(!composite.evaluate(&ctx(Method::GET, "/"), &Flow::new("f")));
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_composite_runs_all_when_true() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let composite = CompositeConditionEvaluator::new()
            .with(Arc::new(Fixed(true)))
            .with(counter.clone());

        assert!(composite.evaluate(&ctx(Method::GET, "/"), &Flow::new("f")));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_composite_is_true() {
        let composite = CompositeConditionEvaluator::<Flow>::new();
        assert!(composite.is_empty());
        assert!(composite.evaluate(&ctx(Method::GET, "/"), &Flow::new("f")));
    }

    #[test]
    fn test_path_selector_checks_method() {
        let flow = path_flow("/users", Operator::Exact, MethodSet::new().with(Method::GET));

        assert!(PathSelectorEvaluator.evaluate(&ctx(Method::GET, "/users"), &flow));
        assert!(!PathSelectorEvaluator.evaluate(&ctx(Method::POST, "/users"), &flow));
        assert!(!PathSelectorEvaluator.evaluate(&ctx(Method::GET, "/users/1"), &flow));
    }

    #[test]
    fn test_condition_selector() {
        let flow = Flow::new("c").selector(Selector::Condition(ConditionSelector {
            condition: "false".into(),
        }));
        let evaluator = ConditionSelectorEvaluator::default();
        assert!(!evaluator.evaluate(&ctx(Method::GET, "/"), &flow));
        assert!(evaluator.evaluate(&ctx(Method::GET, "/"), &Flow::new("none")));
    }

    #[test]
    fn test_channel_selector() {
        let flow: Flow = serde_json::from_value(serde_json::json!({
            "selectors": [{ "type": "CHANNEL", "channel": "orders", "operator": "EXACT", "operations": ["PUBLISH"] }]
        }))
        .unwrap();

        let publish = hermes_core::ExecutionContext::builder()
            .channel("orders", MessageOperation::Publish)
            .build();
        let subscribe = hermes_core::ExecutionContext::builder()
            .channel("orders", MessageOperation::Subscribe)
            .build();

        assert!(ChannelSelectorEvaluator.evaluate(&publish, &flow));
        assert!(!ChannelSelectorEvaluator.evaluate(&subscribe, &flow));
        assert!(!ChannelSelectorEvaluator.evaluate(&ctx(Method::GET, "/orders"), &flow));
    }

    #[test]
    fn test_tag_filter() {
        let only_included = TagFilter::new(["eu"]);
        assert!(only_included.accepts(&Flow::new("a").tag("eu")));
        assert!(!only_included.accepts(&Flow::new("b").tag("us")));
        assert!(!only_included.accepts(&Flow::new("c")));

        let only_excluded = TagFilter::new(["!us"]);
        assert!(only_excluded.accepts(&Flow::new("d")));
        assert!(!only_excluded.accepts(&Flow::new("e").tag("us").tag("eu")));

        assert!(TagFilter::new(Vec::<String>::new()).accepts(&Flow::new("f").tag("x")));
    }
}
