//! Flow resolution.
//!
//! A resolver turns the deployed flows of one scope into the ordered list of
//! flows applicable to a request. Resolution is recomputed on every call:
//! attributes such as `plan` differ between requests. Deployed scopes read one
//! fixed generation, so a redeploy never changes what an in-flight request
//! resolves.
//!
//! ```text
//!   FlowScope (API | plan | organization)   candidate pool
//!        │
//!   SelectorFlowResolver                    enabled + selectors + tags
//!        │
//!   BestMatchFlowResolver (optional)        most specific, earliest on ties
//! ```

use hermes_core::{attributes, ExecutionContext};
use std::sync::Arc;

use crate::condition::{selector_evaluator, CompositeConditionEvaluator, ConditionEvaluator, TagFilter};
use crate::deployment::Deployment;
use crate::model::{Flow, FlowMode};

/// Lazy, finite sequence of resolved flows.
pub type FlowIter<'a> = Box<dyn Iterator<Item = Arc<Flow>> + 'a>;

/// Produces the ordered flows applicable to a request.
pub trait FlowResolver: Send + Sync {
    /// Resolves flows for `ctx`, preserving declaration order.
    fn resolve<'a>(&'a self, ctx: &'a ExecutionContext) -> FlowIter<'a>;
}

impl<R: FlowResolver + ?Sized> FlowResolver for Arc<R> {
    fn resolve<'a>(&'a self, ctx: &'a ExecutionContext) -> FlowIter<'a> {
        (**self).resolve(ctx)
    }
}

impl<R: FlowResolver + ?Sized> FlowResolver for Box<R> {
    fn resolve<'a>(&'a self, ctx: &'a ExecutionContext) -> FlowIter<'a> {
        (**self).resolve(ctx)
    }
}

/// The candidate pool of one scope.
pub trait FlowScope: Send + Sync {
    /// Short scope name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Returns the flows declared at this scope for `ctx`, in declaration order.
    fn candidates(&self, ctx: &ExecutionContext) -> Vec<Arc<Flow>>;
}

/// Flows declared on the API itself.
#[derive(Debug, Clone)]
pub struct ApiFlowScope {
    deployment: Arc<Deployment>,
}

impl ApiFlowScope {
    /// Creates a scope over one deployment generation.
    #[must_use]
    pub const fn new(deployment: Arc<Deployment>) -> Self {
        Self { deployment }
    }
}

impl FlowScope for ApiFlowScope {
    fn name(&self) -> &'static str {
        "api"
    }

    fn candidates(&self, _ctx: &ExecutionContext) -> Vec<Arc<Flow>> {
        self.deployment.api_flows().to_vec()
    }
}

/// Flows declared on the plan named by the `plan` attribute.
///
/// A request without a `plan` attribute, or naming an unknown plan, has no
/// plan flows.
#[derive(Debug, Clone)]
pub struct PlanFlowScope {
    deployment: Arc<Deployment>,
}

impl PlanFlowScope {
    /// Creates a scope over one deployment generation.
    #[must_use]
    pub const fn new(deployment: Arc<Deployment>) -> Self {
        Self { deployment }
    }
}

impl FlowScope for PlanFlowScope {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn candidates(&self, ctx: &ExecutionContext) -> Vec<Arc<Flow>> {
        ctx.attribute(attributes::PLAN)
            .map(|plan| self.deployment.plan_flows(plan).to_vec())
            .unwrap_or_default()
    }
}

/// Organization-wide flows applied to every API.
#[derive(Debug, Clone)]
pub struct OrganizationFlowScope {
    deployment: Arc<Deployment>,
}

impl OrganizationFlowScope {
    /// Creates a scope over one deployment generation.
    #[must_use]
    pub const fn new(deployment: Arc<Deployment>) -> Self {
        Self { deployment }
    }
}

impl FlowScope for OrganizationFlowScope {
    fn name(&self) -> &'static str {
        "organization"
    }

    fn candidates(&self, _ctx: &ExecutionContext) -> Vec<Arc<Flow>> {
        self.deployment.organization_flows().to_vec()
    }
}

/// Fixed list of flows, mostly useful in tests and for static setups.
#[derive(Debug, Clone, Default)]
pub struct StaticFlowScope {
    flows: Vec<Arc<Flow>>,
}

impl StaticFlowScope {
    /// Creates a scope over `flows`.
    #[must_use]
    pub fn new(flows: impl IntoIterator<Item = Flow>) -> Self {
        Self {
            flows: flows.into_iter().map(Arc::new).collect(),
        }
    }
}

impl FlowScope for StaticFlowScope {
    fn name(&self) -> &'static str {
        "static"
    }

    fn candidates(&self, _ctx: &ExecutionContext) -> Vec<Arc<Flow>> {
        self.flows.clone()
    }
}

/// Base resolver: keeps enabled flows whose selectors all match.
///
/// # Example
///
/// ```
/// use hermes_core::fixtures::{self, JsonLiteralBackend};
/// use hermes_flow::{Flow, FlowResolver, PathSelector, Selector, SelectorFlowResolver, StaticFlowScope};
/// use hermes_router::Operator;
/// use std::sync::Arc;
///
/// let resolver = SelectorFlowResolver::new(StaticFlowScope::new([
///     Flow::new("users").selector(Selector::Path(PathSelector::new("/users", Operator::Prefix).unwrap())),
///     Flow::new("orders").selector(Selector::Path(PathSelector::new("/orders", Operator::Prefix).unwrap())),
/// ]));
///
/// let ctx = fixtures::get("/users/1", Arc::new(JsonLiteralBackend::new()));
/// let names: Vec<_> = resolver.resolve(&ctx).map(|f| f.name.clone()).collect();
/// assert_eq!(names, vec!["users"]);
/// ```
pub struct SelectorFlowResolver<S> {
    scope: S,
    evaluator: CompositeConditionEvaluator<Flow>,
}

impl<S: FlowScope> SelectorFlowResolver<S> {
    /// Creates a resolver without a tag constraint.
    #[must_use]
    pub fn new(scope: S) -> Self {
        Self::with_tags(scope, TagFilter::default())
    }

    /// Creates a resolver honoring a sharding-tag constraint.
    #[must_use]
    pub fn with_tags(scope: S, tags: TagFilter) -> Self {
        Self {
            scope,
            evaluator: selector_evaluator(tags),
        }
    }

    /// Returns the scope.
    pub const fn scope(&self) -> &S {
        &self.scope
    }
}

impl<S: FlowScope> FlowResolver for SelectorFlowResolver<S> {
    fn resolve<'a>(&'a self, ctx: &'a ExecutionContext) -> FlowIter<'a> {
        Box::new(
            self.scope
                .candidates(ctx)
                .into_iter()
                .filter(move |flow| flow.enabled && self.evaluator.evaluate(ctx, flow)),
        )
    }
}

/// Keeps only flows constraining the path or channel.
///
/// Used when a scope requires a match: match-all flows do not count.
pub struct MatchRequiredFlowResolver<R> {
    inner: R,
}

impl<R: FlowResolver> MatchRequiredFlowResolver<R> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: FlowResolver> FlowResolver for MatchRequiredFlowResolver<R> {
    fn resolve<'a>(&'a self, ctx: &'a ExecutionContext) -> FlowIter<'a> {
        Box::new(self.inner.resolve(ctx).filter(|flow| flow.has_match_selector()))
    }
}

/// Collapses the wrapped resolver's output to its most specific flow.
///
/// Specificity comes from the flow's path (or channel) pattern; equal
/// specificity goes to the earliest declared flow. An empty input yields
/// nothing.
pub struct BestMatchFlowResolver<R> {
    inner: R,
}

impl<R: FlowResolver> BestMatchFlowResolver<R> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: FlowResolver> FlowResolver for BestMatchFlowResolver<R> {
    fn resolve<'a>(&'a self, ctx: &'a ExecutionContext) -> FlowIter<'a> {
        let mut best: Option<(hermes_router::Specificity, Arc<Flow>)> = None;
        for flow in self.inner.resolve(ctx) {
            let rank = flow.specificity();
            if best.as_ref().map_or(true, |(best_rank, _)| rank > *best_rank) {
                best = Some((rank, flow));
            }
        }
        Box::new(best.map(|(_, flow)| flow).into_iter())
    }
}

/// Assembles the resolver for one scope from its settings.
///
/// # Example
///
/// ```
/// use hermes_flow::{resolver_for, FlowMode, StaticFlowScope, TagFilter};
///
/// let resolver = resolver_for(StaticFlowScope::default(), FlowMode::BestMatch, true, TagFilter::default());
/// # let _ = resolver;
/// ```
pub fn resolver_for<S: FlowScope + 'static>(
    scope: S,
    mode: FlowMode,
    match_required: bool,
    tags: TagFilter,
) -> Arc<dyn FlowResolver> {
    let base = SelectorFlowResolver::with_tags(scope, tags);
    match (mode, match_required) {
        (FlowMode::Default, false) => Arc::new(base),
        (FlowMode::Default, true) => Arc::new(MatchRequiredFlowResolver::new(base)),
        (FlowMode::BestMatch, false) => Arc::new(BestMatchFlowResolver::new(base)),
        (FlowMode::BestMatch, true) => Arc::new(BestMatchFlowResolver::new(
            MatchRequiredFlowResolver::new(base),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PathSelector, Selector};
    use hermes_core::fixtures::{self, JsonLiteralBackend};
    use hermes_router::Operator;
    use http::Method;

    fn path(name: &str, pattern: &str, operator: Operator) -> Flow {
        Flow::new(name).selector(Selector::Path(PathSelector::new(pattern, operator).unwrap()))
    }

    fn ctx(path: &str) -> ExecutionContext {
        fixtures::request(Method::GET, path, Arc::new(JsonLiteralBackend::new()))
    }

    fn names(resolver: &dyn FlowResolver, ctx: &ExecutionContext) -> Vec<String> {
        resolver.resolve(ctx).map(|flow| flow.name.clone()).collect()
    }

    #[test]
    fn test_disabled_flows_never_resolved() {
        let resolver = SelectorFlowResolver::new(StaticFlowScope::new([
            Flow::new("off").enabled(false),
            Flow::new("on"),
        ]));
        assert_eq!(names(&resolver, &ctx("/")), vec!["on"]);
    }

    #[test]
    fn test_resolution_preserves_declaration_order() {
        let resolver = SelectorFlowResolver::new(StaticFlowScope::new([
            path("third", "/", Operator::Prefix),
            path("first", "/a", Operator::Prefix),
            Flow::new("all"),
            path("other", "/b", Operator::Prefix),
        ]));
        assert_eq!(names(&resolver, &ctx("/a/b")), vec!["third", "first", "all"]);
    }

    #[test]
    fn test_best_match_prefers_literal_over_wildcard() {
        let resolver = BestMatchFlowResolver::new(SelectorFlowResolver::new(StaticFlowScope::new([
            path("wildcard", "/a/*", Operator::Prefix),
            path("literal", "/a/b", Operator::Prefix),
        ])));
        assert_eq!(names(&resolver, &ctx("/a/b")), vec!["literal"]);
    }

    #[test]
    fn test_best_match_tie_goes_to_earliest() {
        let resolver = BestMatchFlowResolver::new(SelectorFlowResolver::new(StaticFlowScope::new([
            path("first", "/a/:x", Operator::Prefix),
            path("second", "/a/{y}", Operator::Prefix),
        ])));
        assert_eq!(names(&resolver, &ctx("/a/b")), vec!["first"]);
    }

    #[test]
    fn test_best_match_empty_yields_nothing() {
        let resolver = BestMatchFlowResolver::new(SelectorFlowResolver::new(StaticFlowScope::new([
            path("a", "/a", Operator::Exact),
        ])));
        assert!(names(&resolver, &ctx("/b")).is_empty());
    }

    #[test]
    fn test_match_required_drops_match_all_flows() {
        let resolver = MatchRequiredFlowResolver::new(SelectorFlowResolver::new(
            StaticFlowScope::new([Flow::new("all"), path("users", "/users", Operator::Prefix)]),
        ));
        assert_eq!(names(&resolver, &ctx("/users")), vec!["users"]);
        assert!(names(&resolver, &ctx("/orders")).is_empty());
    }

    #[test]
    fn test_tag_constraint_applies() {
        let resolver = SelectorFlowResolver::with_tags(
            StaticFlowScope::new([Flow::new("eu").tag("eu"), Flow::new("us").tag("us")]),
            TagFilter::new(["eu"]),
        );
        assert_eq!(names(&resolver, &ctx("/")), vec!["eu"]);
    }

    #[test]
    fn test_resolver_for_combinations() {
        let flows = || {
            StaticFlowScope::new([
                Flow::new("all"),
                path("wide", "/", Operator::Prefix),
                path("narrow", "/users", Operator::Prefix),
            ])
        };
        let ctx = ctx("/users");

        let default = resolver_for(flows(), FlowMode::Default, false, TagFilter::default());
        assert_eq!(names(default.as_ref(), &ctx), vec!["all", "wide", "narrow"]);

        let required = resolver_for(flows(), FlowMode::Default, true, TagFilter::default());
        assert_eq!(names(required.as_ref(), &ctx), vec!["wide", "narrow"]);

        let best = resolver_for(flows(), FlowMode::BestMatch, true, TagFilter::default());
        assert_eq!(names(best.as_ref(), &ctx), vec!["narrow"]);
    }
}
