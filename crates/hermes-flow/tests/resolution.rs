//! Resolution behavior across scopes, definitions and generations.

use hermes_core::fixtures::{self, JsonLiteralBackend};
use hermes_core::{attributes, ExecutionContext};
use hermes_flow::{
    resolver_for, ApiDefinition, ApiFlowScope, Deployment, DeploymentRegistry, Flow, FlowMode,
    FlowResolver, OrganizationDefinition, PathSelector, PlanFlowScope, Selector,
    SelectorFlowResolver, StaticFlowScope, TagFilter,
};
use hermes_router::Operator;
use http::Method;
use proptest::prelude::*;
use std::sync::Arc;

const DEFINITION: &str = r#"
id: store
name: Store API
flow_execution:
  mode: best_match
flows:
  - name: all-products
    selectors:
      - type: PATH
        path: /products
        operator: STARTS_WITH
    request:
      - name: Key check
        policy: api-key
  - name: one-product
    selectors:
      - type: PATH
        path: /products/:id
        operator: EQUALS
        methods: [GET]
    request:
      - policy: cache
        configuration:
          ttl: 60
plans:
  - id: gold
    flows:
      - name: gold-quota
        request:
          - policy: quota
            condition: "true"
"#;

fn ctx(method: Method, path: &str) -> ExecutionContext {
    fixtures::request(method, path, Arc::new(JsonLiteralBackend::new()))
}

fn names(resolver: &dyn FlowResolver, ctx: &ExecutionContext) -> Vec<String> {
    resolver.resolve(ctx).map(|flow| flow.name.clone()).collect()
}

fn registry() -> DeploymentRegistry {
    let api: ApiDefinition = serde_yaml::from_str(DEFINITION).unwrap();
    let org = OrganizationDefinition {
        flows: vec![Flow::new("platform-logging")],
        ..OrganizationDefinition::default()
    };
    DeploymentRegistry::new(Deployment::new(api, Some(org)).unwrap())
}

#[test]
fn yaml_definition_resolves_best_match() {
    let registry = registry();
    let mode = registry.current().flow_execution().mode;
    assert_eq!(mode, FlowMode::BestMatch);

    let resolver = resolver_for(ApiFlowScope::new(registry.current()), mode, false, TagFilter::default());

    assert_eq!(names(resolver.as_ref(), &ctx(Method::GET, "/products/42")), vec!["one-product"]);
    assert_eq!(names(resolver.as_ref(), &ctx(Method::POST, "/products/42")), vec!["all-products"]);
    assert!(names(resolver.as_ref(), &ctx(Method::GET, "/orders")).is_empty());
}

#[test]
fn plan_scope_follows_plan_attribute() {
    let resolver = SelectorFlowResolver::new(PlanFlowScope::new(registry().current()));

    let mut ctx = ctx(Method::GET, "/products");
    assert!(names(&resolver, &ctx).is_empty());

    ctx.set_attribute(attributes::PLAN, "gold");
    assert_eq!(names(&resolver, &ctx), vec!["gold-quota"]);

    ctx.set_attribute(attributes::PLAN, "unknown");
    assert!(names(&resolver, &ctx).is_empty());
}

#[test]
fn scope_stays_on_its_generation_after_redeploy() {
    let registry = registry();
    let resolver = SelectorFlowResolver::new(ApiFlowScope::new(registry.current()));
    let ctx = ctx(Method::GET, "/products");

    let mut next = ApiDefinition::new("store");
    next.flows.push(Flow::new("replacement"));
    registry.swap(Deployment::new(next, None).unwrap());

    assert_eq!(names(&resolver, &ctx), vec!["all-products"]);

    let redeployed = SelectorFlowResolver::new(ApiFlowScope::new(registry.current()));
    assert_eq!(names(&redeployed, &ctx), vec!["replacement"]);
}

fn flow_strategy() -> impl Strategy<Value = (String, Operator)> {
    (
        proptest::collection::vec(prop_oneof![Just("a"), Just("b"), Just(":p"), Just("*")], 0..4),
        prop_oneof![Just(Operator::Exact), Just(Operator::Prefix)],
    )
        .prop_map(|(segments, operator)| {
            let mut cleaned: Vec<&str> = Vec::new();
            for segment in segments {
                cleaned.push(segment);
                if segment == "*" {
                    break;
                }
            }
            (format!("/{}", cleaned.join("/")), operator)
        })
}

proptest! {
    #[test]
    fn resolve_returns_exactly_the_matching_flows(
        patterns in proptest::collection::vec(flow_strategy(), 0..8),
        request in proptest::collection::vec(prop_oneof![Just("a"), Just("b"), Just("c")], 0..4),
        removed in 0usize..8,
    ) {
        let flows: Vec<Flow> = patterns
            .iter()
            .enumerate()
            .map(|(i, (pattern, operator))| {
                Flow::new(format!("f{i}"))
                    .selector(Selector::Path(PathSelector::new(pattern, *operator).unwrap()))
            })
            .collect();
        let path = format!("/{}", request.join("/"));
        let ctx = ctx(Method::GET, &path);

        let expected: Vec<String> = flows
            .iter()
            .filter(|flow| {
                let selector = flow.path_selector().unwrap();
                selector.path.matches(&path, selector.operator).is_some()
            })
            .map(|flow| flow.name.clone())
            .collect();

        let resolver = SelectorFlowResolver::new(StaticFlowScope::new(flows.clone()));
        let resolved = names(&resolver, &ctx);
        prop_assert_eq!(&resolved, &expected);

        if !flows.is_empty() {
            let removed = removed % flows.len();
            let removed_name = flows[removed].name.clone();
            let mut remaining = flows;
            remaining.remove(removed);

            let resolver = SelectorFlowResolver::new(StaticFlowScope::new(remaining));
            let without: Vec<String> = expected
                .into_iter()
                .filter(|name| *name != removed_name)
                .collect();
            prop_assert_eq!(names(&resolver, &ctx), without);
        }
    }
}
