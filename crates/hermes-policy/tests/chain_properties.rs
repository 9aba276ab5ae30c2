//! Ordering and failure properties of flow chains built from definitions.

use hermes_core::fixtures::{self, JsonLiteralBackend, RecordingHook};
use hermes_core::{ExecutionPhase, GatewayError, HookChain, UnitOutcome};
use hermes_flow::{
    resolver_for, Flow, FlowMode, PathSelector, ResolvedPolicy, Selector, StaticFlowScope, Step,
    TagFilter,
};
use hermes_policy::{
    FlowChain, FnPolicy, Policy, PolicyChainFactory, PolicyPluginRegistry,
};
use hermes_router::{MethodSet, Operator};
use http::Method;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;

type Journal = Arc<Mutex<Vec<String>>>;

fn journaling_registry(names: &[String], journal: &Journal) -> PolicyPluginRegistry {
    let registry = PolicyPluginRegistry::new();
    for name in names {
        let journal = Arc::clone(journal);
        let id = name.clone();
        registry.register(name.clone(), move |_, _| {
            let journal = Arc::clone(&journal);
            let id = id.clone();
            Ok(Arc::new(FnPolicy::new(id.clone(), move |_ctx, phase| {
                journal.lock().push(format!("{id}:{phase}"));
                Ok(UnitOutcome::Continue)
            })) as Arc<dyn Policy>)
        });
    }
    registry
}

fn get_users_flow() -> Flow {
    let selector = PathSelector::new("/users", Operator::Exact)
        .unwrap()
        .methods(MethodSet::new().with(Method::GET));
    Flow::new("get-users")
        .selector(Selector::Path(selector))
        .step(ExecutionPhase::Request, Step::new("p1"))
}

#[tokio::test]
async fn get_users_builds_one_inbound_policy_and_noop_outbound() {
    let journal = Journal::default();
    let factory = PolicyChainFactory::new(Arc::new(journaling_registry(&["p1".into()], &journal)));
    let chain = FlowChain::new(
        "api",
        resolver_for(
            StaticFlowScope::new([get_users_flow()]),
            FlowMode::Default,
            false,
            TagFilter::default(),
        ),
        factory,
    );
    let mut ctx = fixtures::get("/users", Arc::new(JsonLiteralBackend::new()));

    let mut inbound = chain.build(&mut ctx, ExecutionPhase::Request);
    assert_eq!(inbound.len(), 1);
    assert!(inbound.execute(&mut ctx).await.is_completed());

    let mut outbound = chain.build(&mut ctx, ExecutionPhase::Response);
    assert!(outbound.is_empty());
    assert!(outbound.execute(&mut ctx).await.is_completed());

    assert_eq!(*journal.lock(), vec!["p1:request"]);
}

#[tokio::test]
async fn post_users_resolves_nothing() {
    let journal = Journal::default();
    let factory = PolicyChainFactory::new(Arc::new(journaling_registry(&["p1".into()], &journal)));
    let chain = FlowChain::new(
        "api",
        resolver_for(
            StaticFlowScope::new([get_users_flow()]),
            FlowMode::Default,
            false,
            TagFilter::default(),
        ),
        factory,
    );
    let mut ctx = fixtures::request(Method::POST, "/users", Arc::new(JsonLiteralBackend::new()));

    assert!(chain.build(&mut ctx, ExecutionPhase::Request).is_empty());
}

#[tokio::test]
async fn failure_mid_chain_reports_error_hook_and_skips_rest() {
    let registry = PolicyPluginRegistry::new();
    registry.register("ok", |_, _| {
        Ok(Arc::new(FnPolicy::new("ok", |_ctx, _| Ok(UnitOutcome::Continue))) as Arc<dyn Policy>)
    });
    registry.register("boom", |_, _| {
        Ok(Arc::new(FnPolicy::new("boom", |_ctx, _| {
            Err(GatewayError::policy_execution("boom", "backend quota store down"))
        })) as Arc<dyn Policy>)
    });
    let recorder = Arc::new(RecordingHook::new("rec"));
    let factory = PolicyChainFactory::new(Arc::new(registry))
        .with_hooks(HookChain::new().with(recorder.clone()));
    let mut ctx = fixtures::get("/", Arc::new(JsonLiteralBackend::new()));

    let declared: Vec<ResolvedPolicy> = ["ok", "boom", "ok"]
        .into_iter()
        .map(|name| ResolvedPolicy::new(name, serde_json::Value::Null))
        .collect();
    let mut chain = factory.create("api-request", &declared, ExecutionPhase::Request, &ctx);

    assert!(chain.execute(&mut ctx).await.is_failed());
    assert_eq!(
        recorder.events(),
        vec![
            "pre:ok:request",
            "post:ok:request",
            "pre:boom:request",
            "error:boom:request",
        ]
    );
}

proptest! {
    #[test]
    fn outbound_runs_exact_reverse_of_inbound(count in 1usize..8) {
        let names: Vec<String> = (1..=count).map(|i| format!("p{i}")).collect();
        let journal = Journal::default();
        let factory = PolicyChainFactory::new(Arc::new(journaling_registry(&names, &journal)));

        let mut flow = Flow::new("all");
        for name in &names {
            flow = flow
                .step(ExecutionPhase::Request, Step::new(name.clone()))
                .step(ExecutionPhase::Response, Step::new(name.clone()));
        }
        let chain = FlowChain::new(
            "api",
            resolver_for(StaticFlowScope::new([flow]), FlowMode::Default, false, TagFilter::default()),
            factory,
        );

        tokio_test::block_on(async {
            let mut ctx = fixtures::get("/", Arc::new(JsonLiteralBackend::new()));
            chain.execute(&mut ctx, ExecutionPhase::Request).await;
            chain.execute(&mut ctx, ExecutionPhase::Response).await;
        });

        let entries = journal.lock().clone();
        let inbound: Vec<&str> = entries
            .iter()
            .filter_map(|entry| entry.strip_suffix(":request"))
            .collect();
        let mut outbound: Vec<&str> = entries
            .iter()
            .filter_map(|entry| entry.strip_suffix(":response"))
            .collect();
        outbound.reverse();

        prop_assert_eq!(inbound.len(), count);
        prop_assert_eq!(inbound, outbound);
    }
}
