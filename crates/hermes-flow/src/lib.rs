//! # Hermes Flow
//!
//! Declarative flows and the machinery that decides which of them apply to a
//! request.
//!
//! - [`Flow`], [`Selector`], [`Step`] - the immutable flow model, deserializable
//!   from JSON or YAML definitions
//! - [`ExpressionConditionEvaluator`] and [`CompositeConditionEvaluator`] -
//!   boolean predicates where anything that is not provably `true` is `false`
//! - [`FlowResolver`] implementations - selector filtering, scoping,
//!   match-required and best-match narrowing
//! - [`DeploymentRegistry`] - atomically swapped deployment generations
//!
//! # Example
//!
//! ```
//! use hermes_core::fixtures::{self, JsonLiteralBackend};
//! use hermes_flow::{
//!     resolver_for, Flow, FlowMode, FlowResolver, PathSelector, Selector, StaticFlowScope, TagFilter,
//! };
//! use hermes_router::Operator;
//! use std::sync::Arc;
//!
//! let scope = StaticFlowScope::new([
//!     Flow::new("catch-all").selector(Selector::Path(PathSelector::new("/a/*", Operator::Prefix).unwrap())),
//!     Flow::new("exact").selector(Selector::Path(PathSelector::new("/a/b", Operator::Exact).unwrap())),
//! ]);
//! let resolver = resolver_for(scope, FlowMode::BestMatch, false, TagFilter::default());
//!
//! let ctx = fixtures::get("/a/b", Arc::new(JsonLiteralBackend::new()));
//! let flows: Vec<_> = resolver.resolve(&ctx).collect();
//! assert_eq!(flows.len(), 1);
//! assert_eq!(flows[0].name, "exact");
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-flow/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod condition;
mod deployment;
mod model;
mod resolver;

pub use condition::{
    selector_evaluator, ChannelSelectorEvaluator, CompositeConditionEvaluator,
    ConditionEvaluator, ConditionSelectorEvaluator, ExpressionConditionEvaluator,
    PathSelectorEvaluator, TagFilter,
};
pub use deployment::{Deployment, DeploymentEvent, DeploymentRegistry};
pub use model::{
    ApiDefinition, ChannelSelector, ConditionSelector, Flow, FlowExecution, FlowMode,
    OrganizationDefinition, PathSelector, Plan, ResolvedPolicy, Selector, Step,
};
pub use resolver::{
    resolver_for, ApiFlowScope, BestMatchFlowResolver, FlowIter, FlowResolver, FlowScope,
    MatchRequiredFlowResolver, OrganizationFlowScope, PlanFlowScope, SelectorFlowResolver,
    StaticFlowScope,
};
