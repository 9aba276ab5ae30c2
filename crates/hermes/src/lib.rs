//! # Hermes
//!
//! **Flow resolution and policy chain execution for API gateways**
//!
//! Hermes decides, for every request crossing a gateway, which declared flows
//! apply and runs their policies as ordered chains:
//!
//! - **Flow resolution** at organization, plan and API scope, with path,
//!   method, channel and condition selectors, best-match narrowing and
//!   sharding tags
//! - **Policy chains** that run inbound in declaration order and outbound in
//!   reverse, stopping at the first interruption or failure
//! - **Hot redeployment** of definitions without dropping in-flight requests
//! - **Structured logs and Prometheus metrics** around every unit
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hermes::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new().with_defaults().with_file("hermes.toml")?.load()?;
//!     hermes::init_telemetry(&config)?;
//!
//!     let policies = Arc::new(PolicyPluginRegistry::new());
//!     let gateway = Gateway::start(&config, policies, NoopInvoker)?;
//!
//!     let mut ctx = ExecutionContext::builder().path("/users").build();
//!     gateway.reactor().handle(&mut ctx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Request lifecycle
//!
//! ```text
//! Request → Attribution → Organization → Plan → API → Invoker
//!                                                       ↓
//! Response ←──────────── Organization ← Plan ← API ←───┘
//! ```

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use hermes_core as core;

// Re-export path matching
pub use hermes_router as router;

// Re-export flow model and resolution
pub use hermes_flow as flow;

// Re-export policies and chains
pub use hermes_policy as policy;

// Re-export configuration
pub use hermes_config as config;

// Re-export logging and metrics
pub use hermes_telemetry as telemetry;

pub mod bootstrap;
pub mod error;
pub mod invoker;
pub mod reactor;

pub use bootstrap::{init_telemetry, Deployments, Gateway};
pub use error::{HermesError, HermesResult};
pub use invoker::{FnInvoker, Invoker, NoopInvoker};
pub use reactor::{ApiReactor, ApiReactorBuilder, ReactorSettings};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use hermes::prelude::*;
///
/// let registry = DeploymentRegistry::default();
/// let reactor = ApiReactor::builder(registry).build();
/// assert_eq!(reactor.settings().mode, FlowMode::Default);
/// ```
pub mod prelude {
    pub use crate::bootstrap::{init_telemetry, Deployments, Gateway};
    pub use crate::error::{HermesError, HermesResult};
    pub use crate::invoker::{FnInvoker, Invoker, NoopInvoker};
    pub use crate::reactor::{ApiReactor, ApiReactorBuilder, ReactorSettings};

    pub use hermes_config::{ConfigLoader, HermesConfig};
    pub use hermes_core::{
        ChainOutcome, ExecutionContext, ExecutionFailure, ExecutionPhase, GatewayError,
        ProcessorHook, UnitOutcome, UnitResult,
    };
    pub use hermes_flow::{ApiDefinition, Deployment, DeploymentRegistry, Flow, FlowMode, Step};
    pub use hermes_policy::{
        FnPolicy, Policy, PolicyPluginRegistry, PolicyRegistry, ResolvedSubscription,
        SecuritySkip,
    };
    pub use hermes_telemetry::{MetricsReporter, Reporter, RequestReport};
}
