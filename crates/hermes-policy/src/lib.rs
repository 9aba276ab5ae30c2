//! # Hermes Policy
//!
//! Executable policy chains for the Hermes gateway.
//!
//! ## Building blocks
//!
//! | Type | Role |
//! |------|------|
//! | [`Policy`] | Runtime unit instantiated from a flow step |
//! | [`PolicyRegistry`] | Instantiates policies by name; failures are values |
//! | [`PolicyChainFactory`] | Resolved declarations to an ordered or reversed chain |
//! | [`PolicyChain`] | Single-use, forward-only executor with a terminal state |
//! | [`Processor`] / [`ProcessorChain`] | Reusable sequential units wrapped by hooks |
//! | [`FlowChain`] | Resolves the flows of one scope and runs their policies |
//! | [`SubscriptionProcessor`] | Fixes `plan`, `application` and `subscriptionId` |
//!
//! ## Ordering
//!
//! ```text
//! inbound:   P1 → P2 → P3
//! outbound:  P3 → P2 → P1
//! ```
//!
//! Inbound phases run policies in resolution order, outbound phases in the
//! exact reverse, so a policy that wraps the request unwraps the response.

#![doc(html_root_url = "https://docs.rs/hermes-policy/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod attribution;
mod chain;
mod factory;
mod flow_chain;
mod policy;
mod processor;
mod registry;

pub use attribution::{
    ResolvedSubscription, SecuritySkip, SubscriptionProcessor, DEFAULT_CLIENT_IDENTIFIER_HEADER,
};
pub use chain::{ChainOrder, ChainState, PolicyChain};
pub use factory::PolicyChainFactory;
pub use flow_chain::{FlowChain, ResolvedFlows};
pub use policy::{ConditionalPolicy, FnPolicy, Policy};
pub use processor::{Processor, ProcessorChain, ProcessorChainBuilder};
pub use registry::{PolicyLookupError, PolicyPluginRegistry, PolicyRegistry};
