//! # Hermes Core
//!
//! Core types shared by every crate of the Hermes gateway engine.
//!
//! This crate provides the foundational types used throughout Hermes:
//!
//! - [`ExecutionContext`] - Per-request state: request/response handles, attributes, path parameters
//! - [`ExecutionPhase`] - Direction of processing (request, response, message phases)
//! - [`GatewayError`] - Standard engine error type
//! - [`ExecutionFailure`] - Well-formed payload carried by an interruption
//! - [`ExpressionBackend`] - Capability boundary for condition expressions
//! - [`ProcessorHook`] - Observer invoked around every unit of chain execution
//! - [`UnitOutcome`] / [`ChainOutcome`] - Typed results of units and chains

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod attributes;
mod context;
mod error;
mod expression;
pub mod fixtures;
mod hook;
mod outcome;
mod phase;
pub mod types;

pub use context::{
    ConnectionSignal, ExecutionContext, ExecutionContextBuilder, MessageOperation, RequestId,
};
pub use error::{ErrorCategory, ErrorEnvelope, ExecutionFailure, GatewayError, GatewayResult};
pub use expression::{EvaluationError, ExpressionBackend, UnsupportedExpressionBackend};
pub use hook::{HookChain, ProcessorHook, UnitGuard};
pub use outcome::{ChainOutcome, UnitOutcome, UnitResult};
pub use phase::ExecutionPhase;
pub use types::{Body, Request, Response};

/// A boxed future used at every asynchronous seam of the engine.
pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
