//! Test fixtures shared by the Hermes crates.
//!
//! # Example
//!
//! ```
//! use hermes_core::fixtures::{self, JsonLiteralBackend};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(JsonLiteralBackend::new());
//! let ctx = fixtures::get("/users", backend);
//!
//! assert_eq!(ctx.evaluate_as::<bool>("true"), Ok(true));
//! ```

use http::Method;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::{ExecutionContext, RequestId};
use crate::error::{ExecutionFailure, GatewayError};
use crate::expression::{EvaluationError, ExpressionBackend};
use crate::hook::ProcessorHook;
use crate::phase::ExecutionPhase;

type ExpressionFn = Arc<dyn Fn(&ExecutionContext) -> Value + Send + Sync>;

/// Expression backend understanding JSON literals plus registered expressions.
///
/// `"true"`, `"false"`, `"42"`, `"\"text\""` evaluate to themselves. Anything
/// else fails with [`EvaluationError::Parse`] unless it was registered with
/// [`register`](Self::register).
#[derive(Default)]
pub struct JsonLiteralBackend {
    expressions: HashMap<String, ExpressionFn>,
    evaluations: AtomicUsize,
}

impl JsonLiteralBackend {
    /// Creates a backend with no registered expressions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an expression computed from the context.
    #[must_use]
    pub fn register<F>(mut self, expression: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Value + Send + Sync + 'static,
    {
        self.expressions.insert(expression.into(), Arc::new(f));
        self
    }

    /// Returns how many expressions were evaluated so far.
    #[must_use]
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }
}

impl ExpressionBackend for JsonLiteralBackend {
    fn evaluate(&self, expression: &str, ctx: &ExecutionContext) -> Result<Value, EvaluationError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = self.expressions.get(expression) {
            return Ok(f(ctx));
        }
        serde_json::from_str(expression).map_err(|e| EvaluationError::Parse {
            expression: expression.to_string(),
            message: e.to_string(),
        })
    }

    fn name(&self) -> &str {
        "json-literal"
    }
}

/// Hook recording every notification as a `kind:unit:phase` string.
#[derive(Debug)]
pub struct RecordingHook {
    id: String,
    events: Mutex<Vec<String>>,
}

impl RecordingHook {
    /// Creates a recording hook with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl ProcessorHook for RecordingHook {
    fn id(&self) -> &str {
        &self.id
    }

    fn pre(&self, unit: &str, _ctx: &ExecutionContext, phase: ExecutionPhase) {
        self.record(format!("pre:{unit}:{phase}"));
    }

    fn post(&self, unit: &str, _ctx: &ExecutionContext, phase: ExecutionPhase) {
        self.record(format!("post:{unit}:{phase}"));
    }

    fn error(&self, unit: &str, _ctx: &ExecutionContext, phase: ExecutionPhase, _error: &GatewayError) {
        self.record(format!("error:{unit}:{phase}"));
    }

    fn interrupt(&self, unit: &str, _ctx: &ExecutionContext, phase: ExecutionPhase) {
        self.record(format!("interrupt:{unit}:{phase}"));
    }

    fn interrupt_with(
        &self,
        unit: &str,
        _ctx: &ExecutionContext,
        phase: ExecutionPhase,
        failure: &ExecutionFailure,
    ) {
        self.record(format!(
            "interrupt_with:{unit}:{phase}:{}",
            failure.status().as_u16()
        ));
    }

    fn cancelled(&self, unit: &str, _request_id: RequestId, phase: ExecutionPhase) {
        self.record(format!("cancelled:{unit}:{phase}"));
    }
}

/// Creates a context for `method path` evaluated with `backend`.
#[must_use]
pub fn request(method: Method, path: &str, backend: Arc<dyn ExpressionBackend>) -> ExecutionContext {
    ExecutionContext::builder()
        .method(method)
        .path(path)
        .expression_backend(backend)
        .build()
}

/// Creates a context for `GET path` evaluated with `backend`.
#[must_use]
pub fn get(path: &str, backend: Arc<dyn ExpressionBackend>) -> ExecutionContext {
    request(Method::GET, path, backend)
}
