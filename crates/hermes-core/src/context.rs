//! Per-request execution context.
//!
//! One [`ExecutionContext`] exists per in-flight request. It is owned by the
//! task driving that request, threaded by `&mut` through every chain, and
//! dropped when the request completes. Nothing in it is shared across
//! requests except the [`ConnectionSignal`] handle and the expression backend.

use hermes_router::Params;
use http::{HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::ExecutionFailure;
use crate::expression::{self, EvaluationError, ExpressionBackend, UnsupportedExpressionBackend};
use crate::types::{empty_response, Body, Request, Response};

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
///
/// # Example
///
/// ```
/// use hermes_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation performed on a channel by a message-style API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageOperation {
    /// The client publishes messages.
    Publish,
    /// The client subscribes to messages.
    Subscribe,
}

#[derive(Debug, Default)]
struct SignalState {
    draining: AtomicBool,
    disconnected: AtomicBool,
}

/// Soft connection-level signals observed by chains.
///
/// The server side keeps a clone and flips the flags; the engine only reads
/// them once per chain entry point. Neither flag aborts a chain that is
/// already executing.
///
/// # Example
///
/// ```
/// use hermes_core::ConnectionSignal;
///
/// let signal = ConnectionSignal::new();
/// let observer = signal.clone();
///
/// signal.drain();
/// assert!(observer.is_draining());
/// assert!(!observer.is_disconnected());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConnectionSignal {
    state: Arc<SignalState>,
}

impl ConnectionSignal {
    /// Creates a signal with both flags cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the connection as draining; the response should close it.
    pub fn drain(&self) {
        self.state.draining.store(true, Ordering::SeqCst);
    }

    /// Marks the client as gone.
    pub fn disconnect(&self) {
        self.state.disconnected.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`drain`](Self::drain) was called.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.state.draining.load(Ordering::SeqCst)
    }

    /// Returns true once [`disconnect`](Self::disconnect) was called.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.state.disconnected.load(Ordering::SeqCst)
    }
}

/// Per-request state flowing through every chain of the gateway.
///
/// Holds the request and response handles, the string-keyed attribute map
/// (`plan`, `application`, `subscriptionId`, ...), path parameters bound by
/// the matched flows, typed extensions, and the expression backend used by
/// conditions.
///
/// # Example
///
/// ```
/// use hermes_core::{attributes, ExecutionContext};
/// use http::Method;
///
/// let mut ctx = ExecutionContext::builder()
///     .method(Method::GET)
///     .path("/users")
///     .build();
///
/// ctx.set_attribute(attributes::PLAN, "gold");
/// assert_eq!(ctx.attribute(attributes::PLAN), Some("gold"));
/// assert_eq!(ctx.path(), "/users");
/// ```
pub struct ExecutionContext {
    request_id: RequestId,
    request: Request,
    response: Response,
    remote_address: Option<SocketAddr>,
    attributes: HashMap<String, String>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    path_parameters: Params,
    expression_backend: Arc<dyn ExpressionBackend>,
    interrupted: bool,
    failure: Option<ExecutionFailure>,
    connection: ConnectionSignal,
    channel: Option<String>,
    operation: Option<MessageOperation>,
    started_at: Instant,
}

impl ExecutionContext {
    /// Creates a context for `request` evaluated with `backend`.
    #[must_use]
    pub fn new(request: Request, backend: Arc<dyn ExpressionBackend>) -> Self {
        Self {
            request_id: RequestId::new(),
            request,
            response: empty_response(StatusCode::OK),
            remote_address: None,
            attributes: HashMap::new(),
            extensions: HashMap::new(),
            path_parameters: Params::new(),
            expression_backend: backend,
            interrupted: false,
            failure: None,
            connection: ConnectionSignal::new(),
            channel: None,
            operation: None,
            started_at: Instant::now(),
        }
    }

    /// Returns a builder for a context.
    #[must_use]
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::new()
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the request for modification.
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Returns the response.
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.response
    }

    /// Returns the response for modification.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Replaces the response.
    pub fn set_response(&mut self, response: Response) {
        self.response = response;
    }

    /// Returns the remote address of the client, if known.
    #[must_use]
    pub const fn remote_address(&self) -> Option<SocketAddr> {
        self.remote_address
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Sets a string attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Removes an attribute.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    /// Returns every attribute.
    #[must_use]
    pub const fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Retrieves a typed extension value for modification.
    pub fn get_extension_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns the path parameters bound by matched flows.
    #[must_use]
    pub const fn path_parameters(&self) -> &Params {
        &self.path_parameters
    }

    /// Adds path parameters; names already bound keep their first value.
    pub fn merge_path_parameters(&mut self, params: &Params) {
        for (name, value) in params {
            if self.path_parameters.get(name).is_none() {
                self.path_parameters.push(name, value);
            }
        }
    }

    /// Returns the expression backend.
    #[must_use]
    pub fn expression_backend(&self) -> &dyn ExpressionBackend {
        self.expression_backend.as_ref()
    }

    /// Evaluates `expression` with the context's backend and converts the result.
    pub fn evaluate_as<T: DeserializeOwned>(&self, expression: &str) -> Result<T, EvaluationError> {
        expression::evaluate_as(self.expression_backend.as_ref(), expression, self)
    }

    /// Marks the request as interrupted without a failure payload.
    ///
    /// The interrupting unit is responsible for the response it left in place.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    /// Marks the request as interrupted and renders `failure` as the response.
    pub fn interrupt_with(&mut self, failure: ExecutionFailure) {
        let request_id = self.request_id.to_string();
        self.response = failure.to_response(Some(&request_id));
        self.failure = Some(failure);
        self.interrupted = true;
    }

    /// Returns true once the request was interrupted.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Returns the failure payload of the interruption, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&ExecutionFailure> {
        self.failure.as_ref()
    }

    /// Returns the connection signal handle.
    #[must_use]
    pub const fn connection(&self) -> &ConnectionSignal {
        &self.connection
    }

    /// Returns the channel addressed by a message-style request.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Returns the channel operation of a message-style request.
    #[must_use]
    pub const fn operation(&self) -> Option<MessageOperation> {
        self.operation
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("path", &self.request.uri().path())
            .field("attributes", &self.attributes)
            .field("path_parameters", &self.path_parameters)
            .field("interrupted", &self.interrupted)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExecutionContext`].
///
/// Defaults to `GET /`, no remote address and the
/// [`UnsupportedExpressionBackend`].
pub struct ExecutionContextBuilder {
    request: http::request::Builder,
    body: Body,
    remote_address: Option<SocketAddr>,
    attributes: HashMap<String, String>,
    backend: Option<Arc<dyn ExpressionBackend>>,
    connection: Option<ConnectionSignal>,
    channel: Option<(String, MessageOperation)>,
    request_id: Option<RequestId>,
}

impl ExecutionContextBuilder {
    fn new() -> Self {
        Self {
            request: http::Request::builder(),
            body: Body::default(),
            remote_address: None,
            attributes: HashMap::new(),
            backend: None,
            connection: None,
            channel: None,
            request_id: None,
        }
    }

    /// Sets the request method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.request = self.request.method(method);
        self
    }

    /// Sets the request path (and optional query).
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.request = self.request.uri(path);
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.body = Body::new(body.into());
        self
    }

    /// Sets the remote address.
    #[must_use]
    pub const fn remote_address(mut self, address: SocketAddr) -> Self {
        self.remote_address = Some(address);
        self
    }

    /// Presets an attribute.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Sets the expression backend.
    #[must_use]
    pub fn expression_backend(mut self, backend: Arc<dyn ExpressionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Shares a connection signal with the server side.
    #[must_use]
    pub fn connection(mut self, signal: ConnectionSignal) -> Self {
        self.connection = Some(signal);
        self
    }

    /// Marks the request as a message-style request on `channel`.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>, operation: MessageOperation) -> Self {
        self.channel = Some((channel.into(), operation));
        self
    }

    /// Uses a fixed request ID.
    #[must_use]
    pub const fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Builds the context.
    ///
    /// An invalid method, URI or header falls back to an empty `GET /`
    /// request rather than failing.
    #[must_use]
    pub fn build(self) -> ExecutionContext {
        let request = self
            .request
            .body(self.body)
            .unwrap_or_else(|_| crate::types::empty_request());
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(UnsupportedExpressionBackend));

        let mut ctx = ExecutionContext::new(request, backend);
        ctx.remote_address = self.remote_address;
        ctx.attributes = self.attributes;
        if let Some(connection) = self.connection {
            ctx.connection = connection;
        }
        if let Some((channel, operation)) = self.channel {
            ctx.channel = Some(channel);
            ctx.operation = Some(operation);
        }
        if let Some(request_id) = self.request_id {
            ctx.request_id = request_id;
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_unique() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_builder_defaults() {
        let ctx = ExecutionContext::builder().build();
        assert_eq!(ctx.method(), Method::GET);
        assert_eq!(ctx.path(), "/");
        assert!(ctx.remote_address().is_none());
        assert!(!ctx.is_interrupted());
        assert_eq!(ctx.response().status(), StatusCode::OK);
    }

    #[test]
    fn test_attributes() {
        let mut ctx = ExecutionContext::builder().attribute("plan", "silver").build();
        assert_eq!(ctx.attribute("plan"), Some("silver"));

        ctx.set_attribute("plan", "gold");
        assert_eq!(ctx.attribute("plan"), Some("gold"));
        assert_eq!(ctx.remove_attribute("plan"), Some("gold".to_string()));
        assert_eq!(ctx.attribute("plan"), None);
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct Marker(u32);

        let mut ctx = ExecutionContext::builder().build();
        assert!(ctx.get_extension::<Marker>().is_none());

        ctx.set_extension(Marker(1));
        if let Some(marker) = ctx.get_extension_mut::<Marker>() {
            marker.0 += 1;
        }
        assert_eq!(ctx.get_extension::<Marker>(), Some(&Marker(2)));
        assert_eq!(ctx.remove_extension::<Marker>(), Some(Marker(2)));
        assert!(ctx.get_extension::<Marker>().is_none());
    }

    #[test]
    fn test_merge_path_parameters_keeps_first_binding() {
        let mut ctx = ExecutionContext::builder().build();

        let mut first = Params::new();
        first.push("id", "1");
        ctx.merge_path_parameters(&first);

        let mut second = Params::new();
        second.push("id", "2");
        second.push("name", "x");
        ctx.merge_path_parameters(&second);

        assert_eq!(ctx.path_parameters().get("id"), Some("1"));
        assert_eq!(ctx.path_parameters().get("name"), Some("x"));
    }

    #[test]
    fn test_interrupt_with_sets_response() {
        let mut ctx = ExecutionContext::builder().build();
        ctx.interrupt_with(ExecutionFailure::new(StatusCode::FORBIDDEN).message("nope"));

        assert!(ctx.is_interrupted());
        assert_eq!(ctx.response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ctx.failure().and_then(ExecutionFailure::message_ref),
            Some("nope")
        );
    }

    #[test]
    fn test_plain_interrupt_keeps_response() {
        let mut ctx = ExecutionContext::builder().build();
        *ctx.response_mut().status_mut() = StatusCode::ACCEPTED;
        ctx.interrupt();

        assert!(ctx.is_interrupted());
        assert!(ctx.failure().is_none());
        assert_eq!(ctx.response().status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_connection_signal_shared() {
        let signal = ConnectionSignal::new();
        let ctx = ExecutionContext::builder().connection(signal.clone()).build();

        assert!(!ctx.connection().is_disconnected());
        signal.disconnect();
        assert!(ctx.connection().is_disconnected());
    }

    #[test]
    fn test_channel_request() {
        let ctx = ExecutionContext::builder()
            .channel("orders", MessageOperation::Subscribe)
            .build();
        assert_eq!(ctx.channel(), Some("orders"));
        assert_eq!(ctx.operation(), Some(MessageOperation::Subscribe));
    }
}
