//! HTTP type aliases shared by the engine.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;

/// Buffered body carried by requests and responses inside the engine.
pub type Body = Full<Bytes>;

/// Request handle stored on the execution context.
pub type Request = http::Request<Body>;

/// Response handle stored on the execution context.
pub type Response = http::Response<Body>;

/// Creates an empty response with the given status.
#[must_use]
pub fn empty_response(status: StatusCode) -> Response {
    let mut response = http::Response::new(Body::default());
    *response.status_mut() = status;
    response
}

/// Creates an empty `GET /` request.
#[must_use]
pub fn empty_request() -> Request {
    http::Request::new(Body::default())
}
