//! Request identification and preparation for forwarding.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) unless the client sent one
//! - Echo the request ID on the response
//! - Build the backend-bound copy of a request (target, headers)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Original request preserved for logging; modified copy forwarded

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{HeaderName, HeaderValue, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use uuid::Uuid;

use crate::security::headers::{add_forwarded, strip_hop_by_hop};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Layer that assigns `x-request-id` to requests missing one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid)
}

/// Layer that copies `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID)
}

/// Read the request ID assigned by `set_request_id_layer`.
pub trait RequestIdExt {
    fn request_id(&self) -> &str;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> &str {
        self.headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }
}

/// How the backend-bound request should be built.
#[derive(Debug, Clone, Copy)]
pub struct ForwardOptions {
    pub peer: SocketAddr,
    pub forwarded_headers: bool,
    /// Keep `Upgrade`/`Connection` for a WebSocket handshake.
    pub upgrade: bool,
}

/// Rebuild `request` for the backend with the given origin-form target.
pub fn prepare_forward(
    request: Request<Body>,
    target: PathAndQuery,
    options: ForwardOptions,
) -> Result<Request<Body>, axum::http::Error> {
    let (parts, body) = request.into_parts();

    let mut headers = parts.headers;
    if !options.upgrade {
        strip_hop_by_hop(&mut headers);
    }
    if options.forwarded_headers {
        add_forwarded(&mut headers, options.peer);
    }

    let mut forwarded = Request::builder()
        .method(parts.method)
        .uri(target.as_str())
        .body(body)?;
    *forwarded.headers_mut() = headers;
    Ok(forwarded)
}
