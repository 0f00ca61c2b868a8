//! Response handling and transformation.
//!
//! # Responsibilities
//! - Transform backend response for client
//! - Handle response streaming efficiently
//! - Map backend errors to appropriate HTTP status codes
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped automatically
//! - Gateway errors carry a generic reason phrase, never backend details

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;
use hyper::body::Incoming;
use tower_http::timeout::TimeoutBody;

use crate::backend::DispatchError;
use crate::security::headers::strip_hop_by_hop;

/// Plain-text gateway error with no internal detail.
pub fn gateway_error(status: StatusCode) -> Response<Body> {
    let reason = status.canonical_reason().unwrap_or("Gateway Error");
    let mut response = Response::new(Body::from(reason));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> axum::response::Response {
        gateway_error(self.status())
    }
}

/// Stream a backend response back to the client.
pub fn from_backend(response: Response<TimeoutBody<Incoming>>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gateway_error_is_generic() {
        let response = gateway_error(StatusCode::BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Bad Gateway");
    }

    #[test]
    fn dispatch_timeout_renders_504() {
        let err = DispatchError::Timeout(std::time::Duration::from_secs(3));
        assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
