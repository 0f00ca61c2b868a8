//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Detect WebSocket upgrade requests
//! - Forward the handshake to the backend with its upgrade headers intact
//! - Answer the client with the backend's `101` and hand both upgraded
//!   streams to the bridge
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Bridge ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - The backend must confirm with `101`; anything else is a 502 and no bridge
//! - After the handshake the proxy never looks at frames
//! - The bridge runs detached from the request; it is counted by the
//!   connection tracker so shutdown can wait for it

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{header, HeaderMap, HeaderName, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;

use crate::backend::{BackendTarget, DispatchError};
use crate::http::request::{prepare_forward, ForwardOptions, RequestIdExt};
use crate::http::server::AppState;

/// `Connection` lists `upgrade` and `Upgrade` lists `websocket`.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    has_token(headers, header::CONNECTION, "upgrade") && has_token(headers, header::UPGRADE, "websocket")
}

fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Relay an upgrade handshake and, on `101`, start the bridge.
pub async fn proxy_upgrade(
    state: &AppState,
    backend: Arc<BackendTarget>,
    mut request: Request<Body>,
    target: PathAndQuery,
    peer: SocketAddr,
) -> Result<Response<Body>, DispatchError> {
    // Must be taken before the request is rebuilt; the handle lives in its extensions.
    let client_upgrade = hyper::upgrade::on(&mut request);
    let request_id = request.request_id().to_string();

    let forward = prepare_forward(
        request,
        target,
        ForwardOptions {
            peer,
            forwarded_headers: state.forwarded_headers,
            upgrade: true,
        },
    )?;

    let mut backend_response = state.dispatcher.send_upgrade(&backend, forward).await?;
    if backend_response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(DispatchError::UpgradeRefused(backend_response.status()));
    }
    let backend_upgrade = hyper::upgrade::on(&mut backend_response);

    let bridge = state.bridge;
    let shutdown = state.shutdown.subscribe();
    let guard = state.tracker.track();
    tokio::spawn(async move {
        let _guard = guard;
        match tokio::try_join!(client_upgrade, backend_upgrade) {
            Ok((client, upstream)) => {
                tracing::debug!(request_id = %request_id, "WebSocket bridge established");
                let end = bridge
                    .run(TokioIo::new(client), TokioIo::new(upstream), shutdown)
                    .await;
                tracing::debug!(request_id = %request_id, end = end.as_str(), "WebSocket bridge closed");
            }
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "Upgrade did not complete");
            }
        }
    });

    let (parts, _) = backend_response.into_parts();
    Ok(Response::from_parts(parts, Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn detects_upgrade_case_insensitively() {
        assert!(is_upgrade_request(&headers(&[
            (header::CONNECTION, "Upgrade"),
            (header::UPGRADE, "WebSocket"),
        ])));
        assert!(is_upgrade_request(&headers(&[
            (header::CONNECTION, "keep-alive, Upgrade"),
            (header::UPGRADE, "websocket"),
        ])));
    }

    #[test]
    fn missing_either_header_is_not_upgrade() {
        assert!(!is_upgrade_request(&headers(&[(header::UPGRADE, "websocket")])));
        assert!(!is_upgrade_request(&headers(&[(header::CONNECTION, "upgrade")])));
        assert!(!is_upgrade_request(&headers(&[
            (header::CONNECTION, "upgrade"),
            (header::UPGRADE, "h2c"),
        ])));
    }
}
