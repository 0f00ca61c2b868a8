//! Plaintext listener that upgrades every request to HTTPS.
//!
//! # Responsibilities
//! - Answer every method and path with `301 Moved Permanently`
//! - Build `Location` from the request's host and original target
//! - Never contact a backend

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, uri::Authority, HeaderMap, HeaderValue, Request, Response, StatusCode, Uri},
    Router,
};

use crate::http::server::serve_connection;
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;

/// Where redirects point.
#[derive(Debug, Clone)]
pub struct RedirectTarget {
    pub public_https_port: u16,
    pub fallback_host: String,
}

impl RedirectTarget {
    /// `https://<host>[:port]<path?query>`, or `None` when no valid
    /// `Location` can be formed.
    pub fn location(&self, uri: &Uri, headers: &HeaderMap) -> Option<HeaderValue> {
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .and_then(host_without_port)
            .or_else(|| uri.authority().map(|a| a.host().to_string()))
            .unwrap_or_else(|| self.fallback_host.clone());

        let port = match self.public_https_port {
            443 => String::new(),
            port => format!(":{}", port),
        };

        let target = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| pq.starts_with('/'))
            .unwrap_or("/");

        HeaderValue::from_str(&format!("https://{}{}{}", host, port, target)).ok()
    }
}

fn host_without_port(value: &str) -> Option<String> {
    let authority: Authority = value.trim().parse().ok()?;
    let host = authority.host();
    (!host.is_empty()).then(|| host.to_string())
}

/// HTTP-to-HTTPS redirector.
pub struct RedirectServer {
    app: Router,
    idle: Duration,
    shutdown: Shutdown,
    tracker: ConnectionTracker,
}

impl RedirectServer {
    pub fn new(target: RedirectTarget, idle: Duration, shutdown: Shutdown, tracker: ConnectionTracker) -> Self {
        Self {
            app: redirect_router(target),
            idle,
            shutdown,
            tracker,
        }
    }

    /// Accept and answer plaintext connections until shutdown.
    pub async fn run(self, listener: Listener) -> Result<(), ListenerError> {
        let mut shutdown = self.shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTP redirect server starting");
        }

        loop {
            let (stream, peer, permit) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                    Err(e) => return Err(e),
                },
                _ = shutdown.recv() => break,
            };

            let app = self.app.clone();
            let conn_shutdown = self.shutdown.subscribe();
            let guard = self.tracker.track();
            let idle = self.idle;
            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                serve_connection(stream, app, peer, None, idle, conn_shutdown).await;
            });
        }

        tracing::info!("HTTP redirect server stopped accepting");
        Ok(())
    }
}

pub fn redirect_router(target: RedirectTarget) -> Router {
    Router::new().fallback(redirect_handler).with_state(target)
}

async fn redirect_handler(State(target): State<RedirectTarget>, request: Request<Body>) -> Response<Body> {
    metrics::record_redirect();

    let mut response = Response::new(Body::empty());
    match target.location(request.uri(), request.headers()) {
        Some(location) => {
            tracing::debug!(
                method = %request.method(),
                location = ?location,
                "Redirecting to HTTPS"
            );
            *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
            response.headers_mut().insert(header::LOCATION, location);
        }
        None => {
            *response.status_mut() = StatusCode::BAD_REQUEST;
        }
    }
    response
}
