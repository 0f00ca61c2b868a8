//! Backend connections.
//!
//! # Responsibilities
//! - Forward plain requests over a pooled, persistent HTTP/1.1 client
//! - Open dedicated connections for upgrade handshakes
//! - Enforce connect and response-head deadlines
//! - Close bodies that stall for longer than the dispatch idle window
//!
//! # Design Decisions
//! - Exactly one attempt per request; canceled pooled requests are not replayed
//! - Bodies stream in both directions; nothing is buffered here
//! - Every failure maps to a gateway status without leaking backend details

use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::http::uri::{InvalidUri, PathAndQuery, Scheme, Uri};
use axum::http::{header, HeaderValue, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tower_http::timeout::TimeoutBody;

use crate::backend::target::BackendTarget;
use crate::config::TimeoutConfig;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid upstream request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
    #[error("invalid request target: {0}")]
    InvalidTarget(#[from] InvalidUri),
    #[error("backend connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("upstream connection failed: {0}")]
    Connection(#[from] hyper::Error),
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),
    #[error("backend refused upgrade with status {0}")]
    UpgradeRefused(StatusCode),
}

impl DispatchError {
    /// Status surfaced to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Sends requests to backends.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client<HttpConnector, Body>,
    connect_timeout: Duration,
    response_timeout: Duration,
    body_idle: Duration,
}

impl Dispatcher {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let connect_timeout = Duration::from_secs(timeouts.connect_secs);
        let body_idle = Duration::from_secs(timeouts.dispatch_idle_secs);

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(body_idle)
            .pool_timer(TokioTimer::new())
            .retry_canceled_requests(false)
            .build(connector);

        Self {
            client,
            connect_timeout,
            response_timeout: Duration::from_secs(timeouts.response_secs),
            body_idle,
        }
    }

    /// Forward `request` (origin-form target) to `target` over the pool.
    ///
    /// Both bodies fail once no frame arrives for the idle window; hyper then
    /// drops the connection the stalled body belonged to.
    pub async fn send(
        &self,
        target: &BackendTarget,
        request: Request<Body>,
    ) -> Result<Response<TimeoutBody<Incoming>>, DispatchError> {
        // An empty body stays bare so hyper still frames the request without one.
        let mut request = request.map(|body| {
            if body.is_end_stream() {
                body
            } else {
                Body::new(TimeoutBody::new(self.body_idle, body))
            }
        });
        let path_and_query = request
            .uri()
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        *request.uri_mut() = Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(target.authority.clone())
            .path_and_query(path_and_query)
            .build()?;

        let response = tokio::time::timeout(self.response_timeout, self.client.request(request))
            .await
            .map_err(|_| DispatchError::Timeout(self.response_timeout))??;
        Ok(response.map(|body| TimeoutBody::new(self.body_idle, body)))
    }

    /// Send an upgrade handshake on a fresh connection that supports upgrades.
    ///
    /// The returned response still carries the backend's `OnUpgrade` handle.
    pub async fn send_upgrade(
        &self,
        target: &BackendTarget,
        mut request: Request<Body>,
    ) -> Result<Response<Incoming>, DispatchError> {
        if !request.headers().contains_key(header::HOST) {
            if let Ok(host) = HeaderValue::from_str(target.authority.as_str()) {
                request.headers_mut().insert(header::HOST, host);
            }
        }

        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(target.authority.as_str()),
        )
        .await
        .map_err(|_| DispatchError::Timeout(self.connect_timeout))?
        .map_err(DispatchError::Connect)?;
        let _ = stream.set_nodelay(true);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.with_upgrades().await {
                tracing::debug!(error = %e, "Upgrade connection ended with error");
            }
        });

        let response = tokio::time::timeout(self.response_timeout, sender.send_request(request))
            .await
            .map_err(|_| DispatchError::Timeout(self.response_timeout))??;
        Ok(response)
    }
}
