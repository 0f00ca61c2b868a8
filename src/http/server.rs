//! HTTPS server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum Router with the proxy handler and middleware
//! - Accept TLS connections and serve HTTP/1.1 over them
//! - Dispatch each request to the backend chosen by the route table
//! - Hand upgrade requests to the WebSocket path
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, Response},
    response::IntoResponse,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::backend::{BackendSet, BackendTarget, DispatchError, Dispatcher};
use crate::config::TimeoutConfig;
use crate::http::bridge::Bridge;
use crate::http::request::{
    prepare_forward, propagate_request_id_layer, set_request_id_layer, ForwardOptions,
    RequestIdExt,
};
use crate::http::response::from_backend;
use crate::http::websocket::{is_upgrade_request, proxy_upgrade};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError, TlsError, TlsInfo, TlsTerminator};
use crate::observability::metrics;
use crate::routing::{request_target, RouteDecision, RouteRequest, RouteTable};
use crate::security::headers::hsts_layer;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<ArcSwap<RouteTable>>,
    pub backends: Arc<ArcSwap<BackendSet>>,
    pub dispatcher: Dispatcher,
    pub bridge: Bridge,
    pub forwarded_headers: bool,
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
}

impl AppState {
    pub fn new(
        routes: RouteTable,
        backends: BackendSet,
        timeouts: &TimeoutConfig,
        forwarded_headers: bool,
        shutdown: Shutdown,
        tracker: ConnectionTracker,
    ) -> Self {
        Self {
            routes: Arc::new(ArcSwap::from_pointee(routes)),
            backends: Arc::new(ArcSwap::from_pointee(backends)),
            dispatcher: Dispatcher::new(timeouts),
            bridge: Bridge::new(
                Duration::from_secs(timeouts.bridge_idle_secs),
                Duration::from_secs(timeouts.bridge_grace_secs),
            ),
            forwarded_headers,
            shutdown,
            tracker,
        }
    }

    /// Swap in a new route table and backend set. In-flight requests keep
    /// the snapshot they loaded.
    pub fn reload(&self, routes: RouteTable, backends: BackendSet) {
        self.routes.store(Arc::new(routes));
        self.backends.store(Arc::new(backends));
        tracing::info!(rules = ?self.routes.load().rule_names(), "Route table reloaded");
    }
}

/// HTTPS front door.
pub struct SecureServer {
    app: Router,
    terminator: TlsTerminator,
    state: AppState,
    idle: Duration,
}

impl SecureServer {
    pub fn new(state: AppState, terminator: TlsTerminator, hsts_max_age_secs: u64, idle: Duration) -> Self {
        let app = Self::build_router(state.clone(), hsts_max_age_secs);
        Self {
            app,
            terminator,
            state,
            idle,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Every request target, including `*` and absolute-form, reaches
    /// `proxy_handler`. HSTS is outermost so proxy-generated errors and
    /// `101`s carry it too.
    fn build_router(state: AppState, hsts_max_age_secs: u64) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
            .layer(hsts_layer(hsts_max_age_secs))
    }

    /// Accept and serve TLS connections until shutdown.
    pub async fn run(self, listener: Listener) -> Result<(), ListenerError> {
        let mut shutdown = self.state.shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTPS server starting");
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
            let terminator = self.terminator.clone();
            let conn_shutdown = self.state.shutdown.subscribe();
            let guard = self.state.tracker.track();
            let idle = self.idle;

            tokio::spawn(async move {
                let _permit = permit;
                match terminator.accept(stream).await {
                    Ok((tls, info)) => {
                        metrics::record_tls_handshake("success");
                        tracing::debug!(
                            connection_id = %guard.id(),
                            peer_addr = %peer,
                            protocol = %info.protocol,
                            cipher_suite = %info.cipher_suite,
                            "TLS handshake complete"
                        );
                        serve_connection(tls, app, peer, Some(info), idle, conn_shutdown).await;
                    }
                    Err(e) => {
                        let outcome = match e {
                            TlsError::HandshakeTimeout => "timeout",
                            _ => "failure",
                        };
                        metrics::record_tls_handshake(outcome);
                        tracing::debug!(peer_addr = %peer, error = %e, "TLS handshake failed");
                    }
                }
            });
        }

        tracing::info!("HTTPS server stopped accepting");
        Ok(())
    }
}

/// Drive one HTTP/1.1 connection until it closes, idles out, or shutdown
/// asks it to finish its current exchange.
pub(crate) async fn serve_connection<IO>(
    io: IO,
    app: Router,
    peer: SocketAddr,
    tls: Option<TlsInfo>,
    idle: Duration,
    mut shutdown: broadcast::Receiver<()>,
) where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = app.map_request(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        if let Some(info) = &tls {
            req.extensions_mut().insert(info.clone());
        }
        req
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(idle)
        .keep_alive(true)
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(service))
        .with_upgrades();
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                tracing::debug!(peer_addr = %peer, error = %e, "Connection ended with error");
            }
        }
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                tracing::debug!(peer_addr = %peer, error = %e, "Connection ended during shutdown");
            }
        }
    }
}

/// Main proxy handler.
/// Classifies the request, then forwards it or starts a WebSocket bridge.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request.request_id().to_string();

    let decision = state.routes.load().decide(&RouteRequest::from_request(&request));
    let backend = Arc::clone(state.backends.load().get(decision.backend));
    let tls = request.extensions().get::<TlsInfo>();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        tls_protocol = tls.map(|t| t.protocol.as_str()).unwrap_or("none"),
        tls_cipher = tls.map(|t| t.cipher_suite.as_str()).unwrap_or("none"),
        rule = decision.rule,
        backend = %decision.backend,
        forwarded_path = %decision.path,
        "Routing request"
    );

    let response = match dispatch(&state, &decision, backend, request, peer).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                backend = %decision.backend,
                error = %e,
                "Backend dispatch failed"
            );
            e.into_response()
        }
    };

    metrics::record_request(
        method.as_str(),
        response.status().as_u16(),
        decision.backend.as_str(),
        start,
    );
    response
}

async fn dispatch(
    state: &AppState,
    decision: &RouteDecision,
    backend: Arc<BackendTarget>,
    request: Request<Body>,
    peer: SocketAddr,
) -> Result<Response<Body>, DispatchError> {
    let target = request_target(decision, request.uri())?;

    if backend.upgrade && is_upgrade_request(request.headers()) {
        return proxy_upgrade(state, backend, request, target, peer).await;
    }

    let request = prepare_forward(
        request,
        target,
        ForwardOptions {
            peer,
            forwarded_headers: state.forwarded_headers,
            upgrade: false,
        },
    )?;
    let in_flight = backend.begin();
    let response = state.dispatcher.send(&in_flight, request).await?;
    Ok(from_backend(response))
}
