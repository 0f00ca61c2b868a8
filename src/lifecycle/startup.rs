//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Bind listeners and begin accepting traffic
//! - Run the signal / reload loop
//! - Drain connections on shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - Reload swaps routes and backends only; everything else needs a restart

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::backend::{BackendSet, InvalidBackend};
use crate::config::{load_config, ConfigError, ConfigWatcher, ProxyConfig};
use crate::http::{AppState, RedirectServer, RedirectTarget, SecureServer};
use crate::lifecycle::signals::{Signal, Signals};
use crate::lifecycle::Shutdown;
use crate::net::tls::build_server_config;
use crate::net::{ConnectionTracker, Listener, ListenerError, SessionCache, TlsError, TlsTerminator};
use crate::observability::metrics;
use crate::routing::{PatternError, RouteTable};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
    #[error("invalid route table: {0}")]
    Routes(#[from] PatternError),
    #[error(transparent)]
    Backend(#[from] InvalidBackend),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A fully initialized proxy that has not started accepting yet.
pub struct Proxy {
    state: AppState,
    secure: SecureServer,
    redirect: RedirectServer,
    session_cache: Arc<SessionCache>,
    shutdown_grace: Duration,
}

impl Proxy {
    pub fn build(config: &ProxyConfig) -> Result<Self, StartupError> {
        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let timeouts = &config.timeouts;

        let routes = RouteTable::from_config(&config.routing)?;
        let backends = BackendSet::from_config(&config.backends)?;
        let state = AppState::new(
            routes,
            backends,
            timeouts,
            config.backends.forwarded_headers,
            shutdown.clone(),
            tracker.clone(),
        );

        let session_cache = Arc::new(SessionCache::new(config.tls.session_cache_bytes));
        let server_config = build_server_config(&config.tls, Arc::clone(&session_cache))?;
        let terminator = TlsTerminator::new(server_config, Duration::from_secs(timeouts.handshake_secs));

        let secure = SecureServer::new(
            state.clone(),
            terminator,
            config.tls.hsts_max_age_secs,
            Duration::from_secs(timeouts.dispatch_idle_secs),
        );
        let redirect = RedirectServer::new(
            RedirectTarget {
                public_https_port: config.listener.public_https_port,
                fallback_host: config.listener.fallback_host.clone(),
            },
            Duration::from_secs(timeouts.redirect_idle_secs),
            shutdown,
            tracker,
        );

        tracing::info!(
            rules = ?state.routes.load().rule_names(),
            websocket_backend = %config.backends.websocket,
            spa_backend = %config.backends.spa,
            min_tls = ?config.tls.min_protocol,
            "Proxy initialized"
        );

        Ok(Self {
            state,
            secure,
            redirect,
            session_cache,
            shutdown_grace: Duration::from_secs(timeouts.shutdown_grace_secs),
        })
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.state.shutdown.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.session_cache
    }

    /// Serve both listeners until shutdown, then drain.
    pub async fn serve(self, secure: Listener, redirect: Listener) -> Result<(), StartupError> {
        let Proxy {
            state,
            secure: secure_server,
            redirect: redirect_server,
            shutdown_grace,
            ..
        } = self;

        let stop_on_error = |res: Result<(), ListenerError>| {
            if res.is_err() {
                state.shutdown.trigger();
            }
            res
        };

        let (secure_res, redirect_res) = tokio::join!(
            async { stop_on_error(secure_server.run(secure).await) },
            async { stop_on_error(redirect_server.run(redirect).await) },
        );

        let tracker = &state.tracker;
        tracing::info!(active = tracker.active_count(), "Draining connections");
        if tracker.drain(shutdown_grace).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = tracker.active_count(),
                grace = ?shutdown_grace,
                "Shutdown grace period elapsed with connections still open"
            );
        }

        secure_res?;
        redirect_res?;
        Ok(())
    }
}

/// Run the proxy for `config` until a shutdown signal.
///
/// With a `config_path`, file changes and SIGHUP reload routes and backends.
pub async fn run(config: ProxyConfig, config_path: Option<PathBuf>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let proxy = Proxy::build(&config)?;
    let max_connections = config.listener.max_connections;
    let secure = Listener::bind(&config.listener.secure_address, max_connections).await?;
    let redirect = Listener::bind(&config.listener.redirect_address, max_connections).await?;

    let shutdown = proxy.shutdown_handle();
    let state = proxy.state().clone();
    let mut signals = Signals::new().map_err(StartupError::Signals)?;

    let (mut updates, _watcher) = match &config_path {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (rx, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable; reload with SIGHUP");
                    (rx, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let mut server = tokio::spawn(proxy.serve(secure, redirect));
    let mut current = config;

    loop {
        tokio::select! {
            res = &mut server => return res?,
            signal = signals.recv() => match signal {
                Signal::Shutdown => break,
                Signal::Reload => match &config_path {
                    Some(path) => match load_config(path) {
                        Ok(new) => apply_reload(&state, &mut current, new),
                        Err(e) => tracing::error!(error = %e, "Config reload rejected, keeping current configuration"),
                    },
                    None => tracing::warn!("No config file to reload"),
                },
            },
            Some(new) = updates.recv() => apply_reload(&state, &mut current, new),
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();

    tokio::select! {
        res = &mut server => res??,
        _ = signals.recv() => tracing::warn!("Second signal received, forcing exit"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Swap routes and backends from `new`; report restart-only changes.
fn apply_reload(state: &AppState, current: &mut ProxyConfig, new: ProxyConfig) {
    let routes = match RouteTable::from_config(&new.routing) {
        Ok(routes) => routes,
        Err(e) => {
            tracing::error!(error = %e, "Reloaded routing is invalid, keeping current configuration");
            return;
        }
    };
    let backends = match BackendSet::from_config(&new.backends) {
        Ok(backends) => backends,
        Err(e) => {
            tracing::error!(error = %e, "Reloaded backends are invalid, keeping current configuration");
            return;
        }
    };

    let restart_only = [
        ("listener", new.listener != current.listener),
        ("tls", new.tls != current.tls),
        ("timeouts", new.timeouts != current.timeouts),
        ("observability", new.observability != current.observability),
        (
            "backends.forwarded_headers",
            new.backends.forwarded_headers != current.backends.forwarded_headers,
        ),
    ];
    for (section, changed) in restart_only {
        if changed {
            tracing::warn!(section, "Change requires a restart to take effect");
        }
    }

    state.reload(routes, backends);
    current.routing = new.routing;
    current.backends.websocket = new.backends.websocket;
    current.backends.spa = new.backends.spa;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{BackendKind, RouteRequest};
    use axum::http::Request;

    fn state_for(config: &ProxyConfig) -> AppState {
        AppState::new(
            RouteTable::from_config(&config.routing).unwrap(),
            BackendSet::from_config(&config.backends).unwrap(),
            &config.timeouts,
            config.backends.forwarded_headers,
            Shutdown::new(),
            ConnectionTracker::new(),
        )
    }

    #[test]
    fn reload_applies_routes_and_backends_only() {
        let mut current = ProxyConfig::default();
        let state = state_for(&current);

        let mut new = current.clone();
        new.backends.spa = "10.1.1.1:9000".into();
        new.routing.fallback_path = "/app.html".into();
        new.timeouts.bridge_idle_secs = 1;
        apply_reload(&state, &mut current, new);

        assert_eq!(current.backends.spa, "10.1.1.1:9000");
        assert_eq!(current.routing.fallback_path, "/app.html");
        assert_eq!(current.timeouts.bridge_idle_secs, 300);

        let req = Request::builder().uri("/settings").body(()).unwrap();
        let decision = state.routes.load().decide(&RouteRequest::from_request(&req));
        assert_eq!(decision.path, "/app.html");
        assert_eq!(
            state.backends.load().get(BackendKind::Spa).authority.as_str(),
            "10.1.1.1:9000"
        );
    }

    #[test]
    fn invalid_reload_keeps_running_config() {
        let mut current = ProxyConfig::default();
        let state = state_for(&current);

        let mut new = current.clone();
        new.backends.websocket = "no-port".into();
        new.routing.fallback_path = "/other.html".into();
        apply_reload(&state, &mut current, new);

        assert_eq!(current, ProxyConfig::default());
        assert_eq!(
            state.backends.load().get(BackendKind::WebSocket).authority.as_str(),
            "localhost:8000"
        );
    }
}
