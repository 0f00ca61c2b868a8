//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent each of the two fixed backend servers
//! - Track in-flight requests per backend
//! - Resolve a `BackendKind` to its target

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::http::uri::Authority;

use crate::config::BackendsConfig;
use crate::observability::metrics;
use crate::routing::BackendKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} backend address {value:?} must be host:port")]
pub struct InvalidBackend {
    pub kind: BackendKind,
    pub value: String,
}

/// A single backend server.
#[derive(Debug)]
pub struct BackendTarget {
    pub kind: BackendKind,
    /// Fixed host:port known at configuration time.
    pub authority: Authority,
    /// Whether the backend accepts WebSocket upgrades.
    pub upgrade: bool,
    in_flight: AtomicUsize,
}

impl BackendTarget {
    pub fn new(kind: BackendKind, address: &str) -> Result<Self, InvalidBackend> {
        let invalid = || InvalidBackend {
            kind,
            value: address.to_string(),
        };
        let authority: Authority = address.parse().map_err(|_| invalid())?;
        if authority.port_u16().is_none() {
            return Err(invalid());
        }
        Ok(Self {
            kind,
            authority,
            upgrade: kind == BackendKind::WebSocket,
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Mark a request as in flight until the guard drops.
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        let count = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_backend_in_flight(self.kind.as_str(), count);
        InFlightGuard {
            backend: Arc::clone(self),
        }
    }
}

/// A RAII guard that manages the in-flight count.
#[derive(Debug)]
pub struct InFlightGuard {
    backend: Arc<BackendTarget>,
}

impl Deref for InFlightGuard {
    type Target = BackendTarget;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let count = self.backend.in_flight.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::record_backend_in_flight(self.backend.kind.as_str(), count);
    }
}

/// The WebSocket and SPA backends.
#[derive(Debug)]
pub struct BackendSet {
    websocket: Arc<BackendTarget>,
    spa: Arc<BackendTarget>,
}

impl BackendSet {
    pub fn from_config(config: &BackendsConfig) -> Result<Self, InvalidBackend> {
        Ok(Self {
            websocket: Arc::new(BackendTarget::new(BackendKind::WebSocket, &config.websocket)?),
            spa: Arc::new(BackendTarget::new(BackendKind::Spa, &config.spa)?),
        })
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<BackendTarget> {
        match kind {
            BackendKind::WebSocket => &self.websocket,
            BackendKind::Spa => &self.spa,
        }
    }
}
