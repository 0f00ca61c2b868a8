//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Addresses parse, backend authorities carry a port
//! - Route patterns compile, cipher policy is satisfiable
//! - Validate value ranges (timeouts > 0, cache budget > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::uri::{Authority, PathAndQuery};

use crate::backend::{BackendTarget, InvalidBackend};
use crate::config::schema::ProxyConfig;
use crate::net::tls::resolve_cipher_suites;
use crate::routing::{parse_pattern, BackendKind, PatternError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: {value:?} is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
    #[error("backends: {0}")]
    InvalidBackend(#[from] InvalidBackend),
    #[error("listener.fallback_host {0:?} is not a valid host")]
    InvalidFallbackHost(String),
    #[error("routing.websocket_prefix {0:?} must start and end with '/'")]
    InvalidPrefix(String),
    #[error("routing.fallback_path {0:?} must be an absolute path without a query")]
    InvalidFallbackPath(String),
    #[error("routing.asset_patterns {pattern:?}: {error}")]
    InvalidPattern { pattern: String, error: PatternError },
    #[error("tls.cipher_suites: {0}")]
    CipherPolicy(String),
    #[error("observability.log_level {0:?} is not a log level")]
    InvalidLogLevel(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Check everything serde cannot.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.secure_address", &config.listener.secure_address);
    check_address(&mut errors, "listener.redirect_address", &config.listener.redirect_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if Authority::from_str(&config.listener.fallback_host).is_err() {
        errors.push(ValidationError::InvalidFallbackHost(
            config.listener.fallback_host.clone(),
        ));
    }

    for (kind, address) in [
        (BackendKind::WebSocket, &config.backends.websocket),
        (BackendKind::Spa, &config.backends.spa),
    ] {
        if let Err(e) = BackendTarget::new(kind, address) {
            errors.push(e.into());
        }
    }

    let prefix = &config.routing.websocket_prefix;
    if prefix.len() < 2 || !prefix.starts_with('/') || !prefix.ends_with('/') {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }

    let fallback = &config.routing.fallback_path;
    let fallback_ok = fallback.starts_with('/')
        && PathAndQuery::from_str(fallback).is_ok_and(|pq| pq.query().is_none());
    if !fallback_ok {
        errors.push(ValidationError::InvalidFallbackPath(fallback.clone()));
    }

    for pattern in &config.routing.asset_patterns {
        if let Err(error) = parse_pattern(pattern) {
            errors.push(ValidationError::InvalidPattern {
                pattern: pattern.clone(),
                error,
            });
        }
    }

    if let Err(e) = resolve_cipher_suites(&config.tls.cipher_suites, config.tls.min_protocol) {
        errors.push(ValidationError::CipherPolicy(e.to_string()));
    }

    if tracing::Level::from_str(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    let t = &config.timeouts;
    for (name, value) in [
        ("timeouts.handshake_secs", t.handshake_secs),
        ("timeouts.connect_secs", t.connect_secs),
        ("timeouts.response_secs", t.response_secs),
        ("timeouts.redirect_idle_secs", t.redirect_idle_secs),
        ("timeouts.dispatch_idle_secs", t.dispatch_idle_secs),
        ("timeouts.bridge_idle_secs", t.bridge_idle_secs),
        ("timeouts.bridge_grace_secs", t.bridge_grace_secs),
        ("timeouts.shutdown_grace_secs", t.shutdown_grace_secs),
        ("tls.session_cache_bytes", config.tls.session_cache_bytes as u64),
        ("tls.hsts_max_age_secs", config.tls.hsts_max_age_secs),
        ("listener.max_connections", config.listener.max_connections as u64),
        ("listener.public_https_port", u64::from(config.listener.public_https_port)),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
