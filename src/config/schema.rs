//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the front door.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (secure and redirect ports).
    pub listener: ListenerConfig,

    /// TLS termination policy.
    pub tls: TlsConfig,

    /// The two fixed backends.
    pub backends: BackendsConfig,

    /// Route table inputs.
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for TLS traffic (e.g., "0.0.0.0:443").
    pub secure_address: String,

    /// Bind address for plaintext traffic that is redirected to HTTPS.
    pub redirect_address: String,

    /// Port advertised in redirect `Location` headers.
    /// Omitted from the URL when it is 443.
    pub public_https_port: u16,

    /// Host used in redirects when the request carries no Host header.
    pub fallback_host: String,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            secure_address: "0.0.0.0:443".to_string(),
            redirect_address: "0.0.0.0:80".to_string(),
            public_https_port: 443,
            fallback_host: "localhost".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Minimum accepted TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum TlsVersion {
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

/// TLS configuration for the secure listener.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Lowest protocol version offered to clients.
    pub min_protocol: TlsVersion,

    /// Allowed cipher suites, by IANA/rustls name.
    pub cipher_suites: Vec<String>,

    /// Byte budget of the shared session resumption cache.
    pub session_cache_bytes: usize,

    /// `max-age` of the Strict-Transport-Security header.
    pub hsts_max_age_secs: u64,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "certs/fullchain.pem".to_string(),
            key_path: "certs/privkey.pem".to_string(),
            min_protocol: TlsVersion::Tls12,
            cipher_suites: default_cipher_suites(),
            session_cache_bytes: 1024 * 1024,
            hsts_max_age_secs: 31_536_000,
        }
    }
}

/// High-strength AEAD suites only.
pub fn default_cipher_suites() -> Vec<String> {
    [
        "TLS13_AES_256_GCM_SHA384",
        "TLS13_AES_128_GCM_SHA256",
        "TLS13_CHACHA20_POLY1305_SHA256",
        "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Backend addresses. Each target resolves to exactly one authority.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// WebSocket application server (e.g., "localhost:8000").
    pub websocket: String,

    /// Single-page application content server (e.g., "localhost:8001").
    pub spa: String,

    /// Add X-Forwarded-For/Proto/Host to backend requests.
    pub forwarded_headers: bool,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            websocket: "localhost:8000".to_string(),
            spa: "localhost:8001".to_string(),
            forwarded_headers: true,
        }
    }
}

/// Inputs for the ordered route table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Paths starting with this prefix go to the WebSocket backend.
    pub websocket_prefix: String,

    /// Static asset patterns forwarded to the SPA backend unchanged.
    pub asset_patterns: Vec<String>,

    /// Request target served for every other path.
    pub fallback_path: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            websocket_prefix: "/ws/".to_string(),
            asset_patterns: default_asset_patterns(),
            fallback_path: "/index.html".to_string(),
        }
    }
}

pub fn default_asset_patterns() -> Vec<String> {
    [
        "packages/*",
        "images/*",
        "main.*",
        "*.js",
        "*.css",
        "*.woff",
        "*.woff2",
        "*.ttf",
        "*.eot",
        "index.html",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TLS handshake deadline in seconds.
    pub handshake_secs: u64,

    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the backend to produce response headers, in seconds.
    pub response_secs: u64,

    /// Idle window on the plaintext redirect listener.
    pub redirect_idle_secs: u64,

    /// Idle window on keep-alive client and pooled backend connections.
    pub dispatch_idle_secs: u64,

    /// Idle window of a WebSocket bridge (no bytes in either direction).
    pub bridge_idle_secs: u64,

    /// Time the surviving bridge direction gets after the other one ends.
    pub bridge_grace_secs: u64,

    /// Drain deadline on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 10,
            connect_secs: 5,
            response_secs: 60,
            redirect_idle_secs: 15,
            dispatch_idle_secs: 60,
            bridge_idle_secs: 300,
            bridge_grace_secs: 5,
            shutdown_grace_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Pretty for terminals, JSON for log shippers.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
