//! TLS-terminating front-door reverse proxy.
//!
//! Plaintext traffic is redirected to HTTPS. Secure traffic is routed to one
//! of two fixed backends: WebSocket upgrades under `/ws/` are bridged to the
//! WebSocket server, static assets pass through to the SPA server, and every
//! other path is rewritten to the SPA's `/index.html`.

// Core subsystems
pub mod backend;
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::ProxyConfig;
pub use http::{RedirectServer, SecureServer};
pub use lifecycle::{Proxy, Shutdown};
