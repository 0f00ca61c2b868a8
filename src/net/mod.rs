//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (TLS handshake on the secure port; policy enforcement)
//!         ↳ session_cache.rs (shared, size-bounded resumption store)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Handshake failures close the socket before any HTTP parsing

pub mod connection;
pub mod listener;
pub mod session_cache;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use session_cache::SessionCache;
pub use tls::{TlsError, TlsInfo, TlsTerminator};
