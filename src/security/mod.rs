//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (already TLS-terminated):
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Pass to backend
//! Outgoing response:
//!     → headers.rs (HSTS on every secure response)
//! ```
//!
//! Protocol and cipher policy lives with the handshake in `net::tls`.

pub mod headers;
