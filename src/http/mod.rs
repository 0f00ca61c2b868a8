//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Plaintext connection
//!     → redirect.rs (301 to https://, nothing else)
//!
//! TLS connection
//!     → server.rs (hyper HTTP/1.1, Axum router, middleware)
//!     → request.rs (request ID, backend-bound copy)
//!     → [routing decides backend and target]
//!     → response.rs (stream backend response, gateway errors)
//!       or websocket.rs → bridge.rs (101, then raw byte relay)
//!     → Send to client
//! ```

pub mod bridge;
pub mod redirect;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use bridge::{Bridge, BridgeEnd};
pub use redirect::{RedirectServer, RedirectTarget};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::{AppState, SecureServer};
