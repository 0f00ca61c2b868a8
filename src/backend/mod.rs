//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! RouteDecision.backend
//!     → target.rs (resolve WebSocket / SPA target, in-flight guard)
//!     → client.rs (pooled HTTP/1.1 send, or dedicated upgrade connection)
//!     → Response<Incoming> streamed back to the HTTP layer
//! ```
//!
//! # Design Decisions
//! - One fixed authority per backend; no balancing, no failover
//! - Connection reuse through the shared hyper client pool

pub mod client;
pub mod target;

pub use client::{DispatchError, Dispatcher};
pub use target::{BackendSet, BackendTarget, InFlightGuard, InvalidBackend};
