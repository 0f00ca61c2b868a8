//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, headers)
//!     → router.rs (ordered rule lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: RouteDecision (backend, path, pass-through)
//!     → rewrite.rs (request target sent upstream)
//!
//! Route Compilation (at startup and on reload):
//!     RoutingConfig
//!     → Compile asset patterns
//!     → websocket prefix → static assets → SPA fallback
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix/suffix/exact only)
//! - Deterministic: same input always yields the same decision
//! - First match wins; a catch-all rule makes lookup total

pub mod matcher;
pub mod rewrite;
pub mod router;

pub use matcher::{parse_pattern, Matcher, PatternError, RouteRequest};
pub use rewrite::request_target;
pub use router::{BackendKind, RouteAction, RouteDecision, RouteRule, RouteTable};
