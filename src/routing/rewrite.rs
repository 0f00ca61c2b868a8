//! Request-target rewriting.
//!
//! Turns a `RouteDecision` plus the original URI into the origin-form target
//! sent upstream. Pass-through keeps the raw path and query bytes, so
//! percent-encoding survives untouched.

use axum::http::uri::{InvalidUri, PathAndQuery, Uri};

use crate::routing::router::RouteDecision;

/// Compute the request target forwarded to the backend.
pub fn request_target(decision: &RouteDecision, original: &Uri) -> Result<PathAndQuery, InvalidUri> {
    if decision.pass_through {
        match original.path_and_query() {
            Some(pq) if pq.as_str().starts_with('/') => Ok(pq.clone()),
            _ => Ok(PathAndQuery::from_static("/")),
        }
    } else {
        decision.path.parse()
    }
}
