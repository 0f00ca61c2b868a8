//! Route matching logic.
//!
//! # Responsibilities
//! - Match path prefix, suffix, or exact path (case-sensitive)
//! - Combine conditions with OR semantics for pattern sets
//! - Parse the static-asset glob patterns from configuration
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Patterns are anchored at the path root; the leading `/` is implied
//! - No regex to guarantee O(n) matching

use axum::http::{HeaderMap, Method, Request};

/// Borrowed view of the parts of a request that routing may inspect.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
}

impl<'a> RouteRequest<'a> {
    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        Self {
            method: req.method(),
            path: req.uri().path(),
            headers: req.headers(),
        }
    }
}

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &RouteRequest<'_>) -> bool;
}

/// Matches the request path prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Matcher for PathPrefixMatcher {
    fn matches(&self, req: &RouteRequest<'_>) -> bool {
        req.path.starts_with(&self.prefix)
    }
}

/// Matches the request path suffix (file extensions).
#[derive(Debug, Clone)]
pub struct PathSuffixMatcher {
    suffix: String,
}

impl PathSuffixMatcher {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Matcher for PathSuffixMatcher {
    fn matches(&self, req: &RouteRequest<'_>) -> bool {
        req.path.ends_with(&self.suffix)
    }
}

/// Matches one exact path.
#[derive(Debug, Clone)]
pub struct ExactPathMatcher {
    path: String,
}

impl ExactPathMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactPathMatcher {
    fn matches(&self, req: &RouteRequest<'_>) -> bool {
        req.path == self.path
    }
}

/// Matches every request. Terminates a route table.
#[derive(Debug, Clone, Default)]
pub struct AnyRequestMatcher;

impl Matcher for AnyRequestMatcher {
    fn matches(&self, _req: &RouteRequest<'_>) -> bool {
        true
    }
}

/// Combines multiple matchers with OR semantics.
#[derive(Debug)]
pub struct AnyOfMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AnyOfMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }
}

impl Matcher for AnyOfMatcher {
    fn matches(&self, req: &RouteRequest<'_>) -> bool {
        self.matchers.iter().any(|m| m.matches(req))
    }
}

/// Error for a static-asset pattern that cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("pattern {0:?}: '*' is only allowed as the first or last character")]
    MisplacedWildcard(String),
}

/// Compile one asset pattern.
///
/// `packages/*` and `main.*` become root-anchored prefixes, `*.js` a suffix,
/// and a pattern without `*` an exact path.
pub fn parse_pattern(pattern: &str) -> Result<Box<dyn Matcher>, PatternError> {
    let trimmed = pattern.trim().trim_start_matches('/');
    if trimmed.is_empty() || trimmed == "*" {
        return Err(PatternError::Empty);
    }

    let stars = trimmed.matches('*').count();
    if stars == 0 {
        return Ok(Box::new(ExactPathMatcher::new(format!("/{}", trimmed))));
    }
    if stars > 1 {
        return Err(PatternError::MisplacedWildcard(pattern.to_string()));
    }

    if let Some(suffix) = trimmed.strip_prefix('*') {
        Ok(Box::new(PathSuffixMatcher::new(suffix)))
    } else if let Some(prefix) = trimmed.strip_suffix('*') {
        Ok(Box::new(PathPrefixMatcher::new(format!("/{}", prefix))))
    } else {
        Err(PatternError::MisplacedWildcard(pattern.to_string()))
    }
}
