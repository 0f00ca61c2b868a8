//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store the compiled, ordered rule table
//! - Produce exactly one `RouteDecision` per request
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - First match wins; rule order is the table order
//! - The table ends in a catch-all, so lookup is total

use std::fmt;

use crate::config::RoutingConfig;
use crate::routing::matcher::{
    parse_pattern, AnyOfMatcher, AnyRequestMatcher, Matcher, PathPrefixMatcher, PatternError,
    RouteRequest,
};

/// Which of the two fixed backends serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    WebSocket,
    Spa,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::WebSocket => "websocket",
            BackendKind::Spa => "spa",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rule does with a matching request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Forward the original request target unchanged.
    PassThrough(BackendKind),
    /// Replace the whole request target with `path`.
    Rewrite { backend: BackendKind, path: String },
}

/// A (predicate, action) pair.
#[derive(Debug)]
pub struct RouteRule {
    pub name: &'static str,
    matcher: Box<dyn Matcher>,
    pub action: RouteAction,
}

impl RouteRule {
    pub fn new(name: &'static str, matcher: Box<dyn Matcher>, action: RouteAction) -> Self {
        Self {
            name,
            matcher,
            action,
        }
    }
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Name of the rule that matched.
    pub rule: &'static str,
    pub backend: BackendKind,
    /// Path forwarded to the backend (the original path when passing through).
    pub path: String,
    pub pass_through: bool,
}

/// Ordered, first-match-wins route table.
#[derive(Debug)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    fallback: RouteRule,
}

impl RouteTable {
    /// Compile the three-tier table: WebSocket prefix, static assets, SPA fallback.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, PatternError> {
        let assets = config
            .asset_patterns
            .iter()
            .map(|p| parse_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;

        let rules = vec![
            RouteRule::new(
                "websocket",
                Box::new(PathPrefixMatcher::new(config.websocket_prefix.clone())),
                RouteAction::PassThrough(BackendKind::WebSocket),
            ),
            RouteRule::new(
                "static-assets",
                Box::new(AnyOfMatcher::new(assets)),
                RouteAction::PassThrough(BackendKind::Spa),
            ),
        ];

        let fallback = RouteRule::new(
            "spa-fallback",
            Box::new(AnyRequestMatcher),
            RouteAction::Rewrite {
                backend: BackendKind::Spa,
                path: config.fallback_path.clone(),
            },
        );

        Ok(Self { rules, fallback })
    }

    /// Classify a request. Total: every request gets a decision.
    pub fn decide(&self, req: &RouteRequest<'_>) -> RouteDecision {
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matcher.matches(req))
            .unwrap_or(&self.fallback);

        match &rule.action {
            RouteAction::PassThrough(backend) => RouteDecision {
                rule: rule.name,
                backend: *backend,
                path: req.path.to_string(),
                pass_through: true,
            },
            RouteAction::Rewrite { backend, path } => RouteDecision {
                rule: rule.name,
                backend: *backend,
                path: path.clone(),
                pass_through: false,
            },
        }
    }

    /// Rule names in evaluation order, fallback last.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|r| r.name)
            .collect()
    }
}
