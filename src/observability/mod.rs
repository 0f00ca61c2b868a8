//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request path, TLS accept loop, bridges, session cache
//!     → logging.rs (tracing subscriber: pretty or JSON on stdout)
//!     → metrics.rs (proxy_* counters, gauges, histograms)
//!
//! Prometheus scrapes metrics_address when metrics_enabled = true.
//! ```
//!
//! # Design Decisions
//! - Every request span carries the X-Request-Id
//! - With no recorder installed, metric calls do nothing

pub mod logging;
pub mod metrics;
