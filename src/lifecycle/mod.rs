//! Process lifecycle: startup, reload and graceful shutdown.
//!
//! # Data Flow
//! ```text
//! startup.rs
//!     ProxyConfig → TLS config + session cache → route table + backends
//!     → bind :443 and :80 → serve both until shutdown
//!
//! signals.rs
//!     SIGTERM / SIGINT → Signal::Shutdown
//!     SIGHUP           → Signal::Reload
//!
//! shutdown.rs
//!     trigger → accept loops stop → connections and bridges told to close
//!     → tracker drained for up to shutdown_grace_secs
//! ```
//!
//! # Design Decisions
//! - A second shutdown signal during the drain exits immediately
//! - Reload never rebinds listeners or rebuilds TLS

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::{Signal, Signals};
pub use startup::{Proxy, StartupError};
