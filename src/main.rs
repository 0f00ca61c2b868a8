//! frontdoor: TLS-terminating front door for a WebSocket server and an SPA.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                       FRONTDOOR                          │
//!                    │                                                          │
//!   :80  ────────────┼─▶ redirect ──▶ 301 https://host/path?query               │
//!                    │                                                          │
//!                    │  ┌─────────┐   ┌─────────┐   ┌──────────────┐            │
//!   :443 ────────────┼─▶│   net   │──▶│  http   │──▶│   routing    │            │
//!                    │  │listener │   │ server  │   │ route table  │            │
//!                    │  │  + tls  │   └─────────┘   └──────┬───────┘            │
//!                    │  └─────────┘                        │                    │
//!                    │                      ┌──────────────┴──────────────┐     │
//!                    │                      ▼                             ▼     │
//!                    │              ┌──────────────┐            ┌──────────────┐│
//!                    │              │   backend    │            │  websocket   ││
//!                    │              │  dispatcher  │            │    bridge    ││
//!                    │              └──────┬───────┘            └──────┬───────┘│
//!                    └─────────────────────┼───────────────────────────┼────────┘
//!                                          ▼                           ▼
//!                                     SPA backend                WS backend
//! ```

use std::path::PathBuf;

use clap::Parser;

use frontdoor::config::{load_config, ProxyConfig};
use frontdoor::lifecycle::startup;
use frontdoor::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "frontdoor")]
#[command(about = "TLS-terminating reverse proxy for a WebSocket server and an SPA", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?cli.config,
        secure_address = %config.listener.secure_address,
        redirect_address = %config.listener.redirect_address,
        max_connections = config.listener.max_connections,
        "frontdoor starting"
    );

    startup::run(config, cli.config).await?;
    Ok(())
}
