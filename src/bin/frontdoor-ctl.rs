use std::path::PathBuf;
use std::process::ExitCode;

use axum::http::{Method, Request, Uri};
use clap::{Parser, Subcommand};

use frontdoor::config::{load_config, ProxyConfig};
use frontdoor::routing::{request_target, RouteRequest, RouteTable};

#[derive(Parser)]
#[command(name = "frontdoor-ctl")]
#[command(about = "Offline checks for a frontdoor configuration", long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print a summary
    Check,
    /// Show where a request target would be sent
    Route {
        /// Request target, e.g. /dashboard?tab=1
        target: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ProxyConfig::default(),
    };

    let table = match RouteTable::from_config(&config.routing) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Check => {
            println!("configuration OK");
            println!("  https          {}", config.listener.secure_address);
            println!("  redirect       {}", config.listener.redirect_address);
            println!("  ws backend     {}", config.backends.websocket);
            println!("  spa backend    {}", config.backends.spa);
            println!("  min tls        {:?}", config.tls.min_protocol);
            println!("  rules          {}", table.rule_names().join(" -> "));
            ExitCode::SUCCESS
        }
        Commands::Route { target } => {
            let uri: Uri = match target.parse() {
                Ok(uri) => uri,
                Err(e) => {
                    eprintln!("Error: invalid target {:?}: {}", target, e);
                    return ExitCode::FAILURE;
                }
            };
            let request = match Request::builder().method(Method::GET).uri(uri).body(()) {
                Ok(request) => request,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };

            let decision = table.decide(&RouteRequest::from_request(&request));
            let forwarded = match request_target(&decision, request.uri()) {
                Ok(pq) => pq.to_string(),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            println!("rule       {}", decision.rule);
            println!("backend    {}", decision.backend);
            println!("forwarded  {}", forwarded);
            println!("rewritten  {}", !decision.pass_through);
            ExitCode::SUCCESS
        }
    }
}
