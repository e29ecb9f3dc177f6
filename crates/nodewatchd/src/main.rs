//! nodewatchd: node health monitor.
//!
//! Probes every node listed in `nodewatch.toml` with a gRPC-Web version
//! call and reports a network-wide status from the canonical nodes.
//!
//! # Usage
//!
//! ```text
//! nodewatchd run
//! nodewatchd check --filter canonical
//! nodewatchd probe grpc.example.org --timeout 2s
//! nodewatchd metadata --refresh
//! ```

mod commands;
mod config;
mod monitor;
mod output;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use nodewatch_health::{HyperTransport, Transport};
use nodewatch_state::{NodeFilter, NodeId};

#[derive(Parser)]
#[command(name = "nodewatchd", about = "Node health monitor")]
struct Cli {
    /// Path to the config file.
    #[arg(long, global = true, default_value = "nodewatch.toml")]
    config: PathBuf,

    /// Data directory for the metadata cache.
    #[arg(long, global = true, default_value = ".nodewatch")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll all nodes until interrupted, logging the network status.
    Run,

    /// Probe all nodes once and print the results.
    Check {
        /// Which nodes to list: all, canonical or community. Saved for later runs.
        #[arg(long)]
        filter: Option<NodeFilter>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Probe a single endpoint.
    Probe {
        /// Node HTTP endpoint, with or without scheme.
        endpoint: String,

        /// Node id to report.
        #[arg(long, default_value = "0")]
        id: NodeId,

        /// Request timeout, e.g. "500ms" or "5s".
        #[arg(long, value_parser = parse_timeout)]
        timeout: Option<Duration>,

        #[arg(long)]
        json: bool,
    },

    /// Show operator metadata for all nodes.
    Metadata {
        /// Refetch every entry, ignoring the cache TTL.
        #[arg(long)]
        refresh: bool,

        /// Remove all cached entries and exit.
        #[arg(long, conflicts_with = "refresh")]
        clear: bool,
    },
}

fn parse_timeout(s: &str) -> Result<Duration, String> {
    match config::parse_duration(s) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(format!("invalid timeout: {s}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("warn,nodewatchd=info,nodewatch_health=info")
                }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let transport: Arc<dyn Transport> = Arc::new(HyperTransport::new()?);

    match cli.command {
        Command::Run => monitor::run_monitor(&cli.config, &cli.data_dir, transport).await,
        Command::Check { filter, json } => {
            commands::check(&cli.config, &cli.data_dir, filter, transport, json).await
        }
        Command::Probe {
            endpoint,
            id,
            timeout,
            json,
        } => commands::probe(&cli.config, &endpoint, id, timeout, transport, json).await,
        Command::Metadata { refresh, clear } => {
            commands::metadata(&cli.config, &cli.data_dir, refresh, clear, transport).await
        }
    }
}
