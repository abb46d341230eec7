//! Chained-proxy tunneling client.
//!
//! # Architecture Overview
//!
//! ```text
//!   local app ──CONNECT──▶ ┌──────────┐   acquire()   ┌──────────────┐
//!                          │ listener │ ────────────▶ │  ValueCell   │◀── reconfigure()
//!                          │ + tunnel │               │ (balancer)   │        ▲
//!                          └────┬─────┘               └──────┬───────┘        │
//!                               │ dial(target)               │          config watcher
//!                               ▼                            ▼
//!                        chained server  ◀──────────  round-robin dialers
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use chained_client::config::{load_config, ConfigWatcher};
use chained_client::lifecycle::signals::shutdown_on_ctrl_c;
use chained_client::net::Listener;
use chained_client::observability::{logging, metrics};
use chained_client::{Client, Shutdown};

#[derive(Parser)]
#[command(name = "chained-client")]
#[command(about = "Local CONNECT proxy that tunnels through balanced chained servers", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,

    /// Do not reload the configuration when the file changes.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!("chained-client v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        chained_servers = config.chained_servers.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let client = Arc::new(Client::new(config.clone()));
    client.apply_config(config);

    // Keep the watcher alive for the lifetime of the client.
    let (config_updates, _watcher) = if cli.no_watch {
        let (_, rx) = mpsc::unbounded_channel();
        (rx, None)
    } else {
        let (watcher, rx) = ConfigWatcher::new(&cli.config);
        (rx, Some(watcher.run()?))
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));

    client.run(listener, config_updates, shutdown).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
