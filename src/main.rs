//! API trace analytics daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!     POST /api/telemetry
//!     ───────────────────▶ http ──▶ bus topic "trace" ──▶ shard loops
//!                                     (partitioned by api id)     │
//!                                                                 ▼
//!                                          handler chain (by priority)
//!                                          ├─ trace_annotator   (10)
//!                                          └─ spec_differ       (20)
//!                                                                 │
//!                                                                 ▼
//!                                              diff aggregator ──▶ notifier
//!                                              (flushed every interval)
//!
//!     /modules/{name}/...  ──▶ admin ──▶ backend accessor
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use trace_analytics::config::{default_config, load_config, ConfigWatcher};
use trace_analytics::http::HttpServer;
use trace_analytics::lifecycle::{in_memory_accessor, signals, AnalyticsHost, Shutdown};
use trace_analytics::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "trace-analytics", version, about = "API trace analytics daemon")]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "trace-analytics starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let accessor = in_memory_accessor(&config, &shutdown)?;
    let bind_address = config.listener.bind_address.clone();
    let host = Arc::new(AnalyticsHost::start_with_shutdown(config, accessor, shutdown.clone()));

    // The watcher handle must outlive the reload task.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let handle = watcher.run()?;
            let reload_host = host.clone();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    reload_host.apply_settings(&new_config.settings);
                    tracing::info!(
                        revision_id = reload_host.settings().revision_id(),
                        "Analyze settings reloaded"
                    );
                }
            });
            Some(handle)
        }
        None => None,
    };

    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let listener = TcpListener::bind(&bind_address).await?;
    HttpServer::new(host.clone()).run(listener, shutdown.clone()).await?;

    host.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
