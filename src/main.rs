//! Sharded HTTP request dispatcher.
//!
//! # Architecture Overview
//!
//! ```text
//!                           ┌───────────────────────────────────────────────────┐
//!                           │                    DISPATCHER                     │
//!                           │                                                   │
//!     Client Request        │  ┌─────────┐    ┌──────────┐    ┌─────────────┐   │
//!     ──────────────────────┼─▶│  axum   │───▶│ endpoint │───▶│  sharder +  │   │
//!                           │  │ router  │    │ (route)  │    │    table    │   │
//!                           │  └─────────┘    └────┬─────┘    └─────────────┘   │
//!                           │                      │                            │
//!                           │            ┌─────────┼──────────┐                 │
//!                           │            ▼         ▼          ▼                 │
//!                           │       ┌────────┐ ┌────────┐ ┌─────────┐           │
//!     Client Response       │       │forward │ │ mirror │ │reporter/│           │
//!     ◀─────────────────────┼───────│ shard i│ │(detach)│ │ monitor │           │
//!                           │       └───┬────┘ └───┬────┘ └────┬────┘           │
//!                           └───────────┼──────────┼───────────┼────────────────┘
//!                                       ▼          ▼           ▼
//!                                  Shard backend  Mirror   Report / metric sinks
//! ```

use clap::Parser;
use tokio::net::TcpListener;

use shard_dispatcher::cli::Cli;
use shard_dispatcher::lifecycle::signals::spawn_signal_handler;
use shard_dispatcher::observability::{logging, metrics};
use shard_dispatcher::{Dispatcher, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!("shard-dispatcher v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        shards = config.shards.len(),
        routes = config.routes.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let dispatcher = Dispatcher::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    dispatcher.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
