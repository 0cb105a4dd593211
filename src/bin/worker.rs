//! zonectl worker binary
//!
//! Joins the service group, follows partition ownership and leadership,
//! and stays up until Ctrl-C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use zonectl_core::coordination::{CoordinationEvent, PartitionUpdate};
use zonectl_core::{metrics, telemetry, Config, Service, ZoneCtlError};

/// DNS control-plane worker.
#[derive(Parser, Debug)]
#[command(name = "zonectl-worker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "zonectl.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = Config::load(Some(args.config.as_path()))?;
    telemetry::init(&config.telemetry)?;

    info!(
        config_file = %args.config.display(),
        backend = %config.coordination.backend_url,
        group = %config.coordination.group_id,
        partitions = config.partitioning.partition_count,
        "Starting zonectl worker"
    );

    let service = Service::new(config)?;

    service
        .partitioner()
        .watch_partition_change(Arc::new(|update: &PartitionUpdate| {
            info!(
                owned = update.partitions.len(),
                first = ?update.partitions.first(),
                last = ?update.partitions.last(),
                members = ?update.members.as_ref().map(Vec::len),
                "partition assignment changed"
            );
        }));
    service
        .election()
        .watch_elected_as_leader(Arc::new(|event: Option<&CoordinationEvent>| {
            info!(?event, "this worker is now the group leader");
        }));

    let shutdown = service.shutdown_signal();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Ctrl-C received, shutting down");
        ctrl_c.shutdown();
    });

    match service.start().await {
        Ok(()) => {}
        Err(ZoneCtlError::ShutdownInProgress) => {
            info!("Shutdown requested before the worker connected");
            return Ok(());
        }
        Err(e) => {
            error!("Worker failed to start: {}", e);
            return Err(e.into());
        }
    }

    shutdown.wait().await;
    service.stop().await;

    info!(metrics = %metrics::gather_metrics(), "zonectl worker shutdown complete");
    Ok(())
}
