//! Weir coordinator daemon.

use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weir_client::ControllerClient;
use weir_coordinator::{
    CachedPartitionCounts, CoordinatorService, FixedPartitionCounts, GroupManager, OffsetStore,
    PartitionCounts, FALLBACK_PARTITION_COUNT,
};
use weir_core::{load_config, CoordinatorConfig};
use weir_protocol::Server;

/// Cleanup sweep cadence for stale members.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(
    name = "weir-coordinator",
    about = "Weir coordinator: consumer groups and offset commits"
)]
struct Args {
    /// YAML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config: CoordinatorConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => CoordinatorConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        id = %config.id,
        addr = %config.listen_addr(),
        session_timeout_ms = config.session_timeout_ms,
        "starting coordinator"
    );

    if let Ok(addr) = config.metrics_addr().parse() {
        weir_core::metrics::init_exporter(addr);
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Partition counts come from the controller when one is configured;
    // otherwise every topic gets the fixed fallback.
    let partition_counts: Arc<dyn PartitionCounts> = if config.controller_addr.is_empty() {
        warn!(
            count = FALLBACK_PARTITION_COUNT,
            "no controller configured, assignments assume a fixed partition count"
        );
        Arc::new(FixedPartitionCounts(FALLBACK_PARTITION_COUNT))
    } else {
        let cache = Arc::new(CachedPartitionCounts::new());
        tokio::spawn(refresh_partition_counts(
            config.controller_addr.clone(),
            cache.clone(),
            Duration::from_millis(config.heartbeat_interval_ms.max(1000) as u64),
            shutdown_tx.subscribe(),
        ));
        cache
    };

    let manager = Arc::new(
        GroupManager::new(
            Duration::from_millis(config.heartbeat_interval_ms as u64),
            Duration::from_millis(config.session_timeout_ms as u64),
            partition_counts,
        )
        .with_offset_store(OffsetStore::new(&config.offset_storage_path)?),
    );
    let service = Arc::new(CoordinatorService::new(manager.clone()));

    let sweeper_manager = manager.clone();
    let mut sweeper_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => sweeper_manager.cleanup_inactive_members(),
                _ = sweeper_shutdown.recv() => return,
            }
        }
    });

    let server = Server::bind(&config.listen_addr(), service, shutdown_tx.clone()).await?;

    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        let _ = signal_shutdown.send(());
    });

    server.run().await?;

    info!("flushing committed offsets");
    manager.flush_offsets();
    info!("coordinator stopped");
    Ok(())
}

/// Periodically pull partition counts for every known topic from the
/// controller. Failures leave the cache as-is; lookups fall back to the fixed
/// count until the controller answers.
async fn refresh_partition_counts(
    controller_addr: String,
    cache: Arc<CachedPartitionCounts>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match fetch_counts(&controller_addr).await {
                    Ok(counts) => {
                        debug!(topics = counts.len(), "refreshed partition counts");
                        cache.replace_all(counts);
                    }
                    Err(e) => warn!(%controller_addr, error = %e, "partition count refresh failed"),
                }
            }
            _ = shutdown.recv() => return,
        }
    }
}

async fn fetch_counts(controller_addr: &str) -> weir_client::Result<HashMap<String, i32>> {
    let mut client = ControllerClient::connect(controller_addr).await?;
    let mut counts = HashMap::new();
    for topic in client.list_topics().await? {
        let metadata = client.describe_topic(&topic).await?;
        counts.insert(topic, metadata.len() as i32);
    }
    Ok(counts)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
