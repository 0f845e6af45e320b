//! Weir broker daemon.
//!
//! Teardown order matters: stop the accept loop, drain in-flight handlers,
//! then flush and close every segment.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weir_broker::health::serve_health;
use weir_broker::BrokerService;
use weir_core::{load_config, BrokerConfig, LogDir, SequenceCache};
use weir_protocol::Server;

/// How long a producer's sequence state survives without traffic.
const SEQUENCE_TTL: Duration = Duration::from_secs(60 * 60);
/// Cap on tracked producer streams.
const SEQUENCE_CAPACITY: usize = 100_000;
/// Retention sweep cadence.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "weir-broker", about = "Weir broker: serves Produce and Fetch")]
struct Args {
    /// YAML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Override the configured log directory.
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config: BrokerConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => BrokerConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(log_dir) = args.log_dir {
        config.log_dir = log_dir;
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
        log_dir = %config.log_dir,
        flush_policy = %config.flush_policy,
        "starting broker"
    );

    if let Ok(addr) = config.metrics_addr().parse() {
        weir_core::metrics::init_exporter(addr);
    }

    let log_dir = Arc::new(LogDir::open(
        &config.log_dir,
        config.max_segment_size_bytes,
        config.flush_policy,
    )?);
    let service = Arc::new(BrokerService::new(
        log_dir.clone(),
        SequenceCache::bounded(SEQUENCE_CAPACITY, SEQUENCE_TTL),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    tokio::spawn(serve_health(
        config.metrics_addr(),
        shutdown_tx.subscribe(),
    ));

    if let Some(retention_bytes) = config.retention_bytes {
        tokio::spawn(retention_sweep(
            log_dir.clone(),
            retention_bytes,
            shutdown_tx.subscribe(),
        ));
    }

    let server = Server::bind(&config.listen_addr(), service, shutdown_tx.clone()).await?;

    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        let _ = signal_shutdown.send(());
    });

    server.run().await?;

    info!("flushing and closing segments");
    if let Err(e) = log_dir.close_all() {
        error!(error = %e, "segment close failed during shutdown");
    }
    info!("broker stopped");
    Ok(())
}

async fn retention_sweep(
    log_dir: Arc<LogDir>,
    retention_bytes: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for topic in log_dir.list_topics() {
                    for partition in log_dir.list_partitions(&topic) {
                        if let Err(e) =
                            log_dir.cleanup_old_segments(&topic, partition, retention_bytes)
                        {
                            warn!(topic, partition, error = %e, "retention sweep failed");
                        }
                    }
                }
            }
            _ = shutdown.recv() => return,
        }
    }
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
