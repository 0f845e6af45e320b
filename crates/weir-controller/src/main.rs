//! Weir controller daemon.

use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weir_controller::{ControllerService, TopicRegistry};
use weir_core::{load_config, ControllerConfig};
use weir_protocol::Server;

/// Brokers in the static set answer on consecutive ports from this base.
const BROKER_BASE_PORT: u16 = 9092;

#[derive(Parser, Debug)]
#[command(name = "weir-controller", about = "Weir controller: topic metadata")]
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

    let mut config: ControllerConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => ControllerConfig::default(),
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

    info!(id = %config.id, addr = %config.listen_addr(), "starting controller");

    if let Ok(addr) = config.metrics_addr().parse() {
        weir_core::metrics::init_exporter(addr);
    }

    let registry = Arc::new(TopicRegistry::new());
    let service = Arc::new(ControllerService::new(
        registry,
        config.host.clone(),
        BROKER_BASE_PORT,
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let server = Server::bind(&config.listen_addr(), service, shutdown_tx.clone()).await?;

    let signal_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        let _ = signal_shutdown.send(());
    });

    server.run().await?;
    info!("controller stopped");
    Ok(())
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
