//! p2pminer node
//!
//! Entry point of a miner node. Usage: `p2pminer-node <PORT> <WORKER_IDENTITY>`.
//! Commands (`list-peers`, `request-pool-info`, `start-worker`, `stop-worker`,
//! `pool-stats`, `stop`) are read from stdin, one per line.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use p2pminer_core::{Command, EventBus, NodeIdentity, NodeStatus, StatusHandle};
use p2pminer_network::P2pNode;
use p2pminer_worker::{PoolStatsClient, WorkerControl, WorkerProcess};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod args;
mod console;
mod control;
mod logging;

use args::CliArgs;
use control::ControlLoop;

/// Blocking stdin reads cannot be cancelled; do not wait on them at exit.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = args.load_config()?;
    logging::init_tracing(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build the async runtime")?;
    let result = runtime.block_on(run_node(config));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn run_node(config: p2pminer_config::NodeConfig) -> Result<()> {
    let identity = NodeIdentity::new(
        config.network.bind_host.clone(),
        config.network.port,
        config.worker.wallet_address.clone(),
    );
    info!(node = %identity, "Starting node");

    let events = EventBus::new(config.network.event_buffer);
    let status = StatusHandle::new(NodeStatus::new(config.worker.pool_url.clone()));
    let cancel = CancellationToken::new();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let node = Arc::new(P2pNode::new(
        identity,
        config.network.clone(),
        status.clone(),
        command_tx.clone(),
        events.clone(),
        cancel.clone(),
    ));

    // Startup order: listener, command reader, seeds, worker.
    let address = node.start().await.context("failed to start listener")?;
    info!(%address, "Node listening");

    tokio::spawn(console::read_commands(
        tokio::io::stdin(),
        command_tx.clone(),
        cancel.clone(),
    ));

    node.dial_seeds().await;

    let worker: Arc<dyn WorkerControl> =
        Arc::new(WorkerProcess::new(config.worker.clone(), status, events.clone()));
    if config.worker.autostart {
        if let Err(e) = worker.start().await {
            warn!(error = %e, "Worker not started");
        }
    }

    let pool_stats = PoolStatsClient::new(&config.pool_stats)?;
    let control = ControlLoop::new(node.clone(), worker, pool_stats, events);

    let signal_tx = command_tx;
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(Command::Stop);
    });

    control.run(command_rx, cancel).await;
    control.shutdown().await;
    info!("Node stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term_signal) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Received shutdown signal (Ctrl+C)"),
                _ = term_signal.recv() => info!("Received shutdown signal (SIGTERM)"),
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal (Ctrl+C)");
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal (Ctrl+C)");
}
