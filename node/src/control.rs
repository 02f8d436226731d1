//! Command execution.
//!
//! Commands arrive on one queue from two producers: the stdin reader and the
//! `internal_command` handler of the overlay protocol. They are executed one at
//! a time in arrival order.

use std::sync::Arc;

use p2pminer_core::{Command, EventBus, NodeEvent};
use p2pminer_network::P2pNode;
use p2pminer_worker::{PoolStatsClient, WorkerControl};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What the loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep taking commands
    Continue,
    /// Leave the loop and shut down
    Stop,
}

/// Executes administrative commands against the node and its worker.
pub struct ControlLoop {
    node: Arc<P2pNode>,
    worker: Arc<dyn WorkerControl>,
    pool_stats: PoolStatsClient,
    wallet: String,
    events: EventBus,
}

impl ControlLoop {
    /// Creates a loop acting on `node` and `worker`. Pool statistics are
    /// fetched for the node's worker identity.
    pub fn new(
        node: Arc<P2pNode>,
        worker: Arc<dyn WorkerControl>,
        pool_stats: PoolStatsClient,
        events: EventBus,
    ) -> Self {
        let wallet = node.identity().worker_id().to_string();
        Self {
            node,
            worker,
            pool_stats,
            wallet,
            events,
        }
    }

    /// Takes commands until `stop`, cancellation or the queue closing.
    pub async fn run(&self, mut commands: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => command,
            };

            let Some(command) = command else {
                break;
            };
            if self.execute(command).await == Flow::Stop {
                break;
            }
        }
    }

    /// Executes one command. No command error ends the loop; only `stop` does.
    pub async fn execute(&self, command: Command) -> Flow {
        if let Command::Unknown(raw) = &command {
            warn!(command = %raw, "Unknown command");
            self.events.emit(NodeEvent::UnknownCommand { raw: raw.clone() });
            return Flow::Continue;
        }

        info!(%command, "Executing command");
        self.events.emit(NodeEvent::CommandExecuted {
            command: command.clone(),
        });

        match command {
            Command::Stop => return Flow::Stop,
            Command::StartWorker => {
                if let Err(e) = self.worker.start().await {
                    error!(error = %e, "Failed to start worker");
                }
            }
            Command::StopWorker => {
                if let Err(e) = self.worker.stop().await {
                    error!(error = %e, "Failed to stop worker");
                }
            }
            Command::ListPeers => {
                let peers = self.node.peers();
                let listing: Vec<String> = peers.iter().map(ToString::to_string).collect();
                info!(count = peers.len(), peers = %listing.join(", "), "Known peers");
                self.events.emit(NodeEvent::PeersListed { peers });
            }
            Command::RequestPoolInfo => {
                let report = self.node.request_pool_info().await;
                info!(
                    delivered = report.delivered.len(),
                    evicted = report.evicted.len(),
                    "Pool info requested"
                );
            }
            Command::PoolStats => match self.pool_stats.fetch(&self.wallet).await {
                Ok(stats) => {
                    for (label, value) in stats.summary() {
                        info!(wallet = %self.wallet, "{label}: {value}");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to fetch pool statistics"),
            },
            Command::Unknown(_) => {}
        }
        Flow::Continue
    }

    /// Shutdown sequence: announce, stop the overlay, then stop the worker.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.events.emit(NodeEvent::ShuttingDown);
        self.node.shutdown();
        if let Err(e) = self.worker.stop().await {
            error!(error = %e, "Failed to stop worker during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use p2pminer_config::{NetworkConfig, PoolStatsConfig};
    use p2pminer_core::{NodeIdentity, NodeStatus, StatusHandle};
    use p2pminer_worker::{WorkerError, WorkerResult};
    use std::path::PathBuf;

    mock! {
        Worker {}

        #[async_trait]
        impl WorkerControl for Worker {
            async fn start(&self) -> WorkerResult<()>;
            async fn stop(&self) -> WorkerResult<()>;
            async fn is_running(&self) -> bool;
        }
    }

    fn control(worker: MockWorker) -> (ControlLoop, mpsc::UnboundedSender<Command>, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::new(64);
        let node = Arc::new(P2pNode::new(
            NodeIdentity::new("127.0.0.1", 8000, "wallet-abc"),
            NetworkConfig::default(),
            StatusHandle::new(NodeStatus::new("pool.example:443")),
            tx.clone(),
            events.clone(),
            CancellationToken::new(),
        ));
        // Nothing listens on port 9; fetches fail fast.
        let pool_stats = PoolStatsClient::new(&PoolStatsConfig {
            api_base: "http://127.0.0.1:9/api".to_string(),
            request_timeout_secs: 1,
        })
        .unwrap();
        (ControlLoop::new(node, Arc::new(worker), pool_stats, events), tx, rx)
    }

    #[tokio::test]
    async fn test_worker_commands_reach_adapter() {
        let mut worker = MockWorker::new();
        worker.expect_start().times(1).returning(|| Ok(()));
        worker.expect_stop().times(1).returning(|| Ok(()));
        let (control, _tx, _rx) = control(worker);

        assert_eq!(control.execute(Command::StartWorker).await, Flow::Continue);
        assert_eq!(control.execute(Command::StopWorker).await, Flow::Continue);
    }

    #[tokio::test]
    async fn test_worker_failure_is_not_fatal() {
        let mut worker = MockWorker::new();
        worker.expect_start().times(1).returning(|| {
            Err(WorkerError::BinaryNotFound {
                path: PathBuf::from("/missing/xmrig"),
            })
        });
        let (control, _tx, _rx) = control(worker);

        assert_eq!(control.execute(Command::StartWorker).await, Flow::Continue);
    }

    #[tokio::test]
    async fn test_unknown_and_failed_commands_continue() {
        let (control, _tx, _rx) = control(MockWorker::new());
        let mut events = control.events.subscribe();

        assert_eq!(
            control.execute(Command::Unknown("dance".to_string())).await,
            Flow::Continue
        );
        assert_eq!(control.execute(Command::ListPeers).await, Flow::Continue);
        assert_eq!(control.execute(Command::RequestPoolInfo).await, Flow::Continue);
        assert_eq!(control.execute(Command::PoolStats).await, Flow::Continue);

        assert_eq!(
            events.recv().await.unwrap(),
            NodeEvent::UnknownCommand {
                raw: "dance".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_stop_and_shutdown_stops_worker() {
        let mut worker = MockWorker::new();
        worker.expect_start().times(1).returning(|| Ok(()));
        worker.expect_stop().times(1).returning(|| Ok(()));
        let (control, tx, rx) = control(worker);

        tx.send(Command::StartWorker).unwrap();
        tx.send(Command::Unknown("noise".to_string())).unwrap();
        tx.send(Command::Stop).unwrap();
        tx.send(Command::StartWorker).unwrap();

        control.run(rx, CancellationToken::new()).await;
        control.shutdown().await;
        assert!(control.node.is_shutting_down());
    }

    #[tokio::test]
    async fn test_run_ends_on_cancel() {
        let (control, _tx, rx) = control(MockWorker::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        control.run(rx, cancel).await;
    }
}
