//! # p2pminer: peer-to-peer miner node
//!
//! A long-running node that accepts inbound connections, keeps a set of known
//! peers, exchanges newline-delimited JSON messages with them, relays
//! transactions and blocks, and supervises an external mining worker whose
//! throughput it reports to peers on request.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use p2pminer::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NetworkConfig {
//!         port: 8001,
//!         ..NetworkConfig::default()
//!     };
//!     let node = MinerNode::new(config, "wallet", "pool.supportxmr.com:443");
//!     node.start().await?;
//!     println!("peers: {:?}", node.p2p().peers());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: peer addresses, identity, status, commands and events
//! - [`config`]: configuration types and defaults
//! - [`network`]: codec, registry, sessions, dispatch and gossip
//! - [`worker`]: worker process supervision and pool statistics

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use p2pminer_config as config;
pub use p2pminer_core as core;
pub use p2pminer_network as network;
pub use p2pminer_worker as worker;

/// Common imports for embedding a node
pub mod prelude {
    pub use crate::config::{NetworkConfig, NodeConfig};
    pub use crate::core::{Command, EventBus, NodeEvent, NodeIdentity, PeerAddress, StatusHandle};
    pub use crate::network::{Message, P2pNode};
    pub use crate::MinerNode;
}

/// Overlay node without the stdin control surface or the worker process.
///
/// `internal_command`s received from peers are queued on
/// [`MinerNode::commands`] for the embedder to execute. Dropping the node
/// stops its listener and sessions.
#[derive(Debug)]
pub struct MinerNode {
    node: Arc<network::P2pNode>,
    status: core::StatusHandle,
    commands: mpsc::UnboundedReceiver<core::Command>,
    cancel: CancellationToken,
}

impl MinerNode {
    /// Creates a node identified by `config.port`.
    pub fn new(
        config: config::NetworkConfig,
        worker_id: impl Into<String>,
        pool_url: impl Into<String>,
    ) -> Self {
        let identity = core::NodeIdentity::new(config.bind_host.clone(), config.port, worker_id);
        let events = core::EventBus::new(config.event_buffer);
        let status = core::StatusHandle::new(core::NodeStatus::new(pool_url));
        let cancel = CancellationToken::new();
        let (tx, commands) = mpsc::unbounded_channel();

        let node = Arc::new(network::P2pNode::new(
            identity,
            config,
            status.clone(),
            tx,
            events,
            cancel.clone(),
        ));

        Self {
            node,
            status,
            commands,
            cancel,
        }
    }

    /// Binds the listener and dials the configured seeds.
    pub async fn start(&self) -> network::NetworkResult<SocketAddr> {
        let address = self.node.start().await?;
        self.node.dial_seeds().await;
        Ok(address)
    }

    /// Overlay endpoint.
    pub fn p2p(&self) -> &Arc<network::P2pNode> {
        &self.node
    }

    /// Shared status reported to peers.
    pub fn status(&self) -> &core::StatusHandle {
        &self.status
    }

    /// Event bus.
    pub fn events(&self) -> &core::EventBus {
        self.node.events()
    }

    /// Commands received from peers.
    pub fn commands(&mut self) -> &mut mpsc::UnboundedReceiver<core::Command> {
        &mut self.commands
    }

    /// Stops the listener and every session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for MinerNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
