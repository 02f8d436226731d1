//! P2P node assembly.
//!
//! [`P2pNode`] wires the registry, messenger, protocol handler and listener
//! together and exposes the operations the control loop needs.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future;
use p2pminer_config::NetworkConfig;
use p2pminer_core::{Command, EventBus, NodeEvent, NodeIdentity, PeerAddress, StatusHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::connection::{ConnectionHandler, Direction};
use super::listener::Listener;
use super::messenger::{BroadcastReport, Messenger};
use super::protocol::ProtocolHandler;
use crate::error::NetworkResult;
use crate::messages::Message;
use crate::peers::PeerRegistry;

/// Overlay endpoint of one miner node.
#[derive(Debug)]
pub struct P2pNode {
    identity: NodeIdentity,
    config: NetworkConfig,
    registry: Arc<PeerRegistry>,
    messenger: Messenger,
    protocol: Arc<ProtocolHandler>,
    handler: Arc<ConnectionHandler>,
    events: EventBus,
    cancel: CancellationToken,
}

impl P2pNode {
    /// Builds a node. Nothing touches the network until [`P2pNode::start`].
    ///
    /// `commands` receives every `internal_command` a peer sends; `cancel`
    /// stops the listener and every session when fired.
    pub fn new(
        identity: NodeIdentity,
        config: NetworkConfig,
        status: StatusHandle,
        commands: mpsc::UnboundedSender<Command>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        let registry = Arc::new(PeerRegistry::new(identity.port(), events.clone()));
        let messenger = Messenger::new(registry.clone(), &config, events.clone());
        let protocol = Arc::new(ProtocolHandler::new(
            identity.clone(),
            messenger.clone(),
            status,
            commands,
            events.clone(),
        ));
        let handler = Arc::new(ConnectionHandler::new(
            protocol.clone(),
            registry.clone(),
            events.clone(),
            config.read_timeout(),
            config.max_frame_len,
            cancel.clone(),
        ));

        Self {
            identity,
            config,
            registry,
            messenger,
            protocol,
            handler,
            events,
            cancel,
        }
    }

    /// Binds the listener and starts accepting in the background.
    pub async fn start(&self) -> NetworkResult<SocketAddr> {
        let listener = Listener::bind(&self.config.listen_address()).await?;
        let address = listener.local_addr();
        self.events.emit(NodeEvent::Listening { address });
        tokio::spawn(listener.run(self.handler.clone(), self.cancel.clone()));
        Ok(address)
    }

    /// Opens a long-lived session to `peer`.
    pub async fn connect(&self, peer: &PeerAddress) -> NetworkResult<()> {
        let stream = self.messenger.connect(peer).await?;
        let handler = self.handler.clone();
        tokio::spawn(async move {
            handler.run(stream, Direction::Outbound).await;
        });
        Ok(())
    }

    /// Dials every configured seed except this node, concurrently. Returns
    /// the number of sessions opened.
    pub async fn dial_seeds(&self) -> usize {
        let seeds: Vec<&PeerAddress> = self
            .config
            .seeds
            .iter()
            .filter(|seed| !self.identity.is_self(seed))
            .collect();

        let dials = seeds.iter().map(|seed| async move { (*seed, self.connect(seed).await) });

        let mut connected = 0;
        for (seed, result) in future::join_all(dials).await {
            match result {
                Ok(()) => connected += 1,
                Err(e) => {
                    warn!(%seed, error = %e, "Seed unreachable");
                    self.events.emit(NodeEvent::SeedUnreachable {
                        seed: seed.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(connected, attempted = seeds.len(), "Seed dialing finished");
        connected
    }

    /// Sends `message` to every known peer.
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        self.messenger.broadcast(message, None).await
    }

    /// Asks every known peer for its pool information.
    pub async fn request_pool_info(&self) -> BroadcastReport {
        self.protocol.request_pool_info().await
    }

    /// Sorted snapshot of the registry.
    pub fn peers(&self) -> Vec<PeerAddress> {
        self.registry.list()
    }

    /// Peer registry.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Local identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Event bus every component publishes on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stops the listener and every open session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether [`P2pNode::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
