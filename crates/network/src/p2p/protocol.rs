//! Message dispatch.
//!
//! [`ProtocolHandler::dispatch`] applies one decoded message to the node and
//! returns the replies to write back on the same connection. Relays run in
//! spawned tasks so a slow fan-out never stalls the connection that
//! triggered it.

use std::sync::Arc;

use p2pminer_core::{Command, EventBus, NodeEvent, NodeIdentity, PeerAddress, PoolInfo, StatusHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::{ConnectionContext, Direction};
use super::messenger::{BroadcastReport, Messenger};
use crate::messages::Message;
use crate::peers::PeerRegistry;

/// Applies protocol messages to the local node.
#[derive(Debug)]
pub struct ProtocolHandler {
    identity: NodeIdentity,
    registry: Arc<PeerRegistry>,
    messenger: Messenger,
    status: StatusHandle,
    commands: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl ProtocolHandler {
    /// Creates a handler forwarding `internal_command`s into `commands`.
    pub fn new(
        identity: NodeIdentity,
        messenger: Messenger,
        status: StatusHandle,
        commands: mpsc::UnboundedSender<Command>,
        events: EventBus,
    ) -> Self {
        Self {
            identity,
            registry: messenger.registry().clone(),
            messenger,
            status,
            commands,
            events,
        }
    }

    /// Local identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Pool information describing this node.
    pub fn pool_info(&self) -> PoolInfo {
        let status = self.status.snapshot();
        PoolInfo {
            wallet_address: self.identity.worker_id().to_string(),
            pool_url: status.pool_url,
            hashrate: status.hashrate,
            last_activity: status.last_activity,
            node_port: self.identity.port(),
        }
    }

    /// Handles one message received on the connection described by `ctx` and
    /// returns the replies for that connection.
    pub fn dispatch(&self, ctx: &mut ConnectionContext, message: Message) -> Vec<Message> {
        let from = ctx.remote();
        let kind = message.message_type();
        debug!(%from, %kind, "message received");
        self.events.emit(NodeEvent::MessageReceived {
            from,
            kind: kind.to_string(),
        });

        match message {
            Message::Handshake(payload) => {
                let peer = PeerAddress::observed(&from, payload.port);
                self.registry.add(peer.clone());
                ctx.announce(peer);
                if payload.oneshot {
                    // The sender hangs up after one message; nobody reads a peer list.
                    debug!(%from, port = payload.port, "one-shot delivery announced");
                    ctx.mark_oneshot();
                    return Vec::new();
                }
                info!(%from, port = payload.port, "Handshake received");
                vec![Message::peer_list(self.registry.list())]
            }
            Message::RequestPeers => vec![Message::peer_list(self.registry.list())],
            Message::PeerList(peers) => {
                let added = self.registry.merge(peers);
                if added > 0 {
                    info!(%from, added, known_peers = self.registry.len(), "Peer list merged");
                }
                self.events.emit(NodeEvent::PeerListMerged { from, added });
                Vec::new()
            }
            Message::Transaction(data) => {
                info!(%from, "New transaction received");
                self.events.emit(NodeEvent::TransactionReceived {
                    from,
                    data: data.clone(),
                });
                self.relay(Message::Transaction(data), ctx.announced().cloned());
                Vec::new()
            }
            Message::Block(block) => {
                info!(%from, index = block.index, "New block received");
                self.events.emit(NodeEvent::BlockReceived {
                    from,
                    index: block.index,
                });
                self.relay(Message::Block(block), ctx.announced().cloned());
                Vec::new()
            }
            Message::PoolInfoRequest(payload) => {
                debug!(%from, requester_port = ?payload.requester_port, "pool info requested");
                vec![Message::PoolInfoResponse(self.pool_info())]
            }
            Message::PoolInfoResponse(info) => {
                info!(
                    %from,
                    node_port = info.node_port,
                    wallet = %info.wallet_address,
                    pool = %info.pool_url,
                    hashrate = %info.hashrate,
                    last_activity = %info.last_activity,
                    "Pool info received"
                );
                self.events.emit(NodeEvent::PoolInfoReceived { from, info });
                Vec::new()
            }
            Message::InternalCommand(payload) => {
                match Command::parse(&payload.command) {
                    Some(command) => {
                        info!(%from, %command, "Internal command received");
                        if self.commands.send(command).is_err() {
                            warn!(%from, "command queue closed, dropping internal command");
                        }
                    }
                    None => debug!(%from, "ignoring empty internal command"),
                }
                Vec::new()
            }
        }
    }

    /// Dispatches replies collected by a one-shot delivery. Anything they
    /// would in turn answer is dropped.
    pub fn dispatch_replies(&self, report: &BroadcastReport) {
        for delivery in &report.delivered {
            let mut ctx = ConnectionContext::new(delivery.remote, Direction::Outbound);
            for reply in &delivery.replies {
                let _ = self.dispatch(&mut ctx, reply.clone());
            }
        }
    }

    /// Asks every known peer for its pool information. Responses are logged
    /// and published as [`NodeEvent::PoolInfoReceived`].
    pub async fn request_pool_info(&self) -> BroadcastReport {
        let request = Message::pool_info_request(self.identity.port());
        let report = self.messenger.broadcast(&request, None).await;
        self.dispatch_replies(&report);
        report
    }

    /// Relays `message` to every peer except `exclude` in the background.
    fn relay(&self, message: Message, exclude: Option<PeerAddress>) {
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            messenger.broadcast(&message, exclude.as_ref()).await;
        });
    }
}
