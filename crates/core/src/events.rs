use std::net::SocketAddr;

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

use crate::command::Command;
use crate::peer::PeerAddress;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Pool information a node reports about itself in a `pool_info_response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    /// Wallet address or worker identity of the responding node
    #[serde(default)]
    pub wallet_address: String,
    /// Pool endpoint of the responding node
    #[serde(default)]
    pub pool_url: String,
    /// Last throughput figure of the responding node. Numeric figures are
    /// accepted and kept as text.
    #[serde(default = "unavailable", deserialize_with = "text_or_number")]
    pub hashrate: String,
    /// Time of the last throughput figure
    #[serde(default = "unavailable")]
    pub last_activity: String,
    /// Listening port of the responding node
    pub node_port: u16,
}

fn unavailable() -> String {
    crate::status::UNAVAILABLE.to_string()
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(unavailable()),
        other => Err(de::Error::invalid_type(
            de::Unexpected::Other(&other.to_string()),
            &"a string or a number",
        )),
    }
}

/// Observable things that happen inside a node.
///
/// Every component publishes on the [`EventBus`] it was constructed with; the
/// same facts are also logged through `tracing`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Listener bound and accepting
    Listening {
        /// Bound local address
        address: SocketAddr,
    },

    /// Peer inserted into the registry
    PeerAdded {
        /// Registered address
        peer: PeerAddress,
    },

    /// Peer removed from the registry
    PeerRemoved {
        /// Removed address
        peer: PeerAddress,
        /// Why it was removed
        reason: String,
    },

    /// Connection accepted or dialed
    ConnectionOpened {
        /// Remote socket address
        remote: SocketAddr,
        /// Whether the remote dialed us
        inbound: bool,
    },

    /// Connection handler finished
    ConnectionClosed {
        /// Remote socket address
        remote: SocketAddr,
        /// Identity the remote announced on this connection, if any
        announced: Option<PeerAddress>,
    },

    /// Startup dial to a seed failed
    SeedUnreachable {
        /// Seed that could not be reached
        seed: PeerAddress,
        /// Error description
        error: String,
    },

    /// Envelope decoded and dispatched
    MessageReceived {
        /// Remote socket address
        from: SocketAddr,
        /// Wire name of the message type
        kind: String,
    },

    /// Envelope could not be decoded; the connection stays open
    MalformedMessage {
        /// Remote socket address
        from: SocketAddr,
        /// Decode error description
        error: String,
    },

    /// Transaction payload received
    TransactionReceived {
        /// Remote socket address
        from: SocketAddr,
        /// Opaque payload
        data: serde_json::Value,
    },

    /// Block payload received
    BlockReceived {
        /// Remote socket address
        from: SocketAddr,
        /// Block index
        index: u64,
    },

    /// Peer list merged into the registry
    PeerListMerged {
        /// Remote socket address
        from: SocketAddr,
        /// Number of genuinely new peers
        added: usize,
    },

    /// Pool information received from a peer
    PoolInfoReceived {
        /// Remote socket address
        from: SocketAddr,
        /// Reported information
        info: PoolInfo,
    },

    /// Fan-out finished
    BroadcastCompleted {
        /// Wire name of the message type
        kind: String,
        /// Peers the message was written to
        delivered: usize,
        /// Peers evicted because the send failed
        evicted: usize,
    },

    /// Command taken from the queue for execution
    CommandExecuted {
        /// Executed command
        command: Command,
    },

    /// Unrecognised command, ignored
    UnknownCommand {
        /// Raw command text
        raw: String,
    },

    /// Registry snapshot reported by `list-peers`
    PeersListed {
        /// Known peers
        peers: Vec<PeerAddress>,
    },

    /// External worker spawned
    WorkerStarted {
        /// Process id, when the platform reports one
        pid: Option<u32>,
    },

    /// External worker stopped or exited
    WorkerStopped {
        /// Exit code, when known
        code: Option<i32>,
    },

    /// External worker could not be started
    WorkerUnavailable {
        /// Error description
        reason: String,
    },

    /// Worker reported a new throughput figure
    HashrateUpdated {
        /// Scraped figure
        hashrate: String,
    },

    /// Node is shutting down
    ShuttingDown,
}

impl NodeEvent {
    /// Gets the peer address associated with this event, if any
    pub fn peer(&self) -> Option<&PeerAddress> {
        match self {
            NodeEvent::PeerAdded { peer }
            | NodeEvent::PeerRemoved { peer, .. }
            | NodeEvent::SeedUnreachable { seed: peer, .. } => Some(peer),
            NodeEvent::ConnectionClosed { announced, .. } => announced.as_ref(),
            _ => None,
        }
    }

    /// Checks if this is a registry membership event
    pub fn is_membership_event(&self) -> bool {
        matches!(
            self,
            NodeEvent::PeerAdded { .. } | NodeEvent::PeerRemoved { .. }
        )
    }
}

/// Broadcast channel carrying [`NodeEvent`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event. Having no subscriber is not an error.
    pub fn emit(&self, event: NodeEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!(?event, "no event subscribers");
        }
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let peer = PeerAddress::new("127.0.0.1", 8001);
        bus.emit(NodeEvent::PeerAdded { peer: peer.clone() });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.peer(), Some(&peer));
        assert!(event.is_membership_event());
    }

    #[test]
    fn test_pool_info_hashrate_text_or_number() {
        let info: PoolInfo = serde_json::from_value(serde_json::json!({
            "wallet_address": "wallet-abc",
            "hashrate": 850.5,
            "node_port": 8001
        }))
        .unwrap();
        assert_eq!(info.hashrate, "850.5");
        assert_eq!(info.last_activity, "N/A");

        let info: PoolInfo = serde_json::from_value(serde_json::json!({
            "hashrate": "1.2 kH/s",
            "node_port": 8001
        }))
        .unwrap();
        assert_eq!(info.hashrate, "1.2 kH/s");

        let info: PoolInfo =
            serde_json::from_value(serde_json::json!({"hashrate": null, "node_port": 8001})).unwrap();
        assert_eq!(info.hashrate, "N/A");

        assert!(serde_json::from_value::<PoolInfo>(serde_json::json!({
            "hashrate": [1, 2],
            "node_port": 8001
        }))
        .is_err());
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(NodeEvent::ShuttingDown);
    }

    #[test]
    fn test_pool_info_defaults() {
        let info: PoolInfo = serde_json::from_str(r#"{"node_port": 8001}"#).unwrap();
        assert_eq!(info.node_port, 8001);
        assert_eq!(info.hashrate, crate::status::UNAVAILABLE);
        assert_eq!(info.last_activity, crate::status::UNAVAILABLE);
        assert!(info.pool_url.is_empty());
    }
}
