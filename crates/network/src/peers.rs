//! Peer registry.
//!
//! The registry is the node's view of the overlay: the set of listening
//! addresses it gossips to. It never contains the node itself. Every change is
//! logged and published as a [`NodeEvent`].

use std::collections::HashSet;
use std::net::SocketAddr;

use p2pminer_core::{EventBus, NodeEvent, PeerAddress};
use parking_lot::RwLock;
use tracing::{debug, info};

/// Reason recorded when a session ends.
pub const REASON_DISCONNECTED: &str = "disconnected";
/// Reason recorded when a send fails.
pub const REASON_UNREACHABLE: &str = "unreachable";
/// Reason recorded for explicit removals.
pub const REASON_REMOVED: &str = "removed";

/// Thread-safe set of known peers.
///
/// Self-exclusion is by port alone: any address announcing the local
/// listening port is treated as this node, whatever its host.
#[derive(Debug)]
pub struct PeerRegistry {
    local_port: u16,
    peers: RwLock<HashSet<PeerAddress>>,
    events: EventBus,
}

impl PeerRegistry {
    /// Creates an empty registry for a node listening on `local_port`.
    pub fn new(local_port: u16, events: EventBus) -> Self {
        Self {
            local_port,
            peers: RwLock::new(HashSet::new()),
            events,
        }
    }

    /// Listening port of the local node.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Whether `addr` refers to the local node.
    pub fn is_self(&self, addr: &PeerAddress) -> bool {
        addr.port == self.local_port
    }

    /// Inserts a peer. Returns `true` if it was not known before.
    pub fn add(&self, addr: PeerAddress) -> bool {
        if self.is_self(&addr) {
            debug!(peer = %addr, "ignoring own address");
            return false;
        }

        let count = {
            let mut peers = self.peers.write();
            if !peers.insert(addr.clone()) {
                return false;
            }
            peers.len()
        };

        info!(peer = %addr, known_peers = count, "Peer added");
        self.events.emit(NodeEvent::PeerAdded { peer: addr });
        true
    }

    /// Removes a peer. Removing an unknown peer is a no-op.
    pub fn remove(&self, addr: &PeerAddress) -> bool {
        self.remove_with_reason(addr, REASON_REMOVED)
    }

    /// Removes a peer, recording why.
    pub fn remove_with_reason(&self, addr: &PeerAddress, reason: &str) -> bool {
        let count = {
            let mut peers = self.peers.write();
            if !peers.remove(addr) {
                return false;
            }
            peers.len()
        };

        info!(peer = %addr, reason, known_peers = count, "Peer removed");
        self.events.emit(NodeEvent::PeerRemoved {
            peer: addr.clone(),
            reason: reason.to_string(),
        });
        true
    }

    /// Removes the peer a finished connection stood for.
    ///
    /// The key is the remote host paired with the port announced in the
    /// handshake. Without a handshake the socket's own port is used, which
    /// for a transient connection matches nothing.
    pub fn remove_by_connection(
        &self,
        remote: &SocketAddr,
        announced_port: Option<u16>,
    ) -> Option<PeerAddress> {
        let addr = PeerAddress::observed(remote, announced_port.unwrap_or(remote.port()));
        self.remove_with_reason(&addr, REASON_DISCONNECTED)
            .then_some(addr)
    }

    /// Adds every address not already known, skipping the local node.
    /// Returns the number of genuinely new peers.
    pub fn merge<I>(&self, addrs: I) -> usize
    where
        I: IntoIterator<Item = PeerAddress>,
    {
        addrs.into_iter().filter(|addr| self.add(addr.clone())).count()
    }

    /// Whether `addr` is registered.
    pub fn contains(&self, addr: &PeerAddress) -> bool {
        self.peers.read().contains(addr)
    }

    /// Snapshot of the registry, sorted for stable output.
    pub fn list(&self) -> Vec<PeerAddress> {
        let mut peers: Vec<_> = self.peers.read().iter().cloned().collect();
        peers.sort();
        peers
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether no peer is known.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}
