use std::fmt;

use serde::{Deserialize, Serialize};

use crate::peer::PeerAddress;

/// Identity of the local node, fixed at construction.
///
/// The port doubles as the node's logical identity: any peer address carrying
/// the same port is treated as this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    bind_host: String,
    port: u16,
    worker_id: String,
}

impl NodeIdentity {
    /// Creates the identity of a node listening on `bind_host:port` and
    /// mining for `worker_id`.
    pub fn new(bind_host: impl Into<String>, port: u16, worker_id: impl Into<String>) -> Self {
        Self {
            bind_host: bind_host.into(),
            port,
            worker_id: worker_id.into(),
        }
    }

    /// Host the listener binds to.
    pub fn bind_host(&self) -> &str {
        &self.bind_host
    }

    /// Listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Wallet address or worker identity handed to the external worker.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Whether `addr` denotes this node.
    pub fn is_self(&self, addr: &PeerAddress) -> bool {
        addr.port == self.port
    }

    /// Shortened worker id for log lines.
    pub fn short_worker_id(&self) -> &str {
        let end = self
            .worker_id
            .char_indices()
            .nth(10)
            .map(|(i, _)| i)
            .unwrap_or(self.worker_id.len());
        &self.worker_id[..end]
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({}...)", self.bind_host, self.port, self.short_worker_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_matched_by_port() {
        let identity = NodeIdentity::new("0.0.0.0", 8000, "wallet");
        assert!(identity.is_self(&PeerAddress::new("127.0.0.1", 8000)));
        assert!(identity.is_self(&PeerAddress::new("localhost", 8000)));
        assert!(!identity.is_self(&PeerAddress::new("127.0.0.1", 8001)));
    }

    #[test]
    fn test_short_worker_id() {
        let identity = NodeIdentity::new("0.0.0.0", 8000, "4931PMmb9FE2LapSempngo");
        assert_eq!(identity.short_worker_id(), "4931PMmb9F");

        let short = NodeIdentity::new("0.0.0.0", 8000, "abc");
        assert_eq!(short.short_worker_id(), "abc");
    }
}
