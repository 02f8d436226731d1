use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressParseError;

/// Address of a peer node: the host it was observed at or announced with,
/// and the port it listens on.
///
/// Equality is structural. On the wire a peer address is the two-element
/// array `[host, port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct PeerAddress {
    /// Host name or IP literal
    pub host: String,
    /// Listening port
    pub port: u16,
}

impl PeerAddress {
    /// Creates a peer address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Builds the registry key for a peer seen on a socket: the host observed
    /// from the socket and the port the peer announced in its handshake.
    pub fn observed(remote: &SocketAddr, announced_port: u16) -> Self {
        Self::new(remote.ip().to_string(), announced_port)
    }

    /// Returns the `host:port` string used to dial this peer.
    pub fn dial_target(&self) -> String {
        self.to_string()
    }
}

impl From<(String, u16)> for PeerAddress {
    fn from((host, port): (String, u16)) -> Self {
        Self { host, port }
    }
}

impl From<PeerAddress> for (String, u16) {
    fn from(addr: PeerAddress) -> Self {
        (addr.host, addr.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressParseError::EmptyHost(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        if port == 0 {
            return Err(AddressParseError::InvalidPort(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_port() {
        let addr: PeerAddress = "localhost:8001".parse().unwrap();
        assert_eq!(addr, PeerAddress::new("localhost", 8001));
        assert_eq!(addr.to_string(), "localhost:8001");
    }

    #[test]
    fn test_parse_ipv6_brackets() {
        let addr: PeerAddress = "[::1]:8002".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:8002");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "localhost".parse::<PeerAddress>(),
            Err(AddressParseError::MissingPort(_))
        ));
        assert!(matches!(
            ":8000".parse::<PeerAddress>(),
            Err(AddressParseError::EmptyHost(_))
        ));
        assert!(matches!(
            "host:0".parse::<PeerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
        assert!(matches!(
            "host:http".parse::<PeerAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_wire_form_is_pair() {
        let addr = PeerAddress::new("127.0.0.1", 8000);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, r#"["127.0.0.1",8000]"#);

        let back: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_observed_uses_socket_host() {
        let remote: SocketAddr = "127.0.0.1:53211".parse().unwrap();
        let addr = PeerAddress::observed(&remote, 8002);
        assert_eq!(addr, PeerAddress::new("127.0.0.1", 8002));
    }
}
