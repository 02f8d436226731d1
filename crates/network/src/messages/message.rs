//! Message types carried inside the wire envelope.

use std::fmt;
use std::str::FromStr;

use p2pminer_core::{PeerAddress, PoolInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::codec::CodecError;

/// Wire names of every envelope `type` this node understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Identity announcement
    Handshake,
    /// Opaque transaction payload, relayed
    Transaction,
    /// Block payload, relayed
    Block,
    /// List of known peers
    PeerList,
    /// Request for a `peer_list`
    RequestPeers,
    /// Request for a `pool_info_response`
    PoolInfoRequest,
    /// Pool information about the responder
    PoolInfoResponse,
    /// Administrative command forwarded to the control queue
    InternalCommand,
}

impl MessageType {
    /// Every message type, in wire order.
    pub const ALL: [MessageType; 8] = [
        MessageType::Handshake,
        MessageType::Transaction,
        MessageType::Block,
        MessageType::PeerList,
        MessageType::RequestPeers,
        MessageType::PoolInfoRequest,
        MessageType::PoolInfoResponse,
        MessageType::InternalCommand,
    ];

    /// Envelope `type` string.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Handshake => "handshake",
            MessageType::Transaction => "transaction",
            MessageType::Block => "block",
            MessageType::PeerList => "peer_list",
            MessageType::RequestPeers => "request_peers",
            MessageType::PoolInfoRequest => "pool_info_request",
            MessageType::PoolInfoResponse => "pool_info_response",
            MessageType::InternalCommand => "internal_command",
        }
    }

    /// Whether messages of this type are relayed to other peers on receipt.
    pub fn is_relayed(&self) -> bool {
        matches!(self, MessageType::Transaction | MessageType::Block)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CodecError::UnknownType(s.to_string()))
    }
}

/// `handshake` payload.
///
/// One-shot deliveries open with a handshake marked `oneshot` so the receiver
/// knows who sent the message that follows. The connection closes right after,
/// which must not be read as the sender leaving the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Port the sender listens on
    pub port: u16,
    /// Sender closes the connection after one message
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub oneshot: bool,
}

/// `block` payload. Only the index is interpreted; everything else is carried
/// through untouched when the block is relayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockPayload {
    /// Block index
    pub index: u64,
    /// Remaining block fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BlockPayload {
    /// Block with only an index.
    pub fn new(index: u64) -> Self {
        Self {
            index,
            fields: Map::new(),
        }
    }
}

/// `pool_info_request` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfoRequestPayload {
    /// Listening port of the requester, informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_port: Option<u16>,
}

/// `internal_command` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalCommandPayload {
    /// Raw command text
    pub command: String,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Identity announcement
    Handshake(HandshakePayload),
    /// Opaque transaction payload
    Transaction(Value),
    /// Block payload
    Block(BlockPayload),
    /// Known peers
    PeerList(Vec<PeerAddress>),
    /// Request for the receiver's peer list
    RequestPeers,
    /// Request for the receiver's pool information
    PoolInfoRequest(PoolInfoRequestPayload),
    /// Pool information about the sender
    PoolInfoResponse(PoolInfo),
    /// Administrative command
    InternalCommand(InternalCommandPayload),
}

impl Message {
    /// Handshake announcing `port`.
    pub fn handshake(port: u16) -> Self {
        Message::Handshake(HandshakePayload {
            port,
            oneshot: false,
        })
    }

    /// Handshake opening a one-shot delivery from a node listening on `port`.
    pub fn oneshot_handshake(port: u16) -> Self {
        Message::Handshake(HandshakePayload {
            port,
            oneshot: true,
        })
    }

    /// Peer list message.
    pub fn peer_list(peers: Vec<PeerAddress>) -> Self {
        Message::PeerList(peers)
    }

    /// Pool information request from a node listening on `port`.
    pub fn pool_info_request(port: u16) -> Self {
        Message::PoolInfoRequest(PoolInfoRequestPayload {
            requester_port: Some(port),
        })
    }

    /// Internal command carrying `command` verbatim.
    pub fn internal_command(command: impl Into<String>) -> Self {
        Message::InternalCommand(InternalCommandPayload {
            command: command.into(),
        })
    }

    /// Type tag of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Handshake(_) => MessageType::Handshake,
            Message::Transaction(_) => MessageType::Transaction,
            Message::Block(_) => MessageType::Block,
            Message::PeerList(_) => MessageType::PeerList,
            Message::RequestPeers => MessageType::RequestPeers,
            Message::PoolInfoRequest(_) => MessageType::PoolInfoRequest,
            Message::PoolInfoResponse(_) => MessageType::PoolInfoResponse,
            Message::InternalCommand(_) => MessageType::InternalCommand,
        }
    }

    /// Envelope `data` value for this message.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Message::Handshake(payload) => serde_json::to_value(payload),
            Message::Transaction(data) => Ok(data.clone()),
            Message::Block(payload) => serde_json::to_value(payload),
            Message::PeerList(peers) => serde_json::to_value(peers),
            Message::RequestPeers => Ok(Value::Object(Map::new())),
            Message::PoolInfoRequest(payload) => serde_json::to_value(payload),
            Message::PoolInfoResponse(info) => serde_json::to_value(info),
            Message::InternalCommand(payload) => serde_json::to_value(payload),
        }
    }

    /// Builds a message from an envelope's type tag and `data` value.
    pub fn from_parts(kind: MessageType, data: Value) -> Result<Self, CodecError> {
        let malformed = |e: serde_json::Error| CodecError::Malformed(format!("{kind}: {e}"));

        let message = match kind {
            MessageType::Handshake => Message::Handshake(serde_json::from_value(data).map_err(malformed)?),
            MessageType::Transaction => Message::Transaction(data),
            MessageType::Block => Message::Block(serde_json::from_value(data).map_err(malformed)?),
            MessageType::PeerList => Message::PeerList(serde_json::from_value(data).map_err(malformed)?),
            MessageType::RequestPeers => Message::RequestPeers,
            MessageType::PoolInfoRequest => {
                let payload = if data.is_null() {
                    PoolInfoRequestPayload::default()
                } else {
                    serde_json::from_value(data).map_err(malformed)?
                };
                Message::PoolInfoRequest(payload)
            }
            MessageType::PoolInfoResponse => {
                Message::PoolInfoResponse(serde_json::from_value(data).map_err(malformed)?)
            }
            MessageType::InternalCommand => {
                Message::InternalCommand(serde_json::from_value(data).map_err(malformed)?)
            }
        };
        Ok(message)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Handshake(payload) => write!(f, "handshake(port={})", payload.port),
            Message::Block(payload) => write!(f, "block(index={})", payload.index),
            Message::PeerList(peers) => write!(f, "peer_list({} peers)", peers.len()),
            Message::InternalCommand(payload) => write!(f, "internal_command({})", payload.command),
            other => f.write_str(other.message_type().as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_names_roundtrip() {
        for kind in MessageType::ALL {
            assert_eq!(kind.as_str().parse::<MessageType>().unwrap(), kind);
        }
        assert!(matches!(
            "ping".parse::<MessageType>(),
            Err(CodecError::UnknownType(name)) if name == "ping"
        ));
    }

    #[test]
    fn test_oneshot_flag_only_on_the_wire_when_set() {
        assert_eq!(Message::handshake(8001).data().unwrap(), json!({"port": 8001}));
        assert_eq!(
            Message::oneshot_handshake(8001).data().unwrap(),
            json!({"port": 8001, "oneshot": true})
        );
        assert_eq!(
            Message::from_parts(MessageType::Handshake, json!({"port": 8001})).unwrap(),
            Message::handshake(8001)
        );
    }

    #[test]
    fn test_pool_info_response_with_numeric_hashrate() {
        let data = json!({
            "wallet_address": "wallet-abc",
            "pool_url": "pool.example:443",
            "hashrate": 1024,
            "last_activity": "12:00:00",
            "node_port": 8001
        });
        match Message::from_parts(MessageType::PoolInfoResponse, data).unwrap() {
            Message::PoolInfoResponse(info) => assert_eq!(info.hashrate, "1024"),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_relayed_types() {
        let relayed: Vec<_> = MessageType::ALL.into_iter().filter(|k| k.is_relayed()).collect();
        assert_eq!(relayed, vec![MessageType::Transaction, MessageType::Block]);
    }

    #[test]
    fn test_block_keeps_extra_fields() {
        let data = json!({"index": 42, "hash": "abc", "txs": [1, 2]});
        let message = Message::from_parts(MessageType::Block, data.clone()).unwrap();
        match &message {
            Message::Block(block) => {
                assert_eq!(block.index, 42);
                assert_eq!(block.fields.get("hash"), Some(&json!("abc")));
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert_eq!(message.data().unwrap(), data);
    }

    #[test]
    fn test_block_without_index_is_malformed() {
        let result = Message::from_parts(MessageType::Block, json!({"hash": "abc"}));
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_peer_list_shape() {
        let message = Message::peer_list(vec![PeerAddress::new("127.0.0.1", 8001)]);
        assert_eq!(message.data().unwrap(), json!([["127.0.0.1", 8001]]));
    }

    #[test]
    fn test_pool_info_request_without_data() {
        let message = Message::from_parts(MessageType::PoolInfoRequest, Value::Null).unwrap();
        assert_eq!(message, Message::PoolInfoRequest(PoolInfoRequestPayload::default()));
    }

    #[test]
    fn test_handshake_port_out_of_range() {
        let result = Message::from_parts(MessageType::Handshake, json!({"port": 70000}));
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }
}
