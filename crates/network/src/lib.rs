//! # p2pminer network
//!
//! Overlay networking for a miner node: newline-delimited JSON messages over
//! TCP, a self-excluding peer registry, long-lived sessions to seeds and
//! one-shot gossip to everyone else.
//!
//! ```no_run
//! use p2pminer_config::NetworkConfig;
//! use p2pminer_core::{EventBus, NodeIdentity, NodeStatus, StatusHandle};
//! use p2pminer_network::P2pNode;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> p2pminer_network::NetworkResult<()> {
//! let (commands, _queue) = tokio::sync::mpsc::unbounded_channel();
//! let node = P2pNode::new(
//!     NodeIdentity::new("0.0.0.0", 8001, "wallet"),
//!     NetworkConfig::default(),
//!     StatusHandle::new(NodeStatus::new("pool.example:443")),
//!     commands,
//!     EventBus::default(),
//!     CancellationToken::new(),
//! );
//! node.start().await?;
//! node.dial_seeds().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod messages;
pub mod p2p;
pub mod peers;

pub use error::{NetworkError, NetworkResult};
pub use messages::{CodecError, Message, MessageCodec, MessageType};
pub use p2p::{
    BroadcastReport, ConnectionContext, ConnectionHandler, ConnectionState, Delivery, Direction,
    Listener, Messenger, P2pNode, ProtocolHandler,
};
pub use peers::PeerRegistry;
