//! Overlay sessions, dispatch and gossip.
//!
//! - [`connection`]: per-connection read loop and its state
//! - [`protocol`]: what each message does to the node
//! - [`messenger`]: one-shot sends and concurrent fan-out
//! - [`listener`]: accept loop
//! - [`node`]: the assembled [`P2pNode`]

pub mod connection;
pub mod listener;
pub mod messenger;
pub mod node;
pub mod protocol;

pub use connection::{ConnectionContext, ConnectionHandler, ConnectionState, Direction};
pub use listener::Listener;
pub use messenger::{BroadcastReport, Delivery, Messenger};
pub use node::P2pNode;
pub use protocol::ProtocolHandler;
