//! # p2pminer core
//!
//! Types shared by every part of the node.
//!
//! - **Peers**: [`PeerAddress`], the `(host, port)` pair the registry is keyed on
//! - **Identity**: [`NodeIdentity`], immutable after construction
//! - **Status**: [`NodeStatus`] and the shared [`StatusHandle`] the worker writes
//!   and the protocol reads
//! - **Commands**: [`Command`], the administrative directives of the control surface
//! - **Events**: [`NodeEvent`] published on an [`EventBus`]

#![warn(missing_docs)]

/// Error types for the core types
pub mod error;
/// Structured node events
pub mod events;
/// Administrative commands
pub mod command;
/// Node identity
pub mod identity;
/// Peer addresses
pub mod peer;
/// Node status shared between the worker adapter and the protocol
pub mod status;

pub use command::Command;
pub use error::{AddressParseError, CoreResult};
pub use events::{EventBus, NodeEvent, PoolInfo, DEFAULT_EVENT_BUFFER};
pub use identity::NodeIdentity;
pub use peer::PeerAddress;
pub use status::{NodeStatus, StatusHandle, UNAVAILABLE};
