//! Network error types.

use std::io;
use std::time::Duration;

use p2pminer_core::PeerAddress;
use thiserror::Error;

use crate::messages::CodecError;

/// Network layer errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The listener could not be bound
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Requested listen address
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Outbound connection refused or reset
    #[error("connection to {peer} failed: {source}")]
    Connect {
        /// Dialed peer
        peer: PeerAddress,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// An outbound operation did not finish in time
    #[error("{operation} to {peer} timed out after {timeout:?}")]
    Timeout {
        /// Dialed peer
        peer: PeerAddress,
        /// What was being attempted
        operation: &'static str,
        /// The bound that expired
        timeout: Duration,
    },

    /// Frame could not be encoded or written
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Generic I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NetworkError {
    /// Creates a timeout error
    pub fn timeout(peer: &PeerAddress, operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout {
            peer: peer.clone(),
            operation,
            timeout,
        }
    }

    /// Whether the failure means the peer is unreachable, as opposed to a
    /// local problem such as a bind conflict.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            NetworkError::Connect { .. }
                | NetworkError::Timeout { .. }
                | NetworkError::Codec(_)
                | NetworkError::Io(_)
        )
    }
}

/// Result type for network operations
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;
