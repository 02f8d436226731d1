//! Worker and pool API error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while supervising the worker or querying the pool
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The configured worker binary does not exist
    #[error("worker binary not found at {}", path.display())]
    BinaryNotFound {
        /// Configured path
        path: PathBuf,
    },

    /// The worker could not be spawned
    #[error("failed to start worker: {0}")]
    Spawn(#[source] io::Error),

    /// Signalling or reaping the worker failed
    #[error("failed to stop worker: {0}")]
    Stop(#[source] io::Error),

    /// The pool API base URL cannot carry a path
    #[error("pool API base '{0}' cannot be used as a base URL")]
    InvalidApiBase(String),

    /// The pool API URL could not be parsed
    #[error("invalid pool API URL: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP request failed or returned an error status
    #[error("pool API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for worker operations
pub type WorkerResult<T> = std::result::Result<T, WorkerError>;
