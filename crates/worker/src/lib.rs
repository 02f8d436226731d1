//! # p2pminer worker
//!
//! Supervision of the external mining worker and access to the pool's public
//! statistics. The worker's throughput figures flow into the node's shared
//! [`StatusHandle`](p2pminer_core::StatusHandle), which peers read through
//! `pool_info_request`.

#![warn(missing_docs)]

/// Error types
pub mod error;
/// Pool statistics API client
pub mod pool_stats;
/// Worker process supervision
pub mod process;
/// Worker output parsing
pub mod scrape;

pub use error::{WorkerError, WorkerResult};
pub use pool_stats::{PoolStats, PoolStatsClient};
pub use process::{command_args, WorkerControl, WorkerProcess};
pub use scrape::parse_hashrate;
