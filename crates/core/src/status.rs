use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Sentinel reported for status fields that are not currently known.
pub const UNAVAILABLE: &str = "N/A";

/// Mining status of the local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Pool endpoint the worker mines against
    pub pool_url: String,
    /// Last throughput figure scraped from the worker, or [`UNAVAILABLE`]
    pub hashrate: String,
    /// Local time (`HH:MM:SS`) of the last scraped figure, or [`UNAVAILABLE`]
    pub last_activity: String,
}

impl NodeStatus {
    /// Status of a node whose worker has not reported yet.
    pub fn new(pool_url: impl Into<String>) -> Self {
        Self {
            pool_url: pool_url.into(),
            hashrate: UNAVAILABLE.to_string(),
            last_activity: UNAVAILABLE.to_string(),
        }
    }

    /// Whether the worker has reported a figure since it last stopped.
    pub fn is_available(&self) -> bool {
        self.hashrate != UNAVAILABLE
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::new("")
    }
}

/// Shared, jointly locked [`NodeStatus`].
///
/// Every update replaces the related fields under one write lock, so a reader
/// never sees a hashrate paired with a stale activity stamp.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<NodeStatus>>,
}

impl StatusHandle {
    /// Wraps an initial status.
    pub fn new(status: NodeStatus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(status)),
        }
    }

    /// Copy of the current status.
    pub fn snapshot(&self) -> NodeStatus {
        self.inner.read().clone()
    }

    /// Records a throughput figure stamped with the current local time.
    pub fn record_hashrate(&self, hashrate: impl Into<String>) {
        let stamp = chrono::Local::now().format("%H:%M:%S").to_string();
        let mut status = self.inner.write();
        status.hashrate = hashrate.into();
        status.last_activity = stamp;
    }

    /// Resets the worker-reported fields to [`UNAVAILABLE`].
    pub fn mark_unavailable(&self) {
        let mut status = self.inner.write();
        status.hashrate = UNAVAILABLE.to_string();
        status.last_activity = UNAVAILABLE.to_string();
    }

    /// Replaces the pool endpoint.
    pub fn set_pool_url(&self, pool_url: impl Into<String>) {
        self.inner.write().pool_url = pool_url.into();
    }
}
