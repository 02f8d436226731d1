use std::fmt;

/// Administrative directive issued by the control surface, either as a line
/// on stdin or inside an `internal_command` message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    /// Stop the node
    Stop,
    /// Start the external worker process
    StartWorker,
    /// Stop the external worker process
    StopWorker,
    /// Report the peer registry
    ListPeers,
    /// Ask every known peer for its pool information
    RequestPoolInfo,
    /// Fetch public statistics for this worker from the pool
    PoolStats,
    /// Anything else; reported and ignored
    Unknown(String),
}

impl Command {
    /// Parses one control line. Blank lines yield `None`.
    ///
    /// Underscore spellings are accepted as aliases.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let command = match line {
            "stop" => Command::Stop,
            "start-worker" | "start_xmrig" => Command::StartWorker,
            "stop-worker" | "stop_xmrig" => Command::StopWorker,
            "list-peers" | "peers" => Command::ListPeers,
            "request-pool-info" | "request_pool_info" => Command::RequestPoolInfo,
            "pool-stats" | "pool_stats" => Command::PoolStats,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }

    /// Canonical spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Command::Stop => "stop",
            Command::StartWorker => "start-worker",
            Command::StopWorker => "stop-worker",
            Command::ListPeers => "list-peers",
            Command::RequestPoolInfo => "request-pool-info",
            Command::PoolStats => "pool-stats",
            Command::Unknown(raw) => raw,
        }
    }

    /// Whether this command ends the control loop.
    pub fn is_stop(&self) -> bool {
        matches!(self, Command::Stop)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
