//! p2pminer configuration
//!
//! Configuration types for the node, their defaults, TOML loading and
//! validation. Sections map one to one onto the TOML tables `[network]`,
//! `[worker]`, `[pool_stats]` and `[logging]`; every field is optional in the
//! file and falls back to the defaults below.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use p2pminer_core::PeerAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8000;
/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
/// Static seed list of the reference deployment
pub const DEFAULT_SEEDS: &[(&str, u16)] = &[("localhost", 8000), ("localhost", 8001), ("localhost", 8002)];
/// Bound on outbound connect attempts
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
/// Idle read bound on a connection before it is probed
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 600;
/// Bound on draining replies after a one-shot send
pub const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 5;
/// Largest accepted envelope line in bytes
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;
/// Capacity of the event channel
pub const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Default mining pool endpoint
pub const DEFAULT_POOL_URL: &str = "pool.supportxmr.com:443";
/// Grace period between terminate and kill when stopping the worker
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 5;

/// Default base URL of the pool statistics API
pub const DEFAULT_POOL_API_BASE: &str = "https://supportxmr.com/api";
/// Default bound on one pool statistics request
pub const DEFAULT_POOL_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`NodeConfig`]
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Overlay network
    pub network: NetworkConfig,
    /// External worker process
    pub worker: WorkerConfig,
    /// Pool statistics API
    pub pool_stats: PoolStatsConfig,
    /// Logging
    pub logging: LoggingConfig,
}

/// Overlay network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host the listener binds to
    pub bind_host: String,
    /// Listening port, also the node's identity
    pub port: u16,
    /// Peers dialed at startup
    pub seeds: Vec<PeerAddress>,
    /// Outbound connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle read timeout in seconds
    pub read_timeout_secs: u64,
    /// Reply drain timeout after a one-shot send, in seconds
    pub reply_timeout_secs: u64,
    /// Largest accepted envelope line in bytes
    pub max_frame_len: usize,
    /// Capacity of the event channel
    pub event_buffer: usize,
}

/// External worker process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Path of the worker binary
    pub binary: PathBuf,
    /// Pool endpoint passed with `-o`
    pub pool_url: String,
    /// Wallet address or worker identity passed with `-u`
    pub wallet_address: String,
    /// Pass `--tls`
    pub tls: bool,
    /// Pass `-k`
    pub keepalive: bool,
    /// Appended to the generated arguments
    pub extra_args: Vec<String>,
    /// Seconds between terminate and kill
    pub stop_timeout_secs: u64,
    /// Start the worker when the node starts
    pub autostart: bool,
}

/// Pool statistics API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolStatsConfig {
    /// Base URL; `/miner/{wallet}/stats` is appended
    pub api_base: String,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            seeds: DEFAULT_SEEDS
                .iter()
                .map(|&(host, port)| PeerAddress::new(host, port))
                .collect(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            reply_timeout_secs: DEFAULT_REPLY_TIMEOUT_SECS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            binary: default_worker_binary(),
            pool_url: DEFAULT_POOL_URL.to_string(),
            wallet_address: String::new(),
            tls: true,
            keepalive: true,
            extra_args: Vec::new(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            autostart: true,
        }
    }
}

impl Default for PoolStatsConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_POOL_API_BASE.to_string(),
            request_timeout_secs: DEFAULT_POOL_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// `xmrig/xmrig` next to the running executable.
pub fn default_worker_binary() -> PathBuf {
    let name = if cfg!(windows) { "xmrig.exe" } else { "xmrig" };
    let base = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    base.join("xmrig").join(name)
}

impl NodeConfig {
    /// Creates the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses a configuration from TOML text
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Sets the listening port
    pub fn with_port(mut self, port: u16) -> Self {
        self.network.port = port;
        self
    }

    /// Sets the wallet address or worker identity
    pub fn with_wallet_address(mut self, wallet: impl Into<String>) -> Self {
        self.worker.wallet_address = wallet.into();
        self
    }

    /// Replaces the seed list
    pub fn with_seeds(mut self, seeds: Vec<PeerAddress>) -> Self {
        self.network.seeds = seeds;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        self.network.validate()?;
        self.worker.validate()?;
        self.pool_stats.validate()
    }
}

impl NetworkConfig {
    /// Outbound connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Idle read timeout
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Reply drain timeout
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    /// `bind_host:port`
    pub fn listen_address(&self) -> String {
        if self.bind_host.contains(':') {
            format!("[{}]:{}", self.bind_host, self.port)
        } else {
            format!("{}:{}", self.bind_host, self.port)
        }
    }

    /// Validates the network section
    pub fn validate(&self) -> ConfigResult<()> {
        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::invalid("network.bind_host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid(
                "network.port",
                "a fixed port is required, it is the node's identity",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "network.connect_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "network.read_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.reply_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "network.reply_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.max_frame_len == 0 {
            return Err(ConfigError::invalid(
                "network.max_frame_len",
                "must be greater than 0",
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::invalid(
                "network.event_buffer",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl WorkerConfig {
    /// Grace period between terminate and kill
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Validates the worker section
    pub fn validate(&self) -> ConfigResult<()> {
        if self.wallet_address.trim().is_empty() {
            return Err(ConfigError::invalid(
                "worker.wallet_address",
                "a wallet address or worker identity is required",
            ));
        }
        if self.pool_url.trim().is_empty() {
            return Err(ConfigError::invalid("worker.pool_url", "must not be empty"));
        }
        Ok(())
    }
}

impl PoolStatsConfig {
    /// Request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validates the pool statistics section
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "pool_stats.api_base",
                format!("'{}' is not an http(s) URL", self.api_base),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "pool_stats.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}
