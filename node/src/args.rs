//! Command-line arguments and configuration layering.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use p2pminer_config::{LogFormat, NodeConfig};
use p2pminer_core::PeerAddress;

/// Command-line arguments for the miner node
#[derive(Parser, Debug, Clone)]
#[command(
    name = "p2pminer-node",
    version = env!("CARGO_PKG_VERSION"),
    about = "Peer-to-peer miner node",
    long_about = "Runs one overlay node: accepts peers, gossips peer lists, relays transactions and blocks, supervises the external mining worker and reads control commands from stdin."
)]
pub struct CliArgs {
    /// Listening port, also the node's identity on the overlay
    #[arg(value_name = "PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Wallet address or worker identity
    #[arg(value_name = "WORKER_IDENTITY")]
    pub worker_identity: String,

    /// Specifies the config file
    #[arg(short = 'c', long = "config", value_name = "FILE", env = "P2PMINER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host the listener binds to
    #[arg(long = "bind", value_name = "HOST")]
    pub bind: Option<String>,

    /// Seed peer as HOST:PORT; repeat to list several. Replaces the configured seeds
    #[arg(long = "seed", value_name = "HOST:PORT")]
    pub seeds: Vec<PeerAddress>,

    /// Path of the worker binary
    #[arg(long = "worker-binary", value_name = "FILE")]
    pub worker_binary: Option<PathBuf>,

    /// Pool endpoint passed to the worker
    #[arg(long = "pool-url", value_name = "HOST:PORT")]
    pub pool_url: Option<String>,

    /// Do not start the worker at startup
    #[arg(long = "no-worker")]
    pub no_worker: bool,

    /// Log level
    #[arg(long = "log-level", value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Log output format (pretty or json)
    #[arg(long = "log-format", value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// Log level enumeration
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Trace level logging
    Trace,
    /// Debug level logging
    Debug,
    /// Info level logging
    Info,
    /// Warning level logging
    Warn,
    /// Error level logging
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl CliArgs {
    /// Builds the effective configuration: defaults, then the config file,
    /// then command-line overrides.
    pub fn load_config(&self) -> Result<NodeConfig> {
        let config = match &self.config {
            Some(path) => NodeConfig::from_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => NodeConfig::default(),
        };
        let config = self.apply(config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply(&self, config: NodeConfig) -> NodeConfig {
        let mut config = config
            .with_port(self.port)
            .with_wallet_address(self.worker_identity.clone());

        if let Some(bind) = &self.bind {
            config.network.bind_host = bind.clone();
        }
        if !self.seeds.is_empty() {
            config = config.with_seeds(self.seeds.clone());
        }
        if let Some(binary) = &self.worker_binary {
            config.worker.binary = binary.clone();
        }
        if let Some(pool_url) = &self.pool_url {
            config.worker.pool_url = pool_url.clone();
        }
        if self.no_worker {
            config.worker.autostart = false;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level.as_str().to_string();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_positional_arguments() {
        let args = CliArgs::try_parse_from(["p2pminer-node", "8001", "wallet-abc"]).unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.network.port, 8001);
        assert_eq!(config.worker.wallet_address, "wallet-abc");
        assert!(config.worker.autostart);
    }

    #[test]
    fn test_missing_arguments_is_usage_error() {
        let err = CliArgs::try_parse_from(["p2pminer-node", "8001"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);

        assert!(CliArgs::try_parse_from(["p2pminer-node", "0", "w"]).is_err());
        assert!(CliArgs::try_parse_from(["p2pminer-node", "port", "w"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "p2pminer-node",
            "8002",
            "wallet",
            "--bind",
            "127.0.0.1",
            "--seed",
            "127.0.0.1:8000",
            "--seed",
            "127.0.0.1:8001",
            "--pool-url",
            "pool.example:3333",
            "--no-worker",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])
        .unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.network.listen_address(), "127.0.0.1:8002");
        assert_eq!(
            config.network.seeds,
            vec![PeerAddress::new("127.0.0.1", 8000), PeerAddress::new("127.0.0.1", 8001)]
        );
        assert_eq!(config.worker.pool_url, "pool.example:3333");
        assert!(!config.worker.autostart);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_file_then_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[network]\nport = 9000\nreply_timeout_secs = 2\n\n[worker]\ntls = false"
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let args =
            CliArgs::try_parse_from(["p2pminer-node", "8005", "wallet", "--config", &path]).unwrap();
        let config = args.load_config().unwrap();

        assert_eq!(config.network.port, 8005);
        assert_eq!(config.network.reply_timeout_secs, 2);
        assert!(!config.worker.tls);
    }
}
