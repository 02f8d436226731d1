use thiserror::Error;

/// Failure to parse a `host:port` peer address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// No `:` separator between host and port.
    #[error("missing port in peer address '{0}'")]
    MissingPort(String),

    /// The host part is empty.
    #[error("empty host in peer address '{0}'")]
    EmptyHost(String),

    /// The port is not a number in `1..=65535`.
    #[error("invalid port in peer address '{0}'")]
    InvalidPort(String),
}

/// Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, AddressParseError>;
