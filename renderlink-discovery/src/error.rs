//! Error types for the discovery system.

use std::fmt;

/// Error type for discovery operations.
///
/// Protocol problems inside received datagrams never surface here; those
/// datagrams are dropped. These errors come from setting up sockets and
/// from invalid configuration.
#[derive(Debug)]
pub enum DiscoveryError {
    /// Network-related errors (socket creation, multicast membership, sends)
    NetworkError(String),
    /// Parsing errors (malformed datagram passed to a public parser)
    ParseError(String),
    /// Invalid configuration values
    ConfigError(String),
    /// A URI whose scheme cannot be announced over SSDP
    UnsupportedUri(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DiscoveryError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DiscoveryError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            DiscoveryError::UnsupportedUri(uri) => write!(f, "Unsupported URI: {}", uri),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::NetworkError(err.to_string())
    }
}

/// Convenience Result type alias for discovery operations.
///
/// Equivalent to `std::result::Result<T, DiscoveryError>`.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
