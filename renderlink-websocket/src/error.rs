//! Error types for WebSocket connections

use http_codec::CodecError;
use thiserror::Error;

/// Errors that end one connection
///
/// Nothing here is fatal beyond the connection it came from. A server
/// context drops the failing peer and keeps serving the others.
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame violating RFC 6455 (reserved bits, unmasked client frame, bad opcode)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Upgrade request or response rejected
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed HTTP head during the handshake
    #[error("HTTP error: {0}")]
    Http(#[from] CodecError),

    /// Text frame that is not a JSON message
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unusable `ws://` URL
    #[error("Invalid URL: {0}")]
    Url(String),

    /// No pong for the last ping within the timeout
    #[error("Ping timeout")]
    PingTimeout,

    /// The peer hung up or the connection was closed
    #[error("Connection closed")]
    Closed,

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Type alias for results that can return a WebSocketError
pub type Result<T> = std::result::Result<T, WebSocketError>;
