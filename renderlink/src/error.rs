use thiserror::Error;

use crate::logging::LoggingError;

#[derive(Error, Debug)]
pub enum RenderlinkError {
    #[error("Discovery error: {0}")]
    Discovery(#[from] renderlink_discovery::DiscoveryError),

    #[error("Backend error: {0}")]
    Backend(#[from] renderlink_backend::BackendError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] renderlink_websocket::WebSocketError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend already connected: {0}")]
    AlreadyConnected(String),

    #[error("Backend not connected: {0}")]
    NotConnected(String),
}

/// Type alias for results that can return a RenderlinkError
pub type Result<T> = std::result::Result<T, RenderlinkError>;
