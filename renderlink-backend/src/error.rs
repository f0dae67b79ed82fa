//! Error types for player backends

use soap_client::SoapError;
use thiserror::Error;

/// Errors that end a backend, or reject its creation
///
/// Protocol-level complaints from a player (an MPD `ACK`, a SOAP fault
/// for one action) are logged and swallowed by the adapters. What comes
/// back as `Err` means the player is gone or unusable, and the supervisor
/// should drop the adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The player answered with something that is not its protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// SOAP call or description fetch failure (UPnP renderers)
    #[error("SOAP error: {0}")]
    Soap(#[from] SoapError),

    /// D-Bus call failure (MPRIS2 players)
    #[error("Bus error: {0}")]
    Bus(String),

    /// No backend handles this URI scheme
    #[error("Unsupported URI: {0}")]
    UnsupportedUri(String),

    /// The player closed the connection
    #[error("Connection closed by player")]
    Disconnected,

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether the error is a rejected action rather than a lost player
    pub fn is_fault(&self) -> bool {
        matches!(self, BackendError::Soap(SoapError::Fault(_)))
    }
}

/// Type alias for results that can return a BackendError
pub type Result<T> = std::result::Result<T, BackendError>;

/// Log and swallow faults, keep everything else
pub(crate) fn tolerate_fault<T>(result: Result<T>, action: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fault() => {
            tracing::warn!("{} rejected by player: {}", action, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
