//! Error types for the SOAP client

use thiserror::Error;

/// Errors from SOAP calls and description fetches
#[derive(Debug, Error)]
pub enum SoapError {
    /// Connection, timeout or HTTP status failure
    #[error("network error: {0}")]
    Network(String),

    /// Malformed XML or a document missing required elements
    #[error("parse error: {0}")]
    Parse(String),

    /// UPnP error code from a SOAP fault (500 when the fault has none)
    #[error("SOAP fault: UPnP error {0}")]
    Fault(u16),
}

impl SoapError {
    /// Whether the device is unreachable, as opposed to rejecting a call
    pub fn is_network(&self) -> bool {
        matches!(self, SoapError::Network(_))
    }
}
