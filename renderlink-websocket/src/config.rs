//! Configuration types for WebSocket connections and the server context

use std::time::Duration;

use crate::error::WebSocketError;

/// Subprotocol spoken on every connection
pub const DEFAULT_SUBPROTOCOL: &str = "json";

/// Configuration for WebSocket connections
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Interval between keep-alive pings sent by the server side
    /// Default: 2 seconds
    pub ping_interval: Duration,

    /// A ping unanswered for this long kills the connection
    /// Default: 10 seconds
    pub ping_timeout: Duration,

    /// Maximum number of connections a server context accepts
    /// Default: 10
    pub max_connections: usize,

    /// TCP connect and handshake timeout
    /// Default: 30 seconds
    pub handshake_timeout: Duration,

    /// Value of `Sec-WebSocket-Protocol`
    /// Default: "json"
    pub subprotocol: String,

    /// Largest message accepted from a peer, in bytes
    /// Default: 16 MiB
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(2),
            ping_timeout: Duration::from_secs(10),
            max_connections: 10,
            handshake_timeout: Duration::from_secs(30),
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            max_message_size: 16 << 20,
        }
    }
}

impl WebSocketConfig {
    /// Create a new WebSocketConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a WebSocketConfig that notices dead peers quickly
    pub fn strict() -> Self {
        Self {
            ping_interval: Duration::from_secs(1),
            ping_timeout: Duration::from_secs(4),
            handshake_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    /// Create a WebSocketConfig for slow or sleepy clients
    pub fn relaxed() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(60),
            max_connections: 32,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), WebSocketError> {
        if self.ping_interval.is_zero() {
            return Err(WebSocketError::Config("ping_interval must be greater than 0".to_string()));
        }

        if self.ping_timeout <= self.ping_interval {
            return Err(WebSocketError::Config(
                "ping_timeout must be longer than ping_interval".to_string(),
            ));
        }

        if self.max_connections == 0 {
            return Err(WebSocketError::Config("max_connections must be greater than 0".to_string()));
        }

        if self.handshake_timeout.is_zero() {
            return Err(WebSocketError::Config("handshake_timeout must be greater than 0".to_string()));
        }

        if self.subprotocol.trim().is_empty() {
            return Err(WebSocketError::Config("subprotocol must not be empty".to_string()));
        }

        if self.max_message_size == 0 {
            return Err(WebSocketError::Config("max_message_size must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = protocol.into();
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WebSocketConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(2));
        assert_eq!(config.ping_timeout, Duration::from_secs(10));
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.subprotocol, "json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = WebSocketConfig::default().with_ping_timeout(Duration::from_secs(1));
        assert!(config.validate().is_err());

        let config = WebSocketConfig::default().with_max_connections(0);
        assert!(config.validate().is_err());

        let config = WebSocketConfig::default().with_subprotocol(" ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_presets() {
        let strict = WebSocketConfig::strict();
        assert!(strict.ping_timeout < WebSocketConfig::default().ping_timeout);
        assert!(strict.validate().is_ok());

        let relaxed = WebSocketConfig::relaxed();
        assert!(relaxed.max_connections > 10);
        assert!(relaxed.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = WebSocketConfig::new()
            .with_ping_interval(Duration::from_secs(3))
            .with_ping_timeout(Duration::from_secs(12))
            .with_max_connections(4)
            .with_handshake_timeout(Duration::from_secs(8))
            .with_subprotocol("json")
            .with_max_message_size(1024);

        assert_eq!(config.ping_interval, Duration::from_secs(3));
        assert_eq!(config.ping_timeout, Duration::from_secs(12));
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.handshake_timeout, Duration::from_secs(8));
        assert_eq!(config.max_message_size, 1024);
        assert!(config.validate().is_ok());
    }
}
