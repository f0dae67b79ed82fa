//! Aggregate configuration for a renderlink instance

use renderlink_backend::BackendConfig;
use renderlink_discovery::SsdpConfig;
use renderlink_websocket::WebSocketConfig;

use crate::error::RenderlinkError;

/// Configuration for discovery, the backends and the WebSocket bridge
#[derive(Debug, Clone, Default)]
pub struct RenderlinkConfig {
    /// SSDP announcement and search timing
    /// Default: `SsdpConfig::default()`
    pub ssdp: SsdpConfig,

    /// Poll intervals and timeouts shared by all backends
    /// Default: `BackendConfig::default()`
    pub backend: BackendConfig,

    /// Keep-alive and connection limits of the bridge
    /// Default: `WebSocketConfig::default()`
    pub websocket: WebSocketConfig,
}

impl RenderlinkConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Fast bring-up and tight polling, for small networks and tests
    pub fn responsive() -> Self {
        Self {
            ssdp: SsdpConfig::aggressive(),
            backend: BackendConfig::responsive(),
            websocket: WebSocketConfig::strict(),
        }
    }

    /// Fewer announcements and slower polling
    pub fn low_traffic() -> Self {
        Self {
            ssdp: SsdpConfig::quiet(),
            backend: BackendConfig::low_traffic(),
            websocket: WebSocketConfig::relaxed(),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), RenderlinkError> {
        self.ssdp.validate()?;
        self.backend.validate()?;
        self.websocket.validate()?;
        Ok(())
    }

    /// Builder pattern methods for fluent configuration
    pub fn with_ssdp(mut self, ssdp: SsdpConfig) -> Self {
        self.ssdp = ssdp;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_websocket(mut self, websocket: WebSocketConfig) -> Self {
        self.websocket = websocket;
        self
    }
}
