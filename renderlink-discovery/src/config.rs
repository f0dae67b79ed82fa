//! Configuration types for the SSDP engine
//!
//! This module defines the timing policy of the engine: how often local
//! devices are announced, how often the network is searched and how fast
//! queued multicast datagrams drain. Every interval is a `(min, max)` pair
//! from which the engine draws a uniformly random delay.

use std::time::Duration;

use crate::error::DiscoveryError;

/// Configuration for the SsdpEngine
#[derive(Debug, Clone)]
pub struct SsdpConfig {
    /// Number of quickly repeated announcements after a device appears
    /// Default: 3
    pub notify_burst_count: u32,

    /// Delay between announcements during the burst
    /// Default: (1 second, 3 seconds)
    pub notify_burst_interval: (Duration, Duration),

    /// Delay between announcements once the burst is over
    /// Default: (100 seconds, 900 seconds)
    pub notify_steady_interval: (Duration, Duration),

    /// Delay before the first announcement of a new local device
    /// Default: (10 milliseconds, 100 milliseconds)
    pub initial_notify_delay: (Duration, Duration),

    /// Minimum spacing between two multicast datagrams
    /// Default: (10 milliseconds, 100 milliseconds)
    pub multicast_flush_interval: (Duration, Duration),

    /// Delay before the first multicast datagram leaves
    /// Default: (100 milliseconds, 200 milliseconds)
    pub initial_multicast_delay: (Duration, Duration),

    /// Send M-SEARCH requests for remote devices
    /// Default: true
    pub search_enabled: bool,

    /// Number of quickly repeated searches
    /// Default: 3
    pub search_burst_count: u32,

    /// Delay between searches during the burst
    /// Default: (1 second, 3 seconds)
    pub search_burst_interval: (Duration, Duration),

    /// Delay between searches once the burst is over
    /// Default: (500 seconds, 1000 seconds)
    pub search_steady_interval: (Duration, Duration),

    /// MX value of outgoing searches (seconds)
    /// Default: 3
    pub search_mx: u32,

    /// `max-age` announced for local devices (seconds)
    /// Default: 1800
    pub max_age: u32,

    /// TTL of outgoing multicast datagrams
    /// Default: 4
    pub multicast_ttl: u32,

    /// SERVER header of announcements and search replies
    /// Default: "<os>/<arch>, UPnP/1.0, renderlink/<version>"
    pub server_string: String,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            notify_burst_count: 3,
            notify_burst_interval: (Duration::from_secs(1), Duration::from_secs(3)),
            notify_steady_interval: (Duration::from_secs(100), Duration::from_secs(900)),
            initial_notify_delay: (Duration::from_millis(10), Duration::from_millis(100)),
            multicast_flush_interval: (Duration::from_millis(10), Duration::from_millis(100)),
            initial_multicast_delay: (Duration::from_millis(100), Duration::from_millis(200)),
            search_enabled: true,
            search_burst_count: 3,
            search_burst_interval: (Duration::from_secs(1), Duration::from_secs(3)),
            search_steady_interval: (Duration::from_secs(500), Duration::from_secs(1000)),
            search_mx: 3,
            max_age: 1800,
            multicast_ttl: 4,
            server_string: default_server_string(),
        }
    }
}

fn default_server_string() -> String {
    format!(
        "{}/{}, UPnP/1.0, renderlink/{}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        env!("CARGO_PKG_VERSION")
    )
}

impl SsdpConfig {
    /// Create a new SsdpConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an SsdpConfig with a slower steady state, for busy networks
    pub fn quiet() -> Self {
        Self {
            notify_steady_interval: (Duration::from_secs(600), Duration::from_secs(900)),
            search_burst_count: 1,
            search_steady_interval: (Duration::from_secs(900), Duration::from_secs(1800)),
            multicast_flush_interval: (Duration::from_millis(50), Duration::from_millis(150)),
            ..Default::default()
        }
    }

    /// Create an SsdpConfig with fast bring-up, for tests and small networks
    pub fn aggressive() -> Self {
        Self {
            notify_burst_interval: (Duration::from_millis(200), Duration::from_millis(500)),
            notify_steady_interval: (Duration::from_secs(30), Duration::from_secs(60)),
            initial_notify_delay: (Duration::ZERO, Duration::from_millis(10)),
            multicast_flush_interval: (Duration::ZERO, Duration::from_millis(10)),
            initial_multicast_delay: (Duration::ZERO, Duration::from_millis(10)),
            search_burst_interval: (Duration::from_millis(200), Duration::from_millis(500)),
            search_steady_interval: (Duration::from_secs(30), Duration::from_secs(60)),
            search_mx: 1,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        let ranges = [
            ("notify burst interval", self.notify_burst_interval),
            ("notify steady interval", self.notify_steady_interval),
            ("initial notify delay", self.initial_notify_delay),
            ("multicast flush interval", self.multicast_flush_interval),
            ("initial multicast delay", self.initial_multicast_delay),
            ("search burst interval", self.search_burst_interval),
            ("search steady interval", self.search_steady_interval),
        ];
        for (name, (min, max)) in ranges {
            if min > max {
                return Err(DiscoveryError::ConfigError(format!(
                    "Invalid {}: min must not exceed max",
                    name
                )));
            }
        }

        if self.max_age == 0 {
            return Err(DiscoveryError::ConfigError(
                "max-age must be greater than 0".to_string(),
            ));
        }

        if !(1..=5).contains(&self.search_mx) {
            return Err(DiscoveryError::ConfigError(
                "Search MX must be between 1 and 5".to_string(),
            ));
        }

        if self.multicast_ttl == 0 || self.multicast_ttl > 255 {
            return Err(DiscoveryError::ConfigError(
                "Multicast TTL must be between 1 and 255".to_string(),
            ));
        }

        if self.server_string.trim().is_empty() {
            return Err(DiscoveryError::ConfigError(
                "Server string must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_notify_intervals(
        mut self,
        burst: (Duration, Duration),
        steady: (Duration, Duration),
    ) -> Self {
        self.notify_burst_interval = burst;
        self.notify_steady_interval = steady;
        self
    }

    pub fn with_search_intervals(
        mut self,
        burst: (Duration, Duration),
        steady: (Duration, Duration),
    ) -> Self {
        self.search_burst_interval = burst;
        self.search_steady_interval = steady;
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn with_multicast_ttl(mut self, ttl: u32) -> Self {
        self.multicast_ttl = ttl;
        self
    }

    pub fn with_server_string(mut self, server: impl Into<String>) -> Self {
        self.server_string = server.into();
        self
    }
}
