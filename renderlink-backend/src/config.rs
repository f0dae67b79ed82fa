//! Configuration types for player backends
//!
//! Poll intervals, timeouts and the end-of-track thresholds used by the
//! MPD, MPRIS2 and UPnP adapters, plus the idle sleep of the driver loop.

use std::time::Duration;

use crate::error::BackendError;

/// Configuration shared by every backend
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Interval between MPD `status` polls
    /// Default: 1 second
    pub mpd_poll_interval: Duration,

    /// Connect and I/O timeout of the MPD socket
    /// Default: 2 seconds
    pub mpd_timeout: Duration,

    /// Interval between MPRIS2 position polls
    /// Default: 500 milliseconds
    pub mpris2_poll_interval: Duration,

    /// A stop this close to the end of the track counts as end of file
    /// Default: 10 seconds
    pub mpris2_eof_tolerance: Duration,

    /// Interval between UPnP transport and position polls
    /// Default: 1 second
    pub upnp_poll_interval: Duration,

    /// Remaining time below which the next URI is queued on the renderer
    /// Default: 10 seconds
    pub upnp_set_next_threshold: Duration,

    /// Remaining time below which a stop is treated as the track ending
    /// Default: 3 seconds
    pub upnp_finishing_threshold: Duration,

    /// TCP connect timeout of SOAP requests
    /// Default: 5 seconds
    pub soap_connect_timeout: Duration,

    /// Read timeout of SOAP requests
    /// Default: 10 seconds
    pub soap_read_timeout: Duration,

    /// Sleep of the driver loop after a tick that did no work
    /// Default: 50 milliseconds
    pub idle_sleep: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mpd_poll_interval: Duration::from_secs(1),
            mpd_timeout: Duration::from_secs(2),
            mpris2_poll_interval: Duration::from_millis(500),
            mpris2_eof_tolerance: Duration::from_secs(10),
            upnp_poll_interval: Duration::from_secs(1),
            upnp_set_next_threshold: Duration::from_secs(10),
            upnp_finishing_threshold: Duration::from_secs(3),
            soap_connect_timeout: Duration::from_secs(5),
            soap_read_timeout: Duration::from_secs(10),
            idle_sleep: Duration::from_millis(50),
        }
    }
}

impl BackendConfig {
    /// Create a new BackendConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a BackendConfig that polls players more often
    pub fn responsive() -> Self {
        Self {
            mpd_poll_interval: Duration::from_millis(250),
            mpris2_poll_interval: Duration::from_millis(250),
            upnp_poll_interval: Duration::from_millis(500),
            idle_sleep: Duration::from_millis(10),
            ..Default::default()
        }
    }

    /// Create a BackendConfig that keeps network chatter low
    pub fn low_traffic() -> Self {
        Self {
            mpd_poll_interval: Duration::from_secs(2),
            mpris2_poll_interval: Duration::from_secs(1),
            upnp_poll_interval: Duration::from_secs(2),
            upnp_set_next_threshold: Duration::from_secs(15),
            idle_sleep: Duration::from_millis(100),
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), BackendError> {
        let non_zero = [
            ("mpd_poll_interval", self.mpd_poll_interval),
            ("mpd_timeout", self.mpd_timeout),
            ("mpris2_poll_interval", self.mpris2_poll_interval),
            ("upnp_poll_interval", self.upnp_poll_interval),
            ("soap_connect_timeout", self.soap_connect_timeout),
            ("soap_read_timeout", self.soap_read_timeout),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(BackendError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.upnp_finishing_threshold >= self.upnp_set_next_threshold {
            return Err(BackendError::Config(
                "upnp_finishing_threshold must be below upnp_set_next_threshold".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration
    pub fn with_mpd_poll_interval(mut self, interval: Duration) -> Self {
        self.mpd_poll_interval = interval;
        self
    }

    pub fn with_mpd_timeout(mut self, timeout: Duration) -> Self {
        self.mpd_timeout = timeout;
        self
    }

    pub fn with_mpris2_poll_interval(mut self, interval: Duration) -> Self {
        self.mpris2_poll_interval = interval;
        self
    }

    pub fn with_upnp_poll_interval(mut self, interval: Duration) -> Self {
        self.upnp_poll_interval = interval;
        self
    }

    pub fn with_upnp_thresholds(mut self, set_next: Duration, finishing: Duration) -> Self {
        self.upnp_set_next_threshold = set_next;
        self.upnp_finishing_threshold = finishing;
        self
    }

    pub fn with_soap_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.soap_connect_timeout = connect;
        self.soap_read_timeout = read;
        self
    }

    pub fn with_idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep = sleep;
        self
    }
}
