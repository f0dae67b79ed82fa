//! SSDP discovery and announcement for media renderers and servers
//!
//! This crate keeps a [`ResourceRegistry`] of local and remote devices and
//! runs an [`SsdpEngine`] that announces the local ones, answers searches
//! for them and learns remote ones from NOTIFY messages and search
//! responses.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::{Duration, Instant};
//! use renderlink_discovery::{
//!     Resource, ResourceClass, ResourceEvent, ResourceRegistry, SsdpConfig, SsdpEngine, UdpTransport,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SsdpConfig::default();
//! let registry = ResourceRegistry::new();
//! let events = registry.events();
//!
//! registry.add_local(
//!     Resource::new("upnp-renderer://192.168.1.5:8080/upnp/desc.xml", ResourceClass::Renderer)
//!         .with_hash("0123abcd"),
//! );
//!
//! let transport = UdpTransport::bind(&config)?;
//! let mut engine = SsdpEngine::new(transport, registry, config)?;
//!
//! loop {
//!     if engine.update(Instant::now()) == 0 {
//!         std::thread::sleep(Duration::from_millis(50));
//!     }
//!     for event in events.try_iter() {
//!         if let ResourceEvent::RemoteAdded(resource) = event {
//!             println!("found {}", resource.uri);
//!         }
//!     }
//! }
//! # }
//! ```

mod config;
mod error;
pub mod message;
pub mod registry;
pub mod ssdp;
pub mod transport;

pub use config::SsdpConfig;
pub use error::{DiscoveryError, Result};
pub use message::{uri_to_uuid, DeviceKind, LocalDevice, Target};
pub use registry::{
    Resource, ResourceClass, ResourceEvent, ResourceEvents, ResourcePriority, ResourceRegistry,
};
pub use ssdp::{AnnounceState, Announcement, SsdpEngine, UnicastEntry};
pub use transport::{multicast_group, SsdpTransport, UdpTransport, SSDP_MULTICAST_ADDR, SSDP_PORT};
