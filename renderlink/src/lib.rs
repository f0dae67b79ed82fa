//! # renderlink
//!
//! Find media renderers and servers on the local network, drive MPD,
//! MPRIS2 and UPnP players through one command set, and share their state
//! with remote interfaces over WebSocket.
//!
//! ```rust,no_run
//! use std::net::TcpListener;
//! use std::time::{Duration, Instant};
//!
//! use renderlink::{logging, Renderlink, RenderlinkConfig, ServerInfo};
//!
//! fn main() -> Result<(), renderlink::RenderlinkError> {
//!     logging::init_logging_from_env()?;
//!
//!     let mut link = Renderlink::new(RenderlinkConfig::default())?;
//!     link.connect("mpd://localhost:6600")?;
//!     link.serve(TcpListener::bind("0.0.0.0:8888")?, Some("renderer"), ServerInfo::new("Living Room"))?;
//!
//!     link.run_until(Instant::now() + Duration::from_secs(60));
//!     link.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! renderlink (driver, logging, config)
//!     ↓
//! renderlink-discovery (SSDP)   renderlink-backend (MPD / MPRIS2 / UPnP)   renderlink-websocket
//!                                   ↓
//!                               state-store, soap-client
//!                                   ↓
//!                               http-codec
//! ```
//!
//! Nothing blocks: the driver polls every component from one thread, and
//! [`Renderlink::run_until`] sleeps only after a tick that did no work.

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;

pub use config::RenderlinkConfig;
pub use driver::Renderlink;
pub use error::{RenderlinkError, Result};
pub use logging::{init_logging, init_logging_from_env, LoggingError, LoggingMode};

pub use http_codec;
pub use renderlink_backend as backend;
pub use renderlink_discovery as discovery;
pub use renderlink_websocket as websocket;
pub use soap_client;
pub use state_store;

pub use renderlink_backend::{BackendCommand, BackendConfig, BackendHandle, CommandSender};
pub use renderlink_discovery::{Resource, ResourceClass, ResourceEvent, ResourceRegistry, SsdpConfig};
pub use renderlink_websocket::{ServerInfo, WebSocketConfig};
pub use state_store::StateDict;
