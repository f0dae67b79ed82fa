//! Player backends synchronized through a state dictionary
//!
//! Each backend adapts one kind of media player to a common command set
//! and publishes what the player does into a [`StateDict`]. Backends own
//! a local [`Tracklist`] and take over playback when the player reports
//! a URI they loaded; otherwise they mirror the player read-only.
//!
//! # Backends
//!
//! - **MPD** (`mpd://host:port`): line protocol over TCP
//! - **MPRIS2** (`mpris2://name`): D-Bus session bus, `dbus` feature
//! - **UPnP renderers** (`upnp-renderer://host:port/description.xml`): SOAP
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use renderlink_backend::{spawn_backend, BackendCommand, BackendConfig, BackendHandle};
//! use state_store::StateDict;
//!
//! let config = BackendConfig::default();
//! let handle = BackendHandle::create("mpd://localhost:6600", &config, StateDict::new())?;
//! let sender = handle.sender();
//! let worker = spawn_backend(handle, config.idle_sleep);
//!
//! sender.send(BackendCommand::Play)?;
//! sender.send(BackendCommand::Quit)?;
//! worker.join().unwrap()?;
//! ```
//!
//! [`StateDict`]: state_store::StateDict
//! [`Tracklist`]: state_store::Tracklist

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod handle;
pub mod mpd;
pub mod mpris2;
pub mod upnp;

pub use backend::{create_backend, Backend, BackendKind};
pub use command::BackendCommand;
pub use config::BackendConfig;
pub use error::{BackendError, Result};
pub use handle::{run, spawn_backend, BackendHandle, CommandSender};
