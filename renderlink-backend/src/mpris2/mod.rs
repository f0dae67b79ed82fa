//! MPRIS2 backend for desktop media players
//!
//! The adapter logic is written against the `PlayerBus` trait; the D-Bus
//! implementation is compiled with the `dbus` feature.

pub mod backend;
pub mod bus;
#[cfg(feature = "dbus")]
pub mod zbus_bus;

pub use backend::Mpris2Backend;
pub use bus::{Capabilities, Mpris2Metadata, PlaybackStatus, PlayerBus, PropertyChange};
#[cfg(feature = "dbus")]
pub use zbus_bus::ZbusPlayerBus;
