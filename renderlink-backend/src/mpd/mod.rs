//! Music Player Daemon backend
//!
//! MPD speaks a line protocol over TCP: one command per line, answered by
//! `key: value` lines and a final `OK`, or a single `ACK` line on error.

pub mod backend;
pub mod connection;
pub mod idmap;
pub mod status;

pub use backend::MpdBackend;
pub use connection::{execute, MpdConnection, MpdReply, TcpMpdConnection};
pub use idmap::IdMap;
pub use status::{flags_for_mode, mode_from_flags, MpdStatus};
