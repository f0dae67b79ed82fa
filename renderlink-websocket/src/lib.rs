//! WebSocket transport for renderlink state messages
//!
//! RFC 6455 framing over non-blocking sockets, in both roles. Remote user
//! interfaces connect to a [`ServerContext`] to receive the same JSON
//! messages a local interface sees, and send commands back; a renderlink
//! instance can also [`connect`] to another one as a client.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::net::TcpListener;
//! use std::time::Instant;
//!
//! use renderlink_websocket::{ServerContext, ServerInfo, WebSocketConfig};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("0.0.0.0:8888")?;
//! listener.set_nonblocking(true)?;
//!
//! let mut server = ServerContext::new(Some("renderer"), ServerInfo::new("Kitchen"), WebSocketConfig::default());
//! loop {
//!     let now = Instant::now();
//!     server.accept_from(&listener, now)?;
//!     server.broadcast(&json!({"cmd": "ping"}));
//!     server.iteration(now);
//!     for msg in server.take_messages() {
//!         println!("{}", msg);
//!     }
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod server;

pub use client::{connect, connect_with_config};
pub use config::{WebSocketConfig, DEFAULT_SUBPROTOCOL};
pub use connection::{is_quit, Connection, ConnectionState, Role};
pub use error::{Result, WebSocketError};
pub use frame::{encode_frame, DecodeStatus, Frame, FrameDecoder, Opcode};
pub use server::{ws_path, Icon, ServerContext, ServerInfo, INFO_PATH};
