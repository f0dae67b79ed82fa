//! UPnP AV MediaRenderer backend
//!
//! Renderers are controlled through SOAP actions on their AVTransport and
//! RenderingControl services. State comes from polling, or from events
//! pushed into the adapter's queue.

pub mod backend;
pub mod control;
pub mod didl;
pub mod time;

pub use backend::{UpnpBackend, UpnpEvent, UpnpService};
pub use control::{parse_protocol_info, PositionInfo, RendererCapabilities, SoapUpnpControl, UpnpControl};
pub use didl::{track_from_didl, track_to_didl, DidlLite};
pub use time::{format_time, parse_time};
