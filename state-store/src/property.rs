//! Property trait for typed state variables
//!
//! A `Property` names one `(context, variable)` slot in a [`StateDict`]
//! and the Rust type stored there. The dictionary itself holds
//! `serde_json::Value`s, so a property is converted on the way in and
//! out.
//!
//! # Example
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use state_store::Property;
//!
//! #[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
//! pub struct Volume(pub f64);
//!
//! impl Property for Volume {
//!     const CONTEXT: &'static str = "player";
//!     const KEY: &'static str = "volume";
//! }
//! ```
//!
//! [`StateDict`]: crate::StateDict

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Marker trait for typed state variables
///
/// Properties must be:
/// - Serialize + DeserializeOwned: values are stored as JSON
/// - PartialEq: for change detection
/// - Clone + Send + Sync + 'static: to cross adapter threads
pub trait Property: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {
    /// Context path the variable lives under, e.g. `"player"` or
    /// `"player/current_time"`
    const CONTEXT: &'static str;

    /// Variable name inside the context
    const KEY: &'static str;
}
