//! Player State Dictionary
//!
//! A hierarchical key/value store keyed by `(context, variable)` pairs,
//! with change detection and blocking iteration, plus the tracklist each
//! backend keeps for its local play queue.
//!
//! # Features
//!
//! - **Context/variable addressing**: `("player", "status")`,
//!   `("player/current_time", "time")`
//! - **Change Detection**: events are only emitted when a value changes
//! - **Batches**: the final event of a batch carries the `last` flag
//! - **Typed access**: `Property` maps a Rust type onto one slot
//! - **Tracklist**: splice, advance/back and the five playback modes
//!
//! # Quick Start
//!
//! ```rust
//! use state_store::{PlayerStatus, StateDict};
//!
//! let dict = StateDict::new();
//! dict.watch("player");
//!
//! dict.set_property(&PlayerStatus::Playing);
//! assert_eq!(dict.get_property::<PlayerStatus>(), Some(PlayerStatus::Playing));
//!
//! let event = dict.changes().try_recv().unwrap();
//! assert_eq!(event.variable, "status");
//! ```
//!
//! # Iteration Patterns
//!
//! ```rust,ignore
//! // Blocking iteration (waits for events)
//! for event in dict.changes() {
//!     println!("{}/{} = {}", event.context, event.variable, event.value);
//! }
//!
//! // Non-blocking (processes available events)
//! for event in dict.changes().try_iter() {
//!     println!("Event: {:?}", event);
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! StateDict
//!     │
//!     ├── contexts: BTreeMap<context, ContextVars>
//!     │       │
//!     │       └── ContextVars: BTreeMap<variable, serde_json::Value>
//!     │
//!     ├── watched: contexts (and their sub-contexts) that emit events
//!     │
//!     └── event_channel: mpsc::channel<StateChanged>
//!             │
//!             └── ChangeIterator
//! ```

// Modules
pub mod event;
pub mod iter;
pub mod property;
pub mod store;
pub mod tracklist;
pub mod types;

// Re-exports - Public API
pub use event::StateChanged;
pub use iter::{ChangeIterator, TimeoutIter, TryIter};
pub use property::Property;
pub use store::{ContextVars, StateDict};
pub use tracklist::{id_from_uri, Tracklist, TracklistChanges, TracklistError, PLAYQUEUE_ID};
pub use types::{
    CurrentTime, CurrentTrack, Label, MimeTypes, Mute, PlayerMode, PlayerStatus, Protocols,
    TrackInfo, TracklistCurrent, TracklistTracks, Volume, CURRENT_TIME_CONTEXT, PLAYER_CONTEXT,
    TRACKLIST_CONTEXT,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::event::StateChanged;
    pub use crate::iter::ChangeIterator;
    pub use crate::property::Property;
    pub use crate::store::StateDict;
    pub use crate::tracklist::Tracklist;
    pub use crate::types::{CurrentTime, CurrentTrack, PlayerMode, PlayerStatus, TrackInfo};
}
