//! Commands accepted by every backend
//!
//! The wire form is a JSON object tagged by `cmd`, for example
//! `{"cmd":"seek","time":42.0}` or `{"cmd":"set_volume","value":0.5}`.

use serde::{Deserialize, Serialize};
use state_store::{Mute, PlayerMode, StateDict, TrackInfo, Volume};

/// A request for a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BackendCommand {
    Play,
    /// Toggles between playing and paused
    Pause,
    Stop,
    Next,
    Prev,
    /// Absolute position in seconds
    Seek { time: f64 },
    /// Position as a fraction of the track duration
    SeekPercentage { value: f64 },
    /// Volume in `0.0..=1.0`
    SetVolume { value: f64 },
    /// Relative volume change
    AddVolume { value: f64 },
    SetMute { value: bool },
    ToggleMute,
    SetMode { mode: PlayerMode },
    ToggleMode,
    /// Select a tracklist entry by id without starting it
    SetCurrentTrack { id: String },
    /// Select a tracklist entry by id and play it
    PlayById { id: String },
    /// Replace `del` entries at `idx` with `tracks`; `None` appends / deletes to the end
    Splice {
        #[serde(default)]
        idx: Option<usize>,
        #[serde(default)]
        del: Option<usize>,
        #[serde(default)]
        tracks: Vec<TrackInfo>,
    },
    /// Replace the whole tracklist with one track
    SetTrack { track: TrackInfo },
    /// Append a track, make it current and optionally play it
    SetLocation {
        track: TrackInfo,
        #[serde(default)]
        play: bool,
    },
    Quit,
}

impl BackendCommand {
    /// `SetLocation` for a bare URI
    pub fn set_location(uri: impl Into<String>, play: bool) -> Self {
        BackendCommand::SetLocation {
            track: TrackInfo::new("", uri),
            play,
        }
    }

    /// Parse the JSON form of a command
    pub fn from_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Turn relative commands into absolute ones using the published state
    ///
    /// `AddVolume` becomes a clamped `SetVolume`, `ToggleMute` a `SetMute`
    /// and `ToggleMode` a `SetMode` with the following mode. Everything
    /// else is returned unchanged.
    pub fn resolve(self, state: &StateDict) -> Self {
        match self {
            BackendCommand::AddVolume { value } => {
                let current = state.get_property::<Volume>().map_or(0.0, |v| v.0);
                BackendCommand::SetVolume {
                    value: (current + value).clamp(0.0, 1.0),
                }
            }
            BackendCommand::ToggleMute => {
                let muted = state.get_property::<Mute>().map_or(false, |m| m.0);
                BackendCommand::SetMute { value: !muted }
            }
            BackendCommand::ToggleMode => {
                let mode = state.get_property::<PlayerMode>().unwrap_or_default();
                BackendCommand::SetMode { mode: mode.next() }
            }
            other => other,
        }
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            BackendCommand::Play => "play",
            BackendCommand::Pause => "pause",
            BackendCommand::Stop => "stop",
            BackendCommand::Next => "next",
            BackendCommand::Prev => "prev",
            BackendCommand::Seek { .. } => "seek",
            BackendCommand::SeekPercentage { .. } => "seek_percentage",
            BackendCommand::SetVolume { .. } => "set_volume",
            BackendCommand::AddVolume { .. } => "add_volume",
            BackendCommand::SetMute { .. } => "set_mute",
            BackendCommand::ToggleMute => "toggle_mute",
            BackendCommand::SetMode { .. } => "set_mode",
            BackendCommand::ToggleMode => "toggle_mode",
            BackendCommand::SetCurrentTrack { .. } => "set_current_track",
            BackendCommand::PlayById { .. } => "play_by_id",
            BackendCommand::Splice { .. } => "splice",
            BackendCommand::SetTrack { .. } => "set_track",
            BackendCommand::SetLocation { .. } => "set_location",
            BackendCommand::Quit => "quit",
        }
    }
}
