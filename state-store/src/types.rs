//! Player state vocabulary shared by every backend
//!
//! These are the typed values backends publish into the `player`,
//! `player/current_time` and `player/tracklist` contexts.

use serde::{Deserialize, Serialize};

use crate::property::Property;

pub const PLAYER_CONTEXT: &str = "player";
pub const CURRENT_TIME_CONTEXT: &str = "player/current_time";
pub const TRACKLIST_CONTEXT: &str = "player/tracklist";

/// Transport status of a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    #[default]
    Init,
    Stopped,
    Playing,
    Seeking,
    Changing,
    Interrupted,
    Paused,
    Starting,
    Error,
}

impl Property for PlayerStatus {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "status";
}

/// Playback order of the tracklist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerMode {
    #[default]
    Normal,
    Repeat,
    Shuffle,
    One,
    Loop,
}

impl PlayerMode {
    /// Number of modes
    pub const MODE_MAX: usize = 5;

    const ALL: [PlayerMode; Self::MODE_MAX] = [
        PlayerMode::Normal,
        PlayerMode::Repeat,
        PlayerMode::Shuffle,
        PlayerMode::One,
        PlayerMode::Loop,
    ];

    /// Mode for a numeric value, wrapping at `MODE_MAX`
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::MODE_MAX]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The following mode, wrapping back to `Normal`
    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }
}

impl Property for PlayerMode {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "mode";
}

/// Playback time record, published as a single variable
///
/// Absolute values include the durations of the surrounding tracklist
/// entries; they are `None` when any of those durations is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentTime {
    pub time: f64,
    pub time_abs: Option<f64>,
    pub time_rem: Option<f64>,
    pub time_rem_abs: Option<f64>,
    /// `-1.0` when the duration is unknown
    pub percentage: f64,
}

impl CurrentTime {
    /// Time record for a track without tracklist context
    pub fn from_track(time: f64, duration: Option<f64>) -> Self {
        match duration.filter(|d| *d > 0.0) {
            Some(d) => Self {
                time,
                time_abs: Some(time),
                time_rem: Some(d - time),
                time_rem_abs: Some(d - time),
                percentage: time / d,
            },
            None => Self {
                time,
                time_abs: Some(time),
                time_rem: None,
                time_rem_abs: None,
                percentage: -1.0,
            },
        }
    }

    /// All-zero record published after a stop
    pub fn zero() -> Self {
        Self {
            time: 0.0,
            time_abs: Some(0.0),
            time_rem: Some(0.0),
            time_rem_abs: Some(0.0),
            percentage: 0.0,
        }
    }
}

impl Default for CurrentTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl Property for CurrentTime {
    const CONTEXT: &'static str = CURRENT_TIME_CONTEXT;
    const KEY: &'static str = "time";
}

/// Metadata of one track
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Local track id; generated from the URI when empty
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Id the remote player uses for this track (MPRIS2 trackid)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    #[serde(default)]
    pub can_seek: bool,
    #[serde(default)]
    pub can_pause: bool,
}

impl TrackInfo {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    /// Duration when known and positive
    pub fn known_duration(&self) -> Option<f64> {
        self.duration.filter(|d| *d > 0.0)
    }

    /// Display label: explicit label, `artist - title`, title, then URI
    pub fn display_label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => format!("{} - {}", artist, title),
            (_, Some(title)) => title.clone(),
            _ => self.uri.clone(),
        }
    }
}

/// The track being played; `None` publishes an empty track
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrentTrack(pub Option<TrackInfo>);

impl Property for CurrentTrack {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "current_track";
}

/// Volume in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(pub f64);

impl Property for Volume {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "volume";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mute(pub bool);

impl Property for Mute {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "mute";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub String);

impl Property for Label {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "label";
}

/// Mime types the player can render
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeTypes(pub Vec<String>);

impl Property for MimeTypes {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "mimetypes";
}

/// URI schemes the player can fetch
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocols(pub Vec<String>);

impl Property for Protocols {
    const CONTEXT: &'static str = PLAYER_CONTEXT;
    const KEY: &'static str = "protocols";
}

/// Tracks of the local tracklist
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TracklistTracks(pub Vec<TrackInfo>);

impl Property for TracklistTracks {
    const CONTEXT: &'static str = TRACKLIST_CONTEXT;
    const KEY: &'static str = "tracks";
}

/// Id of the current tracklist entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TracklistCurrent(pub Option<String>);

impl Property for TracklistCurrent {
    const CONTEXT: &'static str = TRACKLIST_CONTEXT;
    const KEY: &'static str = "current";
}
