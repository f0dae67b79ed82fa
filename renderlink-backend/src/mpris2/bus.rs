//! The MPRIS2 player interface as seen by the backend

use state_store::{id_from_uri, TrackInfo};

use crate::error::Result;

/// `PlaybackStatus` property values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Playing" => Some(PlaybackStatus::Playing),
            "Paused" => Some(PlaybackStatus::Paused),
            "Stopped" => Some(PlaybackStatus::Stopped),
            _ => None,
        }
    }
}

/// The `Metadata` property, reduced to the xesam / mpris keys we use
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mpris2Metadata {
    /// `mpris:trackid` object path
    pub trackid: Option<String>,
    /// `xesam:url`
    pub url: Option<String>,
    pub title: Option<String>,
    pub artist: Vec<String>,
    pub album: Option<String>,
    pub genre: Vec<String>,
    pub track_number: Option<u32>,
    /// `mpris:length` in microseconds
    pub length_us: Option<i64>,
    pub content_created: Option<String>,
}

impl Mpris2Metadata {
    /// Mirror of the player's current track
    pub fn to_track(&self) -> TrackInfo {
        let uri = self.url.clone().unwrap_or_default();
        let artist = (!self.artist.is_empty()).then(|| self.artist.join(", "));

        let mut track = TrackInfo {
            id: if uri.is_empty() { String::new() } else { id_from_uri(&uri) },
            uri,
            title: self.title.clone(),
            artist,
            album: self.album.clone(),
            genre: self.genre.first().cloned(),
            date: self.content_created.clone(),
            track_number: self.track_number,
            duration: self.length_us.filter(|l| *l > 0).map(|l| l as f64 / 1e6),
            player_id: self.trackid.clone(),
            ..Default::default()
        };
        if let (Some(artist), Some(title)) = (&track.artist, &track.title) {
            track.label = Some(format!("{} - {}", artist, title));
        }
        track
    }
}

/// `Can*` properties of the player interface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub can_seek: bool,
    pub can_pause: bool,
    pub can_go_next: bool,
    pub can_go_previous: bool,
    pub can_play: bool,
    pub can_control: bool,
}

/// A `PropertiesChanged` entry the backend reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    PlaybackStatus(PlaybackStatus),
    Metadata(Mpris2Metadata),
    Volume(f64),
    /// Microseconds, from the `Seeked` signal
    Position(i64),
    CanSeek(bool),
    CanPause(bool),
}

/// Access to one `org.mpris.MediaPlayer2.<name>` player
///
/// Calls are blocking and bounded by the bus timeout.
pub trait PlayerBus: Send {
    fn get_status(&mut self) -> Result<PlaybackStatus>;

    /// Playback position in microseconds
    fn get_position(&mut self) -> Result<i64>;

    fn get_metadata(&mut self) -> Result<Mpris2Metadata>;

    /// Volume in `0.0..=1.0`
    fn get_volume(&mut self) -> Result<f64>;

    fn capabilities(&mut self) -> Result<Capabilities>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn next(&mut self) -> Result<()>;

    fn previous(&mut self) -> Result<()>;

    /// Relative seek in microseconds
    fn seek(&mut self, offset_us: i64) -> Result<()>;

    /// Absolute seek within the track with this `mpris:trackid`
    fn set_position(&mut self, track_id: &str, position_us: i64) -> Result<()>;

    fn open_uri(&mut self, uri: &str) -> Result<()>;

    fn set_volume(&mut self, volume: f64) -> Result<()>;

    /// `Identity` of the root interface
    fn identity(&mut self) -> Result<String>;

    fn supported_mime_types(&mut self) -> Result<Vec<String>>;

    /// Property changes signalled since the last call
    fn drain_property_changes(&mut self) -> Vec<PropertyChange>;
}
