//! Parsed MPD `status` responses and the mode mapping

use state_store::{PlayerMode, PlayerStatus};

use super::connection::split_pair;

/// Fields of an MPD `status` response that drive the player state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MpdStatus {
    pub repeat: Option<bool>,
    pub random: Option<bool>,
    pub single: Option<bool>,
    pub song: Option<i64>,
    pub songid: Option<i64>,
    pub state: Option<String>,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    pub playlist: Option<i64>,
    pub playlistlength: Option<i64>,
    pub volume: Option<i64>,
}

/// One status field, in the order changes are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Repeat,
    Random,
    Single,
    Song,
    SongId,
    State,
    Elapsed,
    Duration,
    Playlist,
    PlaylistLength,
    Volume,
}

impl StatusField {
    pub const ALL: [StatusField; 11] = [
        StatusField::Repeat,
        StatusField::Random,
        StatusField::Single,
        StatusField::Song,
        StatusField::SongId,
        StatusField::State,
        StatusField::Elapsed,
        StatusField::Duration,
        StatusField::Playlist,
        StatusField::PlaylistLength,
        StatusField::Volume,
    ];
}

impl MpdStatus {
    /// Parse `key: value` lines; unknown keys and bad values are skipped
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut status = Self::default();
        for line in lines {
            let Some((key, value)) = split_pair(line.as_ref()) else {
                continue;
            };
            match key {
                "repeat" => status.repeat = parse_flag(value),
                "random" => status.random = parse_flag(value),
                "single" => status.single = parse_flag(value),
                "song" => status.song = value.parse().ok(),
                "songid" => status.songid = value.parse().ok(),
                "state" => status.state = Some(value.to_string()),
                "elapsed" => status.elapsed = value.parse().ok(),
                "duration" => status.duration = value.parse().ok(),
                "playlist" => status.playlist = value.parse().ok(),
                "playlistlength" => status.playlistlength = value.parse().ok(),
                "volume" => status.volume = value.parse().ok(),
                _ => {}
            }
        }
        status
    }

    /// Fields whose value differs between `self` and `other`
    pub fn changed_fields(&self, other: &MpdStatus) -> Vec<StatusField> {
        StatusField::ALL
            .into_iter()
            .filter(|field| match field {
                StatusField::Repeat => self.repeat != other.repeat,
                StatusField::Random => self.random != other.random,
                StatusField::Single => self.single != other.single,
                StatusField::Song => self.song != other.song,
                StatusField::SongId => self.songid != other.songid,
                StatusField::State => self.state != other.state,
                StatusField::Elapsed => self.elapsed != other.elapsed,
                StatusField::Duration => self.duration != other.duration,
                StatusField::Playlist => self.playlist != other.playlist,
                StatusField::PlaylistLength => self.playlistlength != other.playlistlength,
                StatusField::Volume => self.volume != other.volume,
            })
            .collect()
    }

    pub fn mode(&self) -> PlayerMode {
        mode_from_flags(self.single, self.repeat, self.random)
    }

    pub fn player_status(&self) -> PlayerStatus {
        player_status_from_state(self.state.as_deref())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    value.parse::<i64>().ok().map(|v| v != 0)
}

/// Playback mode from the `single`, `repeat` and `random` switches
///
/// `single` decides first. Any unknown switch gives `Normal`.
pub fn mode_from_flags(single: Option<bool>, repeat: Option<bool>, random: Option<bool>) -> PlayerMode {
    let (Some(single), Some(repeat), Some(random)) = (single, repeat, random) else {
        return PlayerMode::Normal;
    };

    match (single, repeat, random) {
        (true, true, _) => PlayerMode::Loop,
        (true, false, _) => PlayerMode::One,
        (false, _, true) => PlayerMode::Shuffle,
        (false, true, false) => PlayerMode::Repeat,
        (false, false, false) => PlayerMode::Normal,
    }
}

/// `(random, repeat, single)` switch values for a mode
pub fn flags_for_mode(mode: PlayerMode) -> (bool, bool, bool) {
    match mode {
        PlayerMode::Normal => (false, false, false),
        PlayerMode::Repeat => (false, true, false),
        PlayerMode::Shuffle => (true, true, false),
        PlayerMode::One => (false, false, true),
        PlayerMode::Loop => (false, true, true),
    }
}

pub fn player_status_from_state(state: Option<&str>) -> PlayerStatus {
    match state {
        None => PlayerStatus::Init,
        Some("play") => PlayerStatus::Playing,
        Some("pause") => PlayerStatus::Paused,
        Some(_) => PlayerStatus::Stopped,
    }
}
