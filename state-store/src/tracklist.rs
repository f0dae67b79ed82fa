//! Player tracklist
//!
//! An ordered play queue with a current pointer and a playback mode.
//! Each backend owns one; it is never shared between backends.
//!
//! Two indices are tracked: `idx` is the position in play order (the
//! position inside the shuffle permutation in shuffle mode) and
//! `idx_real` is the index into the track vector. Both are `None` until
//! a current track is chosen.

use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::store::StateDict;
use crate::types::{CurrentTime, PlayerMode, TrackInfo, TracklistCurrent, TracklistTracks};

/// Prefix of generated track ids
pub const PLAYQUEUE_ID: &str = "playqueue";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TracklistError {
    #[error("index {index} out of range (tracklist has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// What changed since the last `publish`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TracklistChanges {
    pub list: bool,
    pub current: bool,
}

/// Track id generated from a URI: `playqueue/<md5 hex>`
pub fn id_from_uri(uri: &str) -> String {
    let digest = Md5::digest(uri.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}/{}", PLAYQUEUE_ID, hex)
}

#[derive(Debug, Clone)]
pub struct Tracklist {
    tracks: Vec<TrackInfo>,
    idx: Option<usize>,
    idx_real: Option<usize>,
    mode: PlayerMode,
    shuffle_list: Option<Vec<usize>>,
    /// An explicit next track was queued after the current one
    has_next: bool,
    duration: Option<f64>,
    duration_before: Option<f64>,
    duration_after: Option<f64>,
    list_changed: bool,
    current_changed: bool,
    rng: StdRng,
}

impl Tracklist {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Tracklist with a deterministic shuffle order
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            tracks: Vec::new(),
            idx: None,
            idx_real: None,
            mode: PlayerMode::Normal,
            shuffle_list: None,
            has_next: false,
            duration: None,
            duration_before: Some(0.0),
            duration_after: Some(0.0),
            list_changed: false,
            current_changed: false,
            rng,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[TrackInfo] {
        &self.tracks
    }

    pub fn track(&self, index: usize) -> Option<&TrackInfo> {
        self.tracks.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn mode(&self) -> PlayerMode {
        self.mode
    }

    /// Index of the current track without choosing one
    pub fn current_index(&self) -> Option<usize> {
        self.idx_real
    }

    /// Duration of the current track
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn has_next(&self) -> bool {
        self.has_next
    }

    pub fn list_changed(&self) -> bool {
        self.list_changed
    }

    pub fn current_changed(&self) -> bool {
        self.current_changed
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// The current track, choosing the first one in play order if none
    /// is selected yet
    pub fn current(&mut self) -> Option<TrackInfo> {
        if self.tracks.is_empty() {
            return None;
        }

        if self.idx_real.is_none() {
            let idx = self.idx.unwrap_or(0).min(self.tracks.len() - 1);
            self.idx = Some(idx);
            let real = if self.mode == PlayerMode::Shuffle {
                self.shuffle_list()[idx]
            } else {
                idx
            };
            self.idx_real = Some(real);
            self.position_changed();
        }

        self.idx_real.and_then(|i| self.tracks.get(i)).cloned()
    }

    /// Id of the current track without choosing one
    pub fn current_id(&self) -> Option<&str> {
        self.idx_real
            .and_then(|i| self.tracks.get(i))
            .map(|t| t.id.as_str())
    }

    /// Compute the next track index according to the mode
    ///
    /// With `advance` the pointer moves; `wrap` lets Normal and One
    /// continue past the end (a user pressing "next").
    pub fn next_index(&mut self, advance: bool, wrap: bool) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        // An explicitly queued next track overrides the mode
        if self.has_next {
            let real = self.idx_real.map_or(0, |i| i + 1);
            if real >= len {
                return None;
            }
            if advance {
                self.idx = Some(real);
                self.idx_real = Some(real);
                self.has_next = false;
            }
            return Some(real);
        }

        let (idx, real) = match self.mode {
            PlayerMode::Normal | PlayerMode::One => {
                self.shuffle_list = None;
                if self.mode == PlayerMode::One && !wrap {
                    (None, None)
                } else {
                    let next = self.idx.map_or(0, |i| i + 1);
                    let next = if next < len {
                        Some(next)
                    } else if wrap {
                        Some(0)
                    } else {
                        None
                    };
                    (next, next)
                }
            }
            PlayerMode::Repeat => {
                self.shuffle_list = None;
                let next = self.idx.map_or(0, |i| i + 1);
                let next = if next < len { next } else { 0 };
                (Some(next), Some(next))
            }
            PlayerMode::Shuffle => {
                let (idx, idx_real) = (self.idx, self.idx_real);
                let list = self.shuffle_list().to_vec();
                let pos = idx.or_else(|| idx_real.and_then(|r| list.iter().position(|&i| i == r)));
                let next = pos.map_or(0, |p| p + 1);
                let next = if next < len { next } else { 0 };
                (Some(next), Some(list[next]))
            }
            PlayerMode::Loop => {
                self.shuffle_list = None;
                let current = self.idx.or(self.idx_real);
                (current, current)
            }
        };

        if advance {
            self.idx = idx;
            self.idx_real = real;
        }
        real
    }

    /// Move to the next track; `force` wraps at the end of the list
    ///
    /// Returns false when playback should stop.
    pub fn advance(&mut self, force: bool) -> bool {
        match self.next_index(true, force) {
            Some(real) => {
                self.idx_real = Some(real);
                self.position_changed();
                true
            }
            None => false,
        }
    }

    /// Move to the previous track, wrapping to the end
    pub fn back(&mut self) -> bool {
        let len = self.tracks.len();
        if len == 0 {
            return false;
        }

        let prev = match self.idx {
            Some(i) if i > 0 => i - 1,
            _ => len - 1,
        };

        let real = match self.mode {
            PlayerMode::Normal | PlayerMode::Repeat | PlayerMode::One => {
                self.shuffle_list = None;
                self.idx = Some(prev);
                Some(prev)
            }
            PlayerMode::Shuffle => {
                self.idx = Some(prev);
                Some(self.shuffle_list()[prev])
            }
            PlayerMode::Loop => {
                self.shuffle_list = None;
                self.idx
            }
        };

        match real {
            Some(real) => {
                self.idx_real = Some(real);
                self.position_changed();
                true
            }
            None => false,
        }
    }

    /// Peek at the track that would play after the current one
    pub fn peek_next(&mut self) -> Option<TrackInfo> {
        self.next_index(false, false)
            .and_then(|i| self.tracks.get(i))
            .cloned()
    }

    pub fn set_current_by_idx(&mut self, index: usize) -> Result<(), TracklistError> {
        let len = self.tracks.len();
        if index >= len {
            tracing::warn!("cannot set current track: index {} out of range (0..{})", index, len);
            return Err(TracklistError::IndexOutOfRange { index, len });
        }

        if self.mode == PlayerMode::Shuffle {
            let pos = self.shuffle_list().iter().position(|&i| i == index);
            self.idx = pos;
        } else {
            self.shuffle_list = None;
            self.idx = Some(index);
        }

        self.idx_real = Some(index);
        self.position_changed();
        Ok(())
    }

    pub fn set_current_by_id(&mut self, id: &str) -> bool {
        match self.index_of(id) {
            Some(index) => self.set_current_by_idx(index).is_ok(),
            None => {
                tracing::warn!("cannot set current track: no such track {}", id);
                false
            }
        }
    }

    pub fn set_mode(&mut self, mode: PlayerMode) {
        self.mode = mode;
    }

    /// Switch to the following mode, wrapping around
    pub fn toggle_mode(&mut self) -> PlayerMode {
        self.mode = self.mode.next();
        self.mode
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Replace `del` tracks at `idx` with `tracks`
    ///
    /// `idx = None` appends, `del = None` deletes to the end. Tracks
    /// without an id get one generated from their URI; a track whose id
    /// already exists outside the deleted range is dropped. The current
    /// track is kept by id. Returns the tracks actually inserted.
    pub fn splice(
        &mut self,
        idx: Option<usize>,
        del: Option<usize>,
        tracks: Vec<TrackInfo>,
    ) -> Result<Vec<TrackInfo>, TracklistError> {
        let len = self.tracks.len();
        let idx = idx.unwrap_or(len);
        if idx > len {
            return Err(TracklistError::IndexOutOfRange { index: idx, len });
        }
        let del = del.unwrap_or(len - idx).min(len - idx);

        let current_id = self.current().map(|t| t.id);

        let mut accepted: Vec<TrackInfo> = Vec::with_capacity(tracks.len());
        for mut track in tracks {
            if track.id.is_empty() {
                if track.uri.is_empty() {
                    tracing::debug!("dropping track without id and uri");
                    continue;
                }
                track.id = id_from_uri(&track.uri);
            }

            let existing = self.index_of(&track.id);
            let replaced = existing.map_or(true, |i| i >= idx && i < idx + del);
            let duplicate = accepted.iter().any(|t| t.id == track.id);
            if !replaced || duplicate {
                tracing::debug!("dropping duplicate track {}", track.id);
                continue;
            }
            accepted.push(track);
        }

        if accepted.is_empty() && del == 0 {
            return Ok(accepted);
        }

        self.tracks.splice(idx..idx + del, accepted.iter().cloned());
        self.list_changed = true;

        self.idx = None;
        self.idx_real = current_id.and_then(|id| self.index_of(&id));
        match self.idx_real {
            Some(real) if self.mode != PlayerMode::Shuffle => self.idx = Some(real),
            Some(_) => {}
            None => self.current_changed = true,
        }

        self.shuffle_list = None;
        self.has_next = false;
        self.update_durations();

        Ok(accepted)
    }

    /// Queue `track` right after the current one
    ///
    /// Entries before the current track are dropped so repeated calls do
    /// not grow the list. The next advance plays this track regardless
    /// of the mode.
    pub fn set_next(&mut self, track: TrackInfo) -> bool {
        let Some(current) = self.idx_real else {
            return false;
        };

        if current > 0 && self.splice(Some(0), Some(current), Vec::new()).is_err() {
            return false;
        }
        let Some(current) = self.idx_real else {
            return false;
        };

        match self.splice(Some(current + 1), None, vec![track]) {
            Ok(accepted) if !accepted.is_empty() => {
                self.has_next = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        if !self.tracks.is_empty() {
            self.list_changed = true;
            self.current_changed = true;
        }
        self.tracks.clear();
        self.shuffle_list = None;
        self.has_next = false;
        self.idx = None;
        self.idx_real = None;
        self.update_durations();
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// Time record for position `t` (seconds) in the current track
    pub fn get_times(&self, t: f64) -> CurrentTime {
        let duration = self.duration;
        CurrentTime {
            time: t,
            time_abs: self.duration_before.map(|b| t + b),
            time_rem: duration.map(|d| d - t),
            time_rem_abs: duration.zip(self.duration_after).map(|(d, a)| d - t + a),
            percentage: match duration {
                Some(d) if d > 0.0 => t / d,
                _ => -1.0,
            },
        }
    }

    /// Write tracklist state and clear the change flags
    pub fn publish(&mut self, dict: &StateDict) -> TracklistChanges {
        let changes = TracklistChanges {
            list: self.list_changed,
            current: self.current_changed,
        };

        if changes.list {
            dict.set_property(&TracklistTracks(self.tracks.clone()));
        }
        if changes.current {
            dict.set_property(&TracklistCurrent(self.current_id().map(String::from)));
        }
        dict.set_property(&self.mode);

        self.list_changed = false;
        self.current_changed = false;
        changes
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn position_changed(&mut self) {
        self.update_durations();
        self.current_changed = true;
    }

    fn update_durations(&mut self) {
        self.duration = None;
        self.duration_before = Some(0.0);
        self.duration_after = Some(0.0);

        let Some(current) = self.idx_real else {
            return;
        };
        let Some(track) = self.tracks.get(current) else {
            return;
        };
        self.duration = track.known_duration();

        self.duration_before = self.tracks[..current]
            .iter()
            .map(TrackInfo::known_duration)
            .sum::<Option<f64>>();
        self.duration_after = self.tracks[current + 1..]
            .iter()
            .map(TrackInfo::known_duration)
            .sum::<Option<f64>>();
    }

    /// The shuffle permutation, created on demand
    fn shuffle_list(&mut self) -> &[usize] {
        let len = self.tracks.len();
        let stale = self.shuffle_list.as_ref().map_or(true, |l| l.len() != len);
        if stale {
            let mut list: Vec<usize> = (0..len).collect();
            if len > 1 {
                for i in 0..len {
                    // any index but i
                    let mut j = self.rng.gen_range(0..len - 1);
                    if j >= i {
                        j += 1;
                    }
                    list.swap(i, j);
                }
            }
            self.shuffle_list = Some(list);
        }
        self.shuffle_list.as_deref().unwrap_or(&[])
    }
}

impl Default for Tracklist {
    fn default() -> Self {
        Self::new()
    }
}
