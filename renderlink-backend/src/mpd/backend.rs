//! MPD adapter

use std::time::Instant;

use state_store::{
    id_from_uri, CurrentTime, CurrentTrack, Label, MimeTypes, Mute, PlayerMode, PlayerStatus,
    Protocols, StateDict, TrackInfo, Tracklist, Volume,
};

use super::connection::{execute, quote, read_greeting, split_pair, MpdConnection, MpdReply, TcpMpdConnection};
use super::idmap::IdMap;
use super::status::{flags_for_mode, MpdStatus, StatusField};
use crate::backend::{Backend, BackendKind};
use crate::command::BackendCommand;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

const DEFAULT_PORT: u16 = 6600;

/// Backend for an MPD server reached over its control socket
///
/// While `ours` is set, the MPD playlist mirrors the local tracklist and
/// the id map translates between the two. Songs queued by other clients
/// are mirrored read-only from `playlistinfo`.
pub struct MpdBackend<C: MpdConnection = TcpMpdConnection> {
    conn: C,
    state: StateDict,
    config: BackendConfig,
    tracklist: Tracklist,
    ids: IdMap,
    status: MpdStatus,
    ours: bool,
    /// Duration reported by MPD for the playing song
    duration: Option<f64>,
    /// Last non-muted volume
    volume: f64,
    muted: bool,
    last_poll: Option<Instant>,
}

impl MpdBackend<TcpMpdConnection> {
    /// Connect to `mpd://host[:port]`
    pub fn connect(uri: &str, config: &BackendConfig, state: StateDict) -> Result<Self> {
        let url = url::Url::parse(uri).map_err(|e| BackendError::UnsupportedUri(format!("{}: {}", uri, e)))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BackendError::UnsupportedUri(format!("{}: missing host", uri)))?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let conn = TcpMpdConnection::connect(&host, port, config.mpd_timeout)?;
        Self::with_connection(conn, &host, config.clone(), state)
    }
}

impl<C: MpdConnection> MpdBackend<C> {
    /// Set up the backend over an established connection
    pub fn with_connection(mut conn: C, host: &str, config: BackendConfig, state: StateDict) -> Result<Self> {
        let version = read_greeting(&mut conn)?;
        tracing::info!("Connected to MPD {} at {}", version, host);

        let decoders = execute(&mut conn, "decoders")?;
        let mut mimetypes: Vec<String> = Vec::new();
        for line in decoders.lines() {
            if let Some(("mime_type", mime)) = split_pair(line) {
                if !mimetypes.iter().any(|m| m == mime) {
                    mimetypes.push(mime.to_string());
                }
            }
        }

        state.set_property(&MimeTypes(mimetypes));
        state.set_property(&Label(format!("mpd@{}", host)));
        state.set_property(&Protocols(vec!["http".to_string()]));

        let mut backend = Self {
            conn,
            state,
            config,
            tracklist: Tracklist::new(),
            ids: IdMap::new(),
            status: MpdStatus::default(),
            ours: false,
            duration: None,
            volume: 0.0,
            muted: false,
            last_poll: None,
        };

        backend.poll_status()?;
        backend.tracklist.publish(&backend.state);
        Ok(backend)
    }

    /// Whether the MPD playlist is the local tracklist
    pub fn is_ours(&self) -> bool {
        self.ours
    }

    pub fn tracklist(&self) -> &Tracklist {
        &self.tracklist
    }

    pub fn ids(&self) -> &IdMap {
        &self.ids
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    fn command(&mut self, command: &str) -> Result<MpdReply> {
        execute(&mut self.conn, command)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    fn poll_status(&mut self) -> Result<usize> {
        let reply = self.command("status")?;
        let status = MpdStatus::parse(reply.lines());
        self.apply_status(status)
    }

    fn apply_status(&mut self, new: MpdStatus) -> Result<usize> {
        let changed = self.status.changed_fields(&new);
        let old = std::mem::replace(&mut self.status, new);

        let mut mode_changed = false;
        let mut track_changed = false;
        let mut time = None;

        for field in &changed {
            match field {
                StatusField::Repeat | StatusField::Random | StatusField::Single => mode_changed = true,
                StatusField::SongId => track_changed = true,
                StatusField::State => {
                    let status = self.status.player_status();
                    let was_idle = matches!(old.player_status(), PlayerStatus::Stopped | PlayerStatus::Init);
                    let is_idle = matches!(status, PlayerStatus::Stopped | PlayerStatus::Init);
                    if is_idle {
                        time = Some(0.0);
                    }
                    track_changed |= was_idle != is_idle;
                    self.state.set_property(&status);
                }
                StatusField::Volume => {
                    if let Some(volume) = self.status.volume.filter(|v| (0..=100).contains(v)) {
                        self.apply_volume(volume);
                    }
                }
                StatusField::Elapsed => {
                    if let Some(elapsed) = self.status.elapsed {
                        if old.elapsed.map(f64::floor) != Some(elapsed.floor()) {
                            time = Some(elapsed);
                        }
                    }
                }
                StatusField::Duration => {
                    self.duration = self.status.duration.filter(|d| *d > 0.0);
                }
                StatusField::Song | StatusField::Playlist | StatusField::PlaylistLength => {}
            }
        }

        if mode_changed {
            let mode = self.status.mode();
            self.tracklist.set_mode(mode);
            self.state.set_property(&mode);
        }

        if track_changed {
            self.update_current_track()?;
        }

        // After the track update so owned times use the new current track
        if let Some(time) = time {
            self.set_time(time);
        }

        Ok(changed.len())
    }

    fn apply_volume(&mut self, volume: i64) {
        if self.muted {
            if volume == 0 {
                return;
            }
            // Raised by another client
            self.muted = false;
            self.state.set_property(&Mute(false));
        }
        self.volume = volume as f64 / 100.0;
        self.state.set_property(&Volume(self.volume));
    }

    fn update_current_track(&mut self) -> Result<()> {
        let idle = matches!(
            self.status.player_status(),
            PlayerStatus::Stopped | PlayerStatus::Init
        );
        let songid = self.status.songid.and_then(|id| u32::try_from(id).ok());
        let Some(songid) = songid.filter(|_| !idle) else {
            self.state.set_property(&CurrentTrack(None));
            return Ok(());
        };

        if self.ours {
            let local = self.ids.to_local(songid).map(str::to_string);
            if let Some(local) = local {
                if self.tracklist.set_current_by_id(&local) {
                    if let Some(mut track) = self.tracklist.current() {
                        track.can_pause = true;
                        track.can_seek = true;
                        self.state.set_property(&CurrentTrack(Some(track)));
                    }
                    self.tracklist.publish(&self.state);
                    return Ok(());
                }
            }
            tracing::info!("MPD plays song {} which is not in our tracklist", songid);
            self.ours = false;
        }

        let track = self.read_foreign_track()?;
        self.state.set_property(&CurrentTrack(track));
        Ok(())
    }

    /// Metadata of the playing song as reported by `playlistinfo`
    fn read_foreign_track(&mut self) -> Result<Option<TrackInfo>> {
        let Some(song) = self.status.song else {
            return Ok(None);
        };
        let reply = self.command(&format!("playlistinfo {}", song))?;

        let mut track = TrackInfo::default();
        for line in reply.lines() {
            let Some((key, value)) = split_pair(line) else {
                continue;
            };
            let value = value.to_string();
            match key {
                "file" => track.uri = value,
                "Artist" => track.artist = Some(value),
                "Album" => track.album = Some(value),
                "AlbumArtist" => track.album_artist = Some(value),
                "Title" => track.title = Some(value),
                "Genre" => track.genre = Some(value),
                "Date" => track.date = Some(value),
                "Track" => track.track_number = value.split('/').next().and_then(|n| n.parse().ok()),
                "duration" => track.duration = value.parse().ok(),
                "Time" if track.duration.is_none() => track.duration = value.parse().ok(),
                _ => {}
            }
        }

        if track.uri.is_empty() {
            return Ok(None);
        }
        track.id = id_from_uri(&track.uri);
        if track.known_duration().is_none() {
            track.duration = self.duration;
        }
        let seekable = track.known_duration().is_some();
        track.can_pause = seekable;
        track.can_seek = seekable;
        Ok(Some(track))
    }

    fn set_time(&mut self, time: f64) {
        let times = if self.ours {
            self.tracklist.get_times(time)
        } else {
            CurrentTime::from_track(time, self.duration)
        };
        self.state.set_property(&times);
    }

    fn current_duration(&self) -> Option<f64> {
        if self.ours {
            self.tracklist.duration().or(self.duration)
        } else {
            self.duration
        }
    }

    // ------------------------------------------------------------------
    // Playlist
    // ------------------------------------------------------------------

    fn splice(&mut self, idx: Option<usize>, del: Option<usize>, tracks: Vec<TrackInfo>) -> Result<Vec<TrackInfo>> {
        let len = self.tracklist.len();
        let start = idx.unwrap_or(len);

        let accepted = match self.tracklist.splice(idx, del, tracks) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("MPD splice rejected: {}", e);
                return Ok(Vec::new());
            }
        };

        if !self.ours {
            if !accepted.is_empty() {
                self.take_ownership()?;
            }
        } else {
            let tail = len.saturating_sub(start);
            let removed = del.unwrap_or(tail).min(tail);
            if removed > 0 {
                self.command(&format!("delete {}:{}", start, start + removed))?;
                self.ids.remove_range(start, removed);
            }

            let mut pos = start;
            for track in &accepted {
                if self.add_file(track, pos)? {
                    pos += 1;
                }
            }
        }

        self.tracklist.publish(&self.state);
        Ok(accepted)
    }

    /// Replace the MPD playlist with the whole local tracklist
    fn take_ownership(&mut self) -> Result<()> {
        tracing::info!("Taking over the MPD playlist");
        self.command("clear")?;
        self.ids.clear();
        self.ours = true;

        let tracks = self.tracklist.tracks().to_vec();
        let mut pos = 0;
        for track in &tracks {
            if self.add_file(track, pos)? {
                pos += 1;
            }
        }
        Ok(())
    }

    /// `addid` one track and tag it; returns false when MPD refused it
    fn add_file(&mut self, track: &TrackInfo, pos: usize) -> Result<bool> {
        let reply = self.command(&format!("addid {} {}", quote(&track.uri), pos))?;
        let Some(mpd_id) = reply.value("Id").and_then(|id| id.parse::<u32>().ok()) else {
            tracing::warn!("MPD did not add {}", track.uri);
            return Ok(false);
        };
        self.ids.store_ids(track.id.clone(), mpd_id, pos);

        let tags = [
            ("artist", &track.artist),
            ("album", &track.album),
            ("albumartist", &track.album_artist),
            ("title", &track.title),
            ("genre", &track.genre),
            ("date", &track.date),
        ];
        for (tag, value) in tags {
            if let Some(value) = value {
                self.command(&format!("addtagid {} {} {}", mpd_id, tag, quote(value)))?;
            }
        }
        Ok(true)
    }

    /// Append `track` (or find it) and make it current
    fn locate(&mut self, mut track: TrackInfo) -> Result<bool> {
        if track.id.is_empty() {
            track.id = id_from_uri(&track.uri);
        }
        let id = track.id.clone();
        self.splice(None, Some(0), vec![track])?;

        let found = self.tracklist.set_current_by_id(&id);
        self.tracklist.publish(&self.state);
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    fn play(&mut self) -> Result<()> {
        match self.status.player_status() {
            PlayerStatus::Paused => {
                self.command("pause 0")?;
            }
            PlayerStatus::Playing => {}
            _ => self.play_current()?,
        }
        Ok(())
    }

    fn play_current(&mut self) -> Result<()> {
        let mpd_id = if self.ours {
            self.tracklist.current().and_then(|t| self.ids.to_mpd(&t.id))
        } else {
            None
        };
        match mpd_id {
            Some(id) => self.command(&format!("playid {}", id))?,
            None => self.command("play")?,
        };
        Ok(())
    }

    fn set_mode(&mut self, mode: PlayerMode) -> Result<()> {
        let (random, repeat, single) = flags_for_mode(mode);
        for (switch, on) in [("random", random), ("repeat", repeat), ("single", single)] {
            self.command(&format!("{} {}", switch, u8::from(on)))?;
        }
        self.tracklist.set_mode(mode);
        self.state.set_property(&mode);
        Ok(())
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        self.command(&format!("seekcur {:.3}", time.max(0.0)))?;
        Ok(())
    }
}

impl<C: MpdConnection> Backend for MpdBackend<C> {
    fn ping(&mut self, now: Instant) -> Result<usize> {
        let due = self
            .last_poll
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.mpd_poll_interval);
        if !due {
            return Ok(0);
        }
        self.last_poll = Some(now);
        self.poll_status()
    }

    fn handle_msg(&mut self, cmd: BackendCommand, _now: Instant) -> Result<bool> {
        match cmd.resolve(&self.state) {
            BackendCommand::Play => self.play()?,
            BackendCommand::Pause => match self.status.player_status() {
                PlayerStatus::Playing => {
                    self.command("pause 1")?;
                }
                PlayerStatus::Paused => {
                    self.command("pause 0")?;
                }
                status => tracing::debug!("MPD pause ignored while {:?}", status),
            },
            BackendCommand::Stop => {
                self.command("stop")?;
            }
            BackendCommand::Next => {
                self.command("next")?;
            }
            BackendCommand::Prev => {
                self.command("previous")?;
            }
            BackendCommand::Seek { time } => self.seek(time)?,
            BackendCommand::SeekPercentage { value } => match self.current_duration() {
                Some(duration) => self.seek(value.clamp(0.0, 1.0) * duration)?,
                None => tracing::debug!("MPD seek by percentage without a known duration"),
            },
            BackendCommand::SetVolume { value } => {
                let value = value.clamp(0.0, 1.0);
                self.command(&format!("setvol {}", (value * 100.0).round() as i64))?;
                self.volume = value;
                self.muted = false;
                self.state.set_property(&Volume(value));
                self.state.set_property(&Mute(false));
            }
            BackendCommand::SetMute { value } => {
                let level = if value { 0 } else { (self.volume * 100.0).round() as i64 };
                self.command(&format!("setvol {}", level))?;
                self.muted = value;
                self.state.set_property(&Mute(value));
            }
            BackendCommand::SetMode { mode } => self.set_mode(mode)?,
            BackendCommand::SetCurrentTrack { id } => {
                if self.tracklist.set_current_by_id(&id) {
                    self.tracklist.publish(&self.state);
                }
            }
            BackendCommand::PlayById { id } => {
                if self.tracklist.set_current_by_id(&id) {
                    self.tracklist.publish(&self.state);
                    self.play_current()?;
                }
            }
            BackendCommand::Splice { idx, del, tracks } => {
                self.splice(idx, del, tracks)?;
            }
            BackendCommand::SetTrack { track } => {
                self.command("stop")?;
                self.splice(Some(0), None, vec![track])?;
                if self.tracklist.set_current_by_idx(0).is_ok() {
                    self.tracklist.publish(&self.state);
                }
            }
            BackendCommand::SetLocation { track, play } => {
                if self.locate(track)? && play {
                    self.play_current()?;
                }
            }
            BackendCommand::Quit => return Ok(false),
            other => tracing::debug!("MPD ignores {}", other.name()),
        }
        Ok(true)
    }

    fn destroy(&mut self) {
        if let Err(e) = self.conn.send_line("close") {
            tracing::debug!("MPD close failed: {}", e);
        }
    }

    fn state(&self) -> &StateDict {
        &self.state
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mpd
    }
}
