//! MPRIS2 adapter

use std::time::Instant;

use state_store::{
    id_from_uri, CurrentTime, CurrentTrack, Label, MimeTypes, PlayerMode, PlayerStatus, Protocols,
    StateDict, TrackInfo, Tracklist, Volume,
};

use super::bus::{Capabilities, Mpris2Metadata, PlaybackStatus, PlayerBus, PropertyChange};
use crate::backend::{Backend, BackendKind};
use crate::command::BackendCommand;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

/// Backend for a desktop media player exposing MPRIS2 on D-Bus
///
/// Playback becomes ours once the player reports the URI we opened in
/// its `xesam:url`. Any other URL hands control back to the player.
pub struct Mpris2Backend<B: PlayerBus> {
    bus: B,
    state: StateDict,
    config: BackendConfig,
    tracklist: Tracklist,
    caps: Capabilities,
    status: PlayerStatus,
    ours: bool,
    /// URI passed to the last `OpenUri`
    loaded_uri: Option<String>,
    /// `mpris:trackid` of the published track
    trackid: Option<String>,
    /// Seconds
    duration: Option<f64>,
    /// Microseconds
    last_player_time: Option<i64>,
    /// Furthest position seen in the current track, microseconds
    max_player_time: i64,
    last_poll: Option<Instant>,
}

#[cfg(feature = "dbus")]
impl Mpris2Backend<super::zbus_bus::ZbusPlayerBus> {
    /// Attach to `mpris2://<name>`, the player `org.mpris.MediaPlayer2.<name>`
    pub fn connect(uri: &str, config: &BackendConfig, state: StateDict) -> Result<Self> {
        let name = uri
            .split_once("://")
            .map(|(_, name)| name.trim_end_matches('/'))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| BackendError::UnsupportedUri(uri.to_string()))?;

        let bus = super::zbus_bus::ZbusPlayerBus::connect(name)?;
        Self::with_bus(bus, config.clone(), state)
    }
}

impl<B: PlayerBus> Mpris2Backend<B> {
    pub fn with_bus(mut bus: B, config: BackendConfig, state: StateDict) -> Result<Self> {
        let identity = bus.identity()?;
        tracing::info!("Attached to MPRIS2 player {}", identity);

        let mut mimetypes = bus.supported_mime_types()?;
        // VLC plays flac without announcing it
        if identity.starts_with("VLC") && !mimetypes.iter().any(|m| m == "audio/flac") {
            mimetypes.push("audio/flac".to_string());
        }

        state.set_property(&Label(identity));
        state.set_property(&MimeTypes(mimetypes));
        state.set_property(&Protocols(vec!["file".to_string(), "http".to_string()]));

        let caps = bus.capabilities()?;
        let mut backend = Self {
            bus,
            state,
            config,
            tracklist: Tracklist::new(),
            caps,
            status: PlayerStatus::Init,
            ours: false,
            loaded_uri: None,
            trackid: None,
            duration: None,
            last_player_time: None,
            max_player_time: 0,
            last_poll: None,
        };

        let status = backend.bus.get_status()?;
        backend.set_player_status(status)?;
        let metadata = backend.bus.get_metadata()?;
        backend.apply_metadata(metadata)?;
        let volume = backend.bus.get_volume()?;
        backend.state.set_property(&Volume(volume));
        backend.tracklist.publish(&backend.state);

        Ok(backend)
    }

    pub fn is_ours(&self) -> bool {
        self.ours
    }

    pub fn tracklist(&self) -> &Tracklist {
        &self.tracklist
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Run a player method, logging refusals
    fn action<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut B) -> Result<()>,
    {
        match f(&mut self.bus) {
            Err(BackendError::Protocol(e)) => {
                tracing::warn!("MPRIS2 {} failed: {}", name, e);
                Ok(())
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Player state
    // ------------------------------------------------------------------

    fn apply_change(&mut self, change: PropertyChange) -> Result<()> {
        match change {
            PropertyChange::PlaybackStatus(status) => self.set_player_status(status)?,
            PropertyChange::Metadata(metadata) => self.apply_metadata(metadata)?,
            PropertyChange::Volume(volume) => {
                self.state.set_property(&Volume(volume));
            }
            PropertyChange::Position(position) => self.track_position(position),
            PropertyChange::CanSeek(can_seek) => self.caps.can_seek = can_seek,
            PropertyChange::CanPause(can_pause) => self.caps.can_pause = can_pause,
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<()> {
        let position = self.bus.get_position()?;
        self.set_time(position);

        if let Some(last) = self.last_player_time {
            // Missed status signals show up as a position that moves or stalls unexpectedly
            let suspicious = match self.status {
                PlayerStatus::Playing => last == position,
                PlayerStatus::Paused | PlayerStatus::Stopped | PlayerStatus::Changing => last != position,
                _ => false,
            };
            if suspicious {
                let status = self.bus.get_status()?;
                self.set_player_status(status)?;
            }
        }

        self.last_player_time = Some(position);
        self.max_player_time = self.max_player_time.max(position);
        Ok(())
    }

    fn track_position(&mut self, position: i64) {
        self.set_time(position);
        self.last_player_time = Some(position);
        self.max_player_time = self.max_player_time.max(position);
    }

    fn set_time(&mut self, position_us: i64) {
        let time = position_us as f64 / 1e6;
        let times = if self.ours {
            self.tracklist.get_times(time)
        } else {
            CurrentTime::from_track(time, self.duration)
        };
        self.state.set_property(&times);
    }

    /// Whether the furthest position seen is close to the end of the track
    fn near_end(&self) -> bool {
        match self.duration {
            Some(duration) if duration > 0.0 => {
                let max = self.max_player_time as f64 / 1e6;
                (duration - max).abs() < self.config.mpris2_eof_tolerance.as_secs_f64()
            }
            _ => false,
        }
    }

    fn set_player_status(&mut self, playback: PlaybackStatus) -> Result<()> {
        let last = self.status;
        let mut status = match playback {
            PlaybackStatus::Playing => PlayerStatus::Playing,
            PlaybackStatus::Paused => PlayerStatus::Paused,
            PlaybackStatus::Stopped => PlayerStatus::Stopped,
        };

        if self.ours && status == PlayerStatus::Stopped && last == PlayerStatus::Playing && self.near_end() {
            tracing::debug!("MPRIS2 player reached the end of the track");
            if self.tracklist.advance(false) {
                status = PlayerStatus::Changing;
                self.tracklist.publish(&self.state);
                self.play_current()?;
            }
        }

        self.status = status;
        self.state.set_property(&status);

        if status == PlayerStatus::Stopped {
            self.set_time(0);
        }
        if status == PlayerStatus::Playing
            && matches!(last, PlayerStatus::Stopped | PlayerStatus::Changing | PlayerStatus::Init)
        {
            self.max_player_time = 0;
        }
        Ok(())
    }

    fn apply_metadata(&mut self, metadata: Mpris2Metadata) -> Result<()> {
        match (&metadata.url, &self.loaded_uri) {
            (Some(url), Some(loaded)) if url == loaded => {
                if !self.ours {
                    tracing::info!("Have playback control of the MPRIS2 player");
                }
                self.ours = true;
            }
            (Some(_), _) => {
                if self.ours {
                    tracing::info!("MPRIS2 player switched to a foreign track");
                }
                self.ours = false;
                self.loaded_uri = None;
            }
            (None, _) => {}
        }

        self.caps = self.bus.capabilities()?;

        if metadata.trackid.is_some() && metadata.trackid == self.trackid {
            return Ok(());
        }
        tracing::debug!("MPRIS2 track change: {:?}", metadata.trackid);
        self.trackid = metadata.trackid.clone();
        self.max_player_time = 0;

        let mirrored = metadata.to_track();
        let track = if self.ours {
            self.tracklist.current().map(|mut track| {
                track.player_id = metadata.trackid.clone();
                if track.known_duration().is_none() {
                    track.duration = mirrored.duration;
                }
                track
            })
        } else if mirrored.uri.is_empty() {
            None
        } else {
            Some(mirrored)
        };

        let track = track.map(|mut track| {
            track.can_seek = self.caps.can_seek;
            track.can_pause = self.caps.can_pause;
            track
        });

        self.duration = track.as_ref().and_then(TrackInfo::known_duration);
        self.state.set_property(&CurrentTrack(track));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Open and play the current tracklist entry; false with an empty list
    fn play_current(&mut self) -> Result<bool> {
        let Some(track) = self.tracklist.current() else {
            return Ok(false);
        };
        tracing::debug!("MPRIS2 opening {}", track.uri);

        self.loaded_uri = Some(track.uri.clone());
        self.action("OpenUri", |bus| bus.open_uri(&track.uri))?;
        self.action("Play", |bus| bus.play())?;
        Ok(true)
    }

    fn stop(&mut self) -> Result<()> {
        self.action("Stop", |bus| bus.stop())
    }

    fn stop_if_active(&mut self) -> Result<()> {
        if self.ours
            && matches!(
                self.status,
                PlayerStatus::Playing | PlayerStatus::Seeking | PlayerStatus::Paused
            )
        {
            self.stop()?;
        }
        Ok(())
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        if !self.caps.can_seek {
            tracing::debug!("MPRIS2 player cannot seek");
            return Ok(());
        }
        let target = (time.max(0.0) * 1e6) as i64;

        match self.trackid.clone() {
            Some(trackid) => self.action("SetPosition", |bus| bus.set_position(&trackid, target)),
            None => {
                let position = self.bus.get_position()?;
                self.action("Seek", |bus| bus.seek(target - position))
            }
        }
    }

    fn splice(&mut self, idx: Option<usize>, del: Option<usize>, tracks: Vec<TrackInfo>) -> Result<()> {
        if let Err(e) = self.tracklist.splice(idx, del, tracks) {
            tracing::warn!("MPRIS2 splice rejected: {}", e);
            return Ok(());
        }
        if self.tracklist.current_changed() {
            self.stop_if_active()?;
        }
        self.tracklist.publish(&self.state);
        Ok(())
    }
}

impl<B: PlayerBus> Backend for Mpris2Backend<B> {
    fn ping(&mut self, now: Instant) -> Result<usize> {
        let mut work = 0;

        for change in self.bus.drain_property_changes() {
            self.apply_change(change)?;
            work += 1;
        }

        let due = self
            .last_poll
            .map_or(true, |last| now.saturating_duration_since(last) >= self.config.mpris2_poll_interval);
        if due {
            self.last_poll = Some(now);
            self.poll()?;
            work += 1;
        }

        Ok(work)
    }

    fn handle_msg(&mut self, cmd: BackendCommand, _now: Instant) -> Result<bool> {
        match cmd.resolve(&self.state) {
            BackendCommand::Play => {
                if self.status == PlayerStatus::Paused {
                    self.action("Play", |bus| bus.play())?;
                } else if !self.play_current()? {
                    self.action("Play", |bus| bus.play())?;
                }
            }
            BackendCommand::Pause => {
                if !self.caps.can_pause {
                    tracing::debug!("MPRIS2 player cannot pause");
                } else if self.status == PlayerStatus::Playing {
                    self.action("Pause", |bus| bus.pause())?;
                } else if self.status == PlayerStatus::Paused {
                    self.action("Play", |bus| bus.play())?;
                }
            }
            BackendCommand::Stop => self.stop()?,
            BackendCommand::Next => {
                if self.ours {
                    if self.tracklist.advance(true) {
                        self.tracklist.publish(&self.state);
                        if self.status == PlayerStatus::Playing {
                            self.play_current()?;
                        }
                    }
                } else if self.caps.can_go_next {
                    self.action("Next", |bus| bus.next())?;
                }
            }
            BackendCommand::Prev => {
                if self.ours {
                    if self.tracklist.back() {
                        self.tracklist.publish(&self.state);
                        if self.status == PlayerStatus::Playing {
                            self.play_current()?;
                        }
                    }
                } else if self.caps.can_go_previous {
                    self.action("Previous", |bus| bus.previous())?;
                }
            }
            BackendCommand::Seek { time } => self.seek(time)?,
            BackendCommand::SeekPercentage { value } => match self.duration {
                Some(duration) => self.seek(value.clamp(0.0, 1.0) * duration)?,
                None => tracing::debug!("MPRIS2 seek by percentage without a known duration"),
            },
            BackendCommand::SetVolume { value } => {
                let value = value.clamp(0.0, 1.0);
                self.action("Volume", |bus| bus.set_volume(value))?;
                self.state.set_property(&Volume(value));
            }
            BackendCommand::SetMute { .. } => tracing::debug!("MPRIS2 players have no mute control"),
            BackendCommand::SetMode { mode } => {
                self.tracklist.set_mode(mode);
                self.state.set_property::<PlayerMode>(&mode);
            }
            BackendCommand::SetCurrentTrack { id } => {
                if self.tracklist.set_current_by_id(&id) {
                    self.stop_if_active()?;
                    self.tracklist.publish(&self.state);
                }
            }
            BackendCommand::PlayById { id } => {
                if self.tracklist.set_current_by_id(&id) {
                    self.tracklist.publish(&self.state);
                    self.play_current()?;
                }
            }
            BackendCommand::Splice { idx, del, tracks } => self.splice(idx, del, tracks)?,
            BackendCommand::SetTrack { track } => {
                self.stop()?;
                self.splice(Some(0), None, vec![track])?;
                if self.tracklist.set_current_by_idx(0).is_ok() {
                    self.tracklist.publish(&self.state);
                }
            }
            BackendCommand::SetLocation { mut track, play } => {
                self.stop()?;
                if track.id.is_empty() {
                    track.id = id_from_uri(&track.uri);
                }
                let id = track.id.clone();
                self.splice(None, Some(0), vec![track])?;
                if self.tracklist.set_current_by_id(&id) {
                    self.tracklist.publish(&self.state);
                    if play {
                        self.play_current()?;
                    }
                }
            }
            BackendCommand::Quit => return Ok(false),
            other => tracing::debug!("MPRIS2 ignores {}", other.name()),
        }
        Ok(true)
    }

    fn destroy(&mut self) {
        tracing::debug!("Detaching from MPRIS2 player");
    }

    fn state(&self) -> &StateDict {
        &self.state
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mpris2
    }
}
