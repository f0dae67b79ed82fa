//! UPnP MediaRenderer adapter

use std::sync::mpsc;
use std::time::Instant;

use state_store::{
    id_from_uri, CurrentTime, CurrentTrack, Label, MimeTypes, Mute, PlayerMode, PlayerStatus, Protocols,
    StateDict, TrackInfo, Tracklist, Volume,
};

use super::control::{parse_bool, parse_protocol_info, PositionInfo, RendererCapabilities, SoapUpnpControl, UpnpControl};
use super::didl::{track_from_didl, track_to_didl};
use super::time::format_time;
use crate::backend::{Backend, BackendKind};
use crate::command::BackendCommand;
use crate::config::BackendConfig;
use crate::error::{tolerate_fault, BackendError, Result};

/// Service a state variable event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpnpService {
    AvTransport,
    RenderingControl,
}

/// A state variable change reported by the renderer
///
/// Whatever receives GENA notifications (or the `LastChange` payload)
/// pushes these through `UpnpBackend::event_sender`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpEvent {
    pub service: UpnpService,
    pub variable: String,
    pub value: String,
}

impl UpnpEvent {
    pub fn new(service: UpnpService, variable: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            service,
            variable: variable.into(),
            value: value.into(),
        }
    }
}

/// Backend for a UPnP AV MediaRenderer
///
/// The renderer plays one URI at a time. We own playback while its
/// `TrackURI` is the URI we set; gapless transitions go through
/// `SetNextAVTransportURI` when the renderer supports it, otherwise
/// through the STOPPED transition at the end of a track.
pub struct UpnpBackend<C: UpnpControl = SoapUpnpControl> {
    control: C,
    state: StateDict,
    config: BackendConfig,
    caps: RendererCapabilities,
    tracklist: Tracklist,
    status: PlayerStatus,
    transport_state: Option<String>,
    ours: bool,
    /// URI the renderer last reported
    current_uri: Option<String>,
    /// URI passed to the last `SetAVTransportURI`
    our_uri: Option<String>,
    /// URI queued with `SetNextAVTransportURI`
    next_uri: Option<String>,
    set_next_disabled: bool,
    finishing: bool,
    stop_sent: bool,
    can_seek: bool,
    can_pause: bool,
    duration: Option<f64>,
    volume: Option<f64>,
    mute: Option<bool>,
    events_tx: mpsc::Sender<UpnpEvent>,
    events: mpsc::Receiver<UpnpEvent>,
    last_transport_poll: Option<Instant>,
    last_renderer_poll: Option<Instant>,
}

impl UpnpBackend<SoapUpnpControl> {
    /// Attach to `upnp-renderer://host:port/path`, the description document
    /// at `http://host:port/path`
    pub fn connect(uri: &str, config: &BackendConfig, state: StateDict) -> Result<Self> {
        let rest = uri
            .find("://")
            .map(|i| &uri[i..])
            .filter(|rest| rest.len() > 3)
            .ok_or_else(|| BackendError::UnsupportedUri(uri.to_string()))?;
        let url = format!("http{}", rest);

        let control = SoapUpnpControl::probe(&url, config)?;
        let label = control.description().friendly_name.clone();
        let caps = control.capabilities();
        Self::with_control(control, label, caps, config.clone(), state)
    }
}

impl<C: UpnpControl> UpnpBackend<C> {
    pub fn with_control(
        mut control: C,
        label: String,
        caps: RendererCapabilities,
        config: BackendConfig,
        state: StateDict,
    ) -> Result<Self> {
        tracing::info!("Attached to UPnP renderer {}", label);

        let sink = tolerate_fault(control.get_protocol_info(), "GetProtocolInfo")?.unwrap_or_default();
        state.set_property(&Label(label));
        state.set_property(&MimeTypes(parse_protocol_info(&sink)));
        state.set_property(&Protocols(vec!["http".to_string()]));

        let (events_tx, events) = mpsc::channel();
        let mut backend = Self {
            control,
            state,
            config,
            caps,
            tracklist: Tracklist::new(),
            status: PlayerStatus::Init,
            transport_state: None,
            ours: false,
            current_uri: None,
            our_uri: None,
            next_uri: None,
            set_next_disabled: false,
            finishing: false,
            stop_sent: false,
            can_seek: caps.has_seek,
            can_pause: caps.has_pause,
            duration: None,
            volume: None,
            mute: None,
            events_tx,
            events,
            last_transport_poll: None,
            last_renderer_poll: None,
        };

        backend.state.set_property(&PlayerStatus::Init);
        backend.poll_transport()?;
        backend.tracklist.publish(&backend.state);
        Ok(backend)
    }

    /// Channel for renderer events; they are applied on the next `ping`
    pub fn event_sender(&self) -> mpsc::Sender<UpnpEvent> {
        self.events_tx.clone()
    }

    pub fn is_ours(&self) -> bool {
        self.ours
    }

    pub fn tracklist(&self) -> &Tracklist {
        &self.tracklist
    }

    pub fn capabilities(&self) -> RendererCapabilities {
        self.caps
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    // ------------------------------------------------------------------
    // Renderer state
    // ------------------------------------------------------------------

    fn apply_event(&mut self, event: UpnpEvent) -> Result<()> {
        match (event.service, event.variable.as_str()) {
            (UpnpService::AvTransport, "TransportState") => self.set_transport_state(&event.value)?,
            (UpnpService::AvTransport, "CurrentTrackURI" | "AVTransportURI") => {
                // Picked up by the next position poll
                self.last_renderer_poll = None;
            }
            (UpnpService::RenderingControl, "Volume") => match event.value.trim().parse::<i64>() {
                Ok(volume) => self.apply_device_volume(volume),
                Err(_) => tracing::debug!("Ignoring volume event {:?}", event.value),
            },
            (UpnpService::RenderingControl, "Mute") => self.apply_mute(parse_bool(&event.value)),
            (service, variable) => tracing::trace!("Ignoring {:?} event {}", service, variable),
        }
        Ok(())
    }

    /// Transport state, volume and mute; only changes are published
    fn poll_transport(&mut self) -> Result<()> {
        if let Some(state) = tolerate_fault(self.control.get_transport_info(), "GetTransportInfo")? {
            self.set_transport_state(&state)?;
        }

        if self.caps.has_volume() {
            if let Some(volume) = tolerate_fault(self.control.get_volume(), "GetVolume")? {
                self.apply_device_volume(volume);
            }
        }
        if self.caps.has_mute {
            if let Some(mute) = tolerate_fault(self.control.get_mute(), "GetMute")? {
                self.apply_mute(mute);
            }
        }
        Ok(())
    }

    fn apply_device_volume(&mut self, volume: i64) {
        let Some(range) = self.caps.volume_range else {
            return;
        };
        let volume = range.int_to_float(volume);
        if self.volume != Some(volume) {
            self.volume = Some(volume);
            self.state.set_property(&Volume(volume));
        }
    }

    fn apply_mute(&mut self, mute: bool) {
        if self.mute != Some(mute) {
            self.mute = Some(mute);
            self.state.set_property(&Mute(mute));
        }
    }

    fn set_transport_state(&mut self, transport_state: &str) -> Result<()> {
        let transport_state = transport_state.trim();
        if self.transport_state.as_deref() == Some(transport_state) {
            return Ok(());
        }
        tracing::debug!("Renderer transport state {}", transport_state);
        self.transport_state = Some(transport_state.to_string());

        let status = match transport_state {
            "STOPPED" => {
                if self.ours && self.finishing && !self.stop_sent {
                    tracing::debug!("Renderer reached the end of the track");
                    self.finishing = false;
                    if self.tracklist.advance(false) {
                        self.tracklist.publish(&self.state);
                        self.set_status(PlayerStatus::Changing);
                        self.play_current()?;
                        return Ok(());
                    }
                }
                self.stop_sent = false;
                self.finishing = false;
                self.current_uri = None;
                self.duration = None;
                self.state.set_property(&CurrentTime::zero());
                self.state.set_property(&CurrentTrack(None));
                PlayerStatus::Stopped
            }
            "PLAYING" => {
                self.stop_sent = false;
                self.last_renderer_poll = None;
                PlayerStatus::Playing
            }
            "TRANSITIONING" => PlayerStatus::Changing,
            "PAUSED_PLAYBACK" | "PAUSED_RECORDING" => PlayerStatus::Paused,
            "NO_MEDIA_PRESENT" => PlayerStatus::Init,
            other => {
                tracing::debug!("Unknown transport state {}", other);
                return Ok(());
            }
        };
        self.set_status(status);
        Ok(())
    }

    fn set_status(&mut self, status: PlayerStatus) {
        self.status = status;
        self.state.set_property(&status);
    }

    /// Position poll while playing
    fn poll_renderer(&mut self) -> Result<()> {
        let Some(info) = tolerate_fault(self.control.get_position_info(), "GetPositionInfo")? else {
            return Ok(());
        };

        if info.track_uri != self.current_uri {
            self.track_changed(&info)?;
        }
        if self.duration.is_none() {
            self.duration = info.track_duration.filter(|d| *d > 0.0);
        }

        let time = info.rel_time.unwrap_or(0.0).max(0.0);
        if self.ours {
            if let Some(duration) = self.duration {
                let remaining = duration - time;
                if remaining < self.config.upnp_set_next_threshold.as_secs_f64() {
                    self.queue_next()?;
                }
                if remaining < self.config.upnp_finishing_threshold.as_secs_f64() && !self.finishing {
                    tracing::debug!("Renderer finishing the track");
                    self.finishing = true;
                }
            }
        }

        let times = if self.ours {
            self.tracklist.get_times(time)
        } else {
            CurrentTime::from_track(time, self.duration)
        };
        self.state.set_property(&times);
        Ok(())
    }

    fn track_changed(&mut self, info: &PositionInfo) -> Result<()> {
        tracing::debug!("Renderer track change: {:?}", info.track_uri);
        self.current_uri = info.track_uri.clone();
        self.finishing = false;
        self.refresh_transport_actions()?;

        let track = match info.track_uri.as_deref() {
            Some(uri) if self.our_uri.as_deref() == Some(uri) => {
                if !self.ours {
                    tracing::info!("Have playback control of the UPnP renderer");
                }
                self.ours = true;
                self.tracklist.current()
            }
            Some(uri) if self.next_uri.as_deref() == Some(uri) => {
                tracing::debug!("Renderer moved to the queued next track");
                self.ours = true;
                self.our_uri = self.next_uri.take();
                self.tracklist.advance(false);
                self.tracklist.publish(&self.state);
                self.tracklist.current()
            }
            Some(uri) => {
                if self.ours {
                    tracing::info!("UPnP renderer switched to a foreign track");
                }
                self.ours = false;
                self.our_uri = None;
                self.next_uri = None;
                Some(mirror_track(uri, info.track_metadata.as_deref()))
            }
            None => None,
        };

        let track = track.map(|mut track| {
            if track.known_duration().is_none() {
                track.duration = info.track_duration.filter(|d| *d > 0.0);
            }
            track.can_seek = self.can_seek;
            track.can_pause = self.can_pause;
            track
        });

        self.duration = track.as_ref().and_then(TrackInfo::known_duration);
        self.state.set_property(&CurrentTrack(track));
        Ok(())
    }

    fn refresh_transport_actions(&mut self) -> Result<()> {
        if !self.caps.has_transport_actions {
            return Ok(());
        }
        if let Some(actions) =
            tolerate_fault(self.control.get_current_transport_actions(), "GetCurrentTransportActions")?
        {
            let has = |name: &str| actions.iter().any(|a| a.eq_ignore_ascii_case(name));
            self.can_seek = self.caps.has_seek && (has("Seek") || has("X_DLNA_SeekTime"));
            self.can_pause = self.caps.has_pause && has("Pause");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Load and play the current tracklist entry; false with an empty list
    fn play_current(&mut self) -> Result<bool> {
        let Some(track) = self.tracklist.current() else {
            return Ok(false);
        };
        tracing::debug!("Renderer loading {}", track.uri);

        let metadata = track_to_didl(&track, &track.uri);
        self.our_uri = Some(track.uri.clone());
        self.next_uri = None;
        self.current_uri = None;
        self.finishing = false;
        self.stop_sent = false;

        if tolerate_fault(self.control.set_av_transport_uri(&track.uri, &metadata), "SetAVTransportURI")?.is_some() {
            tolerate_fault(self.control.play(), "Play")?;
        }
        self.last_renderer_poll = None;
        Ok(true)
    }

    /// Queue the upcoming track for a gapless transition
    fn queue_next(&mut self) -> Result<()> {
        if !self.caps.has_set_next || self.set_next_disabled || self.next_uri.is_some() {
            return Ok(());
        }
        let Some(next) = self.tracklist.peek_next() else {
            return Ok(());
        };
        // Same URI again cannot be told apart; the STOPPED path replays it
        if self.our_uri.as_deref() == Some(next.uri.as_str()) {
            return Ok(());
        }

        tracing::debug!("Renderer queueing next {}", next.uri);
        let metadata = track_to_didl(&next, &next.uri);
        match tolerate_fault(self.control.set_next_av_transport_uri(&next.uri, &metadata), "SetNextAVTransportURI")? {
            Some(()) => self.next_uri = Some(next.uri),
            None => {
                tracing::info!("Renderer refused SetNextAVTransportURI, using end-of-track transitions");
                self.set_next_disabled = true;
            }
        }
        Ok(())
    }

    /// Withdraw a queued next URI after the list or the mode changed
    fn clear_next(&mut self) -> Result<()> {
        if self.next_uri.take().is_some() {
            tolerate_fault(self.control.set_next_av_transport_uri("", ""), "SetNextAVTransportURI")?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop_sent = true;
        self.finishing = false;
        tolerate_fault(self.control.stop(), "Stop")?;
        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(
            self.status,
            PlayerStatus::Playing | PlayerStatus::Paused | PlayerStatus::Changing
        )
    }

    fn seek(&mut self, time: f64) -> Result<()> {
        if !self.can_seek {
            tracing::debug!("Renderer cannot seek");
            return Ok(());
        }
        tolerate_fault(self.control.seek_rel_time(&format_time(time)), "Seek")?;
        Ok(())
    }

    /// Play the new current track when playback is running
    fn current_moved(&mut self) -> Result<()> {
        self.clear_next()?;
        self.tracklist.publish(&self.state);
        if self.is_active() {
            self.play_current()?;
        }
        Ok(())
    }

    fn splice(&mut self, idx: Option<usize>, del: Option<usize>, tracks: Vec<TrackInfo>) -> Result<()> {
        if let Err(e) = self.tracklist.splice(idx, del, tracks) {
            tracing::warn!("Renderer splice rejected: {}", e);
            return Ok(());
        }
        if self.tracklist.list_changed() {
            self.clear_next()?;
        }
        if self.tracklist.current_changed() && self.ours && self.is_active() {
            self.stop()?;
        }
        self.tracklist.publish(&self.state);
        Ok(())
    }
}

/// Track published for a URI we did not load
fn mirror_track(uri: &str, metadata: Option<&str>) -> TrackInfo {
    let parsed = metadata.and_then(|didl| match track_from_didl(didl) {
        Ok(track) => Some(track),
        Err(e) => {
            tracing::debug!("Unreadable TrackMetaData: {}", e);
            None
        }
    });

    let mut track = parsed.unwrap_or_default();
    if track.uri.is_empty() {
        track.uri = uri.to_string();
    }
    if track.id.is_empty() {
        track.id = id_from_uri(&track.uri);
    }
    track
}

impl<C: UpnpControl> Backend for UpnpBackend<C> {
    fn ping(&mut self, now: Instant) -> Result<usize> {
        let mut work = 0;

        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event)?;
            work += 1;
        }

        let interval = self.config.upnp_poll_interval;
        let due = |last: Option<Instant>| last.map_or(true, |last| now.saturating_duration_since(last) >= interval);

        if due(self.last_transport_poll) {
            self.last_transport_poll = Some(now);
            self.poll_transport()?;
            work += 1;
        }

        if self.status == PlayerStatus::Playing && due(self.last_renderer_poll) {
            self.last_renderer_poll = Some(now);
            self.poll_renderer()?;
            work += 1;
        }

        Ok(work)
    }

    fn handle_msg(&mut self, cmd: BackendCommand, _now: Instant) -> Result<bool> {
        match cmd.resolve(&self.state) {
            BackendCommand::Play => {
                if self.status == PlayerStatus::Paused {
                    tolerate_fault(self.control.play(), "Play")?;
                } else if !self.play_current()? {
                    tolerate_fault(self.control.play(), "Play")?;
                }
            }
            BackendCommand::Pause => {
                if !self.can_pause {
                    tracing::debug!("Renderer cannot pause");
                } else if self.status == PlayerStatus::Playing {
                    tolerate_fault(self.control.pause(), "Pause")?;
                } else if self.status == PlayerStatus::Paused {
                    tolerate_fault(self.control.play(), "Play")?;
                }
            }
            BackendCommand::Stop => self.stop()?,
            BackendCommand::Next => {
                if self.tracklist.advance(true) {
                    self.current_moved()?;
                }
            }
            BackendCommand::Prev => {
                if self.tracklist.back() {
                    self.current_moved()?;
                }
            }
            BackendCommand::Seek { time } => self.seek(time)?,
            BackendCommand::SeekPercentage { value } => match self.duration {
                Some(duration) => self.seek(value.clamp(0.0, 1.0) * duration)?,
                None => tracing::debug!("Renderer seek by percentage without a known duration"),
            },
            BackendCommand::SetVolume { value } => match self.caps.volume_range {
                Some(range) => {
                    let value = value.clamp(0.0, 1.0);
                    if tolerate_fault(self.control.set_volume(range.float_to_int(value)), "SetVolume")?.is_some() {
                        self.volume = Some(value);
                        self.state.set_property(&Volume(value));
                    }
                }
                None => tracing::debug!("Renderer has no volume control"),
            },
            BackendCommand::SetMute { value } => {
                if !self.caps.has_mute {
                    tracing::debug!("Renderer has no mute control");
                } else if tolerate_fault(self.control.set_mute(value), "SetMute")?.is_some() {
                    self.apply_mute(value);
                }
            }
            BackendCommand::SetMode { mode } => {
                self.tracklist.set_mode(mode);
                self.state.set_property::<PlayerMode>(&mode);
                self.clear_next()?;
            }
            BackendCommand::SetCurrentTrack { id } => {
                if self.tracklist.set_current_by_id(&id) {
                    self.clear_next()?;
                    if self.ours && self.is_active() {
                        self.stop()?;
                    }
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
            other => tracing::debug!("Renderer ignores {}", other.name()),
        }
        Ok(true)
    }

    fn destroy(&mut self) {
        tracing::debug!("Detaching from UPnP renderer");
    }

    fn state(&self) -> &StateDict {
        &self.state
    }

    fn kind(&self) -> BackendKind {
        BackendKind::UpnpRenderer
    }
}
