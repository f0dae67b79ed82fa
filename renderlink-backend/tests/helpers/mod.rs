//! In-memory players for driving the backends without sockets or a bus
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use renderlink_backend::mpd::MpdConnection;
use renderlink_backend::mpris2::{Capabilities, Mpris2Metadata, PlaybackStatus, PlayerBus, PropertyChange};
use renderlink_backend::upnp::{PositionInfo, UpnpControl};
use renderlink_backend::{BackendError, Result};
use soap_client::SoapError;
use state_store::TrackInfo;

pub fn track(id: &str, duration: Option<f64>) -> TrackInfo {
    TrackInfo {
        id: id.to_string(),
        uri: format!("http://media/{}.flac", id),
        duration,
        ..Default::default()
    }
}

// ============================================================================
// MPD
// ============================================================================

/// MPD server answering from per-command scripts
///
/// Each command word has a queue of replies; the last one repeats. `OK`
/// is appended unless the reply ends with an `ACK` line.
pub struct ScriptedMpd {
    pub sent: Vec<String>,
    /// Set to make the server drop the connection
    pub hung_up: bool,
    replies: HashMap<String, VecDeque<Vec<String>>>,
    pending: VecDeque<String>,
}

impl ScriptedMpd {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            hung_up: false,
            replies: HashMap::new(),
            pending: VecDeque::from(vec!["OK MPD 0.23.5".to_string()]),
        }
    }

    pub fn reply(mut self, command: &str, lines: &[&str]) -> Self {
        self.replies
            .entry(command.to_string())
            .or_default()
            .push_back(lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Replace the script of `command`
    pub fn set_reply(&mut self, command: &str, lines: &[&str]) {
        let mut queue = VecDeque::new();
        queue.push_back(lines.iter().map(|l| l.to_string()).collect());
        self.replies.insert(command.to_string(), queue);
    }

    pub fn sent_with(&self, prefix: &str) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|l| l.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }
}

impl MpdConnection for ScriptedMpd {
    fn send_line(&mut self, line: &str) -> Result<()> {
        if self.hung_up {
            return Err(BackendError::Disconnected);
        }
        self.sent.push(line.to_string());
        let word = line.split(' ').next().unwrap_or_default();
        let lines = match self.replies.get_mut(word) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => Vec::new(),
        };
        let acked = lines.last().map_or(false, |l| l.starts_with("ACK"));
        self.pending.extend(lines);
        if !acked {
            self.pending.push_back("OK".to_string());
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        self.pending.pop_front().ok_or(BackendError::Disconnected)
    }
}

// ============================================================================
// MPRIS2
// ============================================================================

/// Player bus whose properties are set by the test
pub struct FakeBus {
    pub calls: Vec<String>,
    pub status: PlaybackStatus,
    /// Microseconds
    pub position: i64,
    pub metadata: Mpris2Metadata,
    pub caps: Capabilities,
    pub volume: f64,
    pub changes: Vec<PropertyChange>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            status: PlaybackStatus::Stopped,
            position: 0,
            metadata: Mpris2Metadata::default(),
            caps: Capabilities {
                can_seek: true,
                can_pause: true,
                can_go_next: true,
                can_go_previous: true,
                can_play: true,
                can_control: true,
            },
            volume: 0.5,
            changes: Vec::new(),
        }
    }

    /// Change the status and signal it
    pub fn signal_status(&mut self, status: PlaybackStatus) {
        self.status = status;
        self.changes.push(PropertyChange::PlaybackStatus(status));
    }

    /// Change the metadata and signal it
    pub fn signal_metadata(&mut self, metadata: Mpris2Metadata) {
        self.metadata = metadata.clone();
        self.changes.push(PropertyChange::Metadata(metadata));
    }
}

impl PlayerBus for FakeBus {
    fn get_status(&mut self) -> Result<PlaybackStatus> {
        Ok(self.status)
    }
    fn get_position(&mut self) -> Result<i64> {
        Ok(self.position)
    }
    fn get_metadata(&mut self) -> Result<Mpris2Metadata> {
        Ok(self.metadata.clone())
    }
    fn get_volume(&mut self) -> Result<f64> {
        Ok(self.volume)
    }
    fn capabilities(&mut self) -> Result<Capabilities> {
        Ok(self.caps)
    }
    fn play(&mut self) -> Result<()> {
        self.calls.push("Play".into());
        Ok(())
    }
    fn pause(&mut self) -> Result<()> {
        self.calls.push("Pause".into());
        Ok(())
    }
    fn stop(&mut self) -> Result<()> {
        self.calls.push("Stop".into());
        Ok(())
    }
    fn next(&mut self) -> Result<()> {
        self.calls.push("Next".into());
        Ok(())
    }
    fn previous(&mut self) -> Result<()> {
        self.calls.push("Previous".into());
        Ok(())
    }
    fn seek(&mut self, offset_us: i64) -> Result<()> {
        self.calls.push(format!("Seek {}", offset_us));
        Ok(())
    }
    fn set_position(&mut self, track_id: &str, position_us: i64) -> Result<()> {
        self.calls.push(format!("SetPosition {} {}", track_id, position_us));
        Ok(())
    }
    fn open_uri(&mut self, uri: &str) -> Result<()> {
        self.calls.push(format!("OpenUri {}", uri));
        Ok(())
    }
    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.calls.push(format!("Volume {}", volume));
        self.volume = volume;
        Ok(())
    }
    fn identity(&mut self) -> Result<String> {
        Ok("Test Player".into())
    }
    fn supported_mime_types(&mut self) -> Result<Vec<String>> {
        Ok(vec!["audio/mpeg".into(), "audio/flac".into()])
    }
    fn drain_property_changes(&mut self) -> Vec<PropertyChange> {
        std::mem::take(&mut self.changes)
    }
}

// ============================================================================
// UPnP
// ============================================================================

/// Renderer whose SOAP answers are set by the test
///
/// Actions named in `refuse` fail with UPnP error 701.
pub struct FakeControl {
    pub calls: Vec<String>,
    pub transport_state: String,
    pub position: PositionInfo,
    pub volume: i64,
    pub mute: bool,
    pub actions: Vec<String>,
    pub refuse: HashSet<&'static str>,
    /// Set to make every call fail as if the renderer went away
    pub offline: bool,
    /// Go offline after this many more calls
    pub calls_left: Option<usize>,
}

impl FakeControl {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            transport_state: "STOPPED".into(),
            position: PositionInfo::default(),
            volume: 30,
            mute: false,
            actions: vec!["Play".into(), "Stop".into(), "Pause".into(), "Seek".into()],
            refuse: HashSet::new(),
            offline: false,
            calls_left: None,
        }
    }

    /// Report `uri` as playing at `time` of `duration` seconds
    pub fn playing(&mut self, uri: &str, time: f64, duration: f64) {
        self.transport_state = "PLAYING".into();
        self.position = PositionInfo {
            track_uri: Some(uri.to_string()),
            track_metadata: None,
            track_duration: Some(duration),
            rel_time: Some(time),
        };
    }

    fn check(&mut self) -> Result<()> {
        if let Some(left) = self.calls_left.as_mut() {
            if *left == 0 {
                self.offline = true;
            } else {
                *left -= 1;
            }
        }
        if self.offline {
            return Err(BackendError::Soap(SoapError::Network("connection refused".into())));
        }
        Ok(())
    }

    fn record(&mut self, name: &'static str, call: String) -> Result<()> {
        self.check()?;
        self.calls.push(call);
        if self.refuse.contains(name) {
            return Err(BackendError::Soap(SoapError::Fault(701)));
        }
        Ok(())
    }
}

impl UpnpControl for FakeControl {
    fn get_position_info(&mut self) -> Result<PositionInfo> {
        self.check()?;
        Ok(self.position.clone())
    }
    fn get_transport_info(&mut self) -> Result<String> {
        self.check()?;
        Ok(self.transport_state.clone())
    }
    fn get_current_transport_actions(&mut self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.actions.clone())
    }
    fn set_av_transport_uri(&mut self, uri: &str, _metadata: &str) -> Result<()> {
        self.record("SetAVTransportURI", format!("SetAVTransportURI {}", uri))
    }
    fn set_next_av_transport_uri(&mut self, uri: &str, _metadata: &str) -> Result<()> {
        self.record("SetNextAVTransportURI", format!("SetNextAVTransportURI {}", uri))
    }
    fn play(&mut self) -> Result<()> {
        self.record("Play", "Play".into())
    }
    fn pause(&mut self) -> Result<()> {
        self.record("Pause", "Pause".into())
    }
    fn stop(&mut self) -> Result<()> {
        self.record("Stop", "Stop".into())
    }
    fn seek_rel_time(&mut self, target: &str) -> Result<()> {
        self.record("Seek", format!("Seek {}", target))
    }
    fn get_volume(&mut self) -> Result<i64> {
        self.check()?;
        Ok(self.volume)
    }
    fn set_volume(&mut self, volume: i64) -> Result<()> {
        self.record("SetVolume", format!("SetVolume {}", volume))?;
        self.volume = volume;
        Ok(())
    }
    fn get_mute(&mut self) -> Result<bool> {
        self.check()?;
        Ok(self.mute)
    }
    fn set_mute(&mut self, mute: bool) -> Result<()> {
        self.record("SetMute", format!("SetMute {}", mute))
    }
    fn get_protocol_info(&mut self) -> Result<String> {
        self.check()?;
        Ok("http-get:*:audio/mpeg:*,http-get:*:audio/flac:*".into())
    }
}
