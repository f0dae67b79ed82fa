//! `PlayerBus` over the D-Bus session bus, using the blocking zbus API

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread;

use zbus::blocking::fdo::PropertiesProxy;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{ObjectPath, OwnedValue, Value};

use super::bus::{Capabilities, Mpris2Metadata, PlaybackStatus, PlayerBus, PropertyChange};
use crate::error::{BackendError, Result};

const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const ROOT_INTERFACE: &str = "org.mpris.MediaPlayer2";
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// What the signal thread forwards
enum Signal {
    Change(PropertyChange),
    /// Metadata is re-read on the backend side
    MetadataChanged,
}

pub struct ZbusPlayerBus {
    root: Proxy<'static>,
    player: Proxy<'static>,
    signals: mpsc::Receiver<Signal>,
}

impl ZbusPlayerBus {
    /// Attach to `org.mpris.MediaPlayer2.<name>` on the session bus
    pub fn connect(name: &str) -> Result<Self> {
        let destination = format!("{}.{}", ROOT_INTERFACE, name);
        let conn = Connection::session().map_err(bus_error)?;

        let root = Proxy::new(&conn, destination.clone(), OBJECT_PATH, ROOT_INTERFACE).map_err(bus_error)?;
        let player =
            Proxy::new(&conn, destination.clone(), OBJECT_PATH, PLAYER_INTERFACE).map_err(bus_error)?;

        let (tx, signals) = mpsc::channel();
        spawn_signal_thread(conn, destination, tx)?;

        Ok(Self { root, player, signals })
    }

    fn call(&mut self, method: &str, body: &(impl serde::Serialize + zbus::zvariant::DynamicType)) -> Result<()> {
        self.player
            .call_method(method, body)
            .map(|_| ())
            .map_err(call_error)
    }

    fn property<T>(&self, name: &str) -> Result<T>
    where
        T: TryFrom<OwnedValue>,
        T::Error: Into<zbus::Error>,
    {
        self.player
            .get_property(name)
            .map_err(|e| BackendError::Bus(format!("{}: {}", name, e)))
    }
}

fn spawn_signal_thread(conn: Connection, destination: String, tx: mpsc::Sender<Signal>) -> Result<()> {
    let proxy = PropertiesProxy::builder(&conn)
        .destination(destination)
        .map_err(bus_error)?
        .path(OBJECT_PATH)
        .map_err(bus_error)?
        .build()
        .map_err(bus_error)?;

    thread::spawn(move || {
        let signals = match proxy.receive_properties_changed() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!("Cannot watch MPRIS2 properties: {}", e);
                return;
            }
        };

        for signal in signals {
            let Ok(args) = signal.args() else {
                continue;
            };
            if args.interface_name().as_str() != PLAYER_INTERFACE {
                continue;
            }
            for (name, value) in args.changed_properties() {
                let Some(signal) = signal_for(name, value) else {
                    continue;
                };
                if tx.send(signal).is_err() {
                    tracing::debug!("MPRIS2 backend gone, stopping signal thread");
                    return;
                }
            }
        }
    });
    Ok(())
}

fn signal_for(name: &str, value: &Value<'_>) -> Option<Signal> {
    let change = match name {
        "PlaybackStatus" => PropertyChange::PlaybackStatus(PlaybackStatus::parse(as_str(value)?)?),
        "Metadata" => return Some(Signal::MetadataChanged),
        "Volume" => PropertyChange::Volume(as_f64(value)?),
        "CanSeek" => PropertyChange::CanSeek(as_bool(value)?),
        "CanPause" => PropertyChange::CanPause(as_bool(value)?),
        _ => return None,
    };
    Some(Signal::Change(change))
}

fn bus_error(e: zbus::Error) -> BackendError {
    BackendError::Bus(e.to_string())
}

/// Method errors are refusals; anything else means the bus is unusable
fn call_error(e: zbus::Error) -> BackendError {
    match e {
        zbus::Error::MethodError(..) | zbus::Error::FDO(_) => BackendError::Protocol(e.to_string()),
        other => BackendError::Bus(other.to_string()),
    }
}

fn unwrap_variant<'v>(value: &'v Value<'v>) -> &'v Value<'v> {
    match value {
        Value::Value(inner) => unwrap_variant(inner),
        other => other,
    }
}

fn as_str<'v>(value: &'v Value<'v>) -> Option<&'v str> {
    match unwrap_variant(value) {
        Value::Str(s) => Some(s.as_str()),
        Value::ObjectPath(p) => Some(p.as_str()),
        _ => None,
    }
}

fn as_f64(value: &Value<'_>) -> Option<f64> {
    match unwrap_variant(value) {
        Value::F64(f) => Some(*f),
        _ => None,
    }
}

fn as_bool(value: &Value<'_>) -> Option<bool> {
    match unwrap_variant(value) {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn as_i64(value: &Value<'_>) -> Option<i64> {
    match unwrap_variant(value) {
        Value::I64(v) => Some(*v),
        Value::U64(v) => i64::try_from(*v).ok(),
        Value::I32(v) => Some(i64::from(*v)),
        Value::U32(v) => Some(i64::from(*v)),
        _ => None,
    }
}

fn as_strings(value: &Value<'_>) -> Vec<String> {
    match unwrap_variant(value) {
        Value::Array(array) => array.iter().filter_map(as_str).map(String::from).collect(),
        other => as_str(other).map(String::from).into_iter().collect(),
    }
}

fn parse_metadata(map: &HashMap<String, OwnedValue>) -> Mpris2Metadata {
    let get = |key: &str| map.get(key).map(|v| &**v);
    Mpris2Metadata {
        trackid: get("mpris:trackid").and_then(as_str).map(String::from),
        url: get("xesam:url").and_then(as_str).map(String::from),
        title: get("xesam:title").and_then(as_str).map(String::from),
        artist: get("xesam:artist").map(as_strings).unwrap_or_default(),
        album: get("xesam:album").and_then(as_str).map(String::from),
        genre: get("xesam:genre").map(as_strings).unwrap_or_default(),
        track_number: get("xesam:trackNumber")
            .and_then(as_i64)
            .and_then(|n| u32::try_from(n).ok()),
        length_us: get("mpris:length").and_then(as_i64),
        content_created: get("xesam:contentCreated").and_then(as_str).map(String::from),
    }
}

impl PlayerBus for ZbusPlayerBus {
    fn get_status(&mut self) -> Result<PlaybackStatus> {
        let status: String = self.property("PlaybackStatus")?;
        PlaybackStatus::parse(&status)
            .ok_or_else(|| BackendError::Protocol(format!("unknown PlaybackStatus {}", status)))
    }

    fn get_position(&mut self) -> Result<i64> {
        self.property("Position")
    }

    fn get_metadata(&mut self) -> Result<Mpris2Metadata> {
        let map: HashMap<String, OwnedValue> = self.property("Metadata")?;
        Ok(parse_metadata(&map))
    }

    fn get_volume(&mut self) -> Result<f64> {
        self.property("Volume")
    }

    fn capabilities(&mut self) -> Result<Capabilities> {
        Ok(Capabilities {
            can_seek: self.property("CanSeek")?,
            can_pause: self.property("CanPause")?,
            can_go_next: self.property("CanGoNext")?,
            can_go_previous: self.property("CanGoPrevious")?,
            can_play: self.property("CanPlay")?,
            can_control: self.property("CanControl")?,
        })
    }

    fn play(&mut self) -> Result<()> {
        self.call("Play", &())
    }

    fn pause(&mut self) -> Result<()> {
        self.call("Pause", &())
    }

    fn stop(&mut self) -> Result<()> {
        self.call("Stop", &())
    }

    fn next(&mut self) -> Result<()> {
        self.call("Next", &())
    }

    fn previous(&mut self) -> Result<()> {
        self.call("Previous", &())
    }

    fn seek(&mut self, offset_us: i64) -> Result<()> {
        self.call("Seek", &(offset_us,))
    }

    fn set_position(&mut self, track_id: &str, position_us: i64) -> Result<()> {
        let path = ObjectPath::try_from(track_id)
            .map_err(|e| BackendError::Protocol(format!("bad trackid {}: {}", track_id, e)))?;
        self.call("SetPosition", &(path, position_us))
    }

    fn open_uri(&mut self, uri: &str) -> Result<()> {
        self.call("OpenUri", &(uri,))
    }

    fn set_volume(&mut self, volume: f64) -> Result<()> {
        self.player
            .set_property("Volume", volume)
            .map_err(|e| BackendError::Protocol(e.to_string()))
    }

    fn identity(&mut self) -> Result<String> {
        self.root
            .get_property("Identity")
            .map_err(|e| BackendError::Bus(format!("Identity: {}", e)))
    }

    fn supported_mime_types(&mut self) -> Result<Vec<String>> {
        let value: OwnedValue = self
            .root
            .get_property("SupportedMimeTypes")
            .map_err(|e| BackendError::Bus(format!("SupportedMimeTypes: {}", e)))?;
        Ok(as_strings(&value))
    }

    fn drain_property_changes(&mut self) -> Vec<PropertyChange> {
        let mut changes = Vec::new();
        let mut metadata_changed = false;
        for signal in self.signals.try_iter() {
            match signal {
                Signal::Change(change) => changes.push(change),
                Signal::MetadataChanged => metadata_changed = true,
            }
        }

        if metadata_changed {
            match self.get_metadata() {
                Ok(metadata) => changes.push(PropertyChange::Metadata(metadata)),
                Err(e) => tracing::warn!("Cannot read MPRIS2 metadata: {}", e),
            }
        }
        changes
    }
}
