//! DIDL-Lite track metadata
//!
//! Renderers report the playing item as DIDL-Lite in `TrackMetaData`
//! and expect the same format in `CurrentURIMetaData`. Parsing goes
//! through serde after namespace prefixes are stripped, so the structs
//! name elements by their local names (`title`, not `dc:title`).

use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use state_store::{id_from_uri, TrackInfo};

use super::time::{format_time, parse_time};
use crate::error::{BackendError, Result};

/// DIDL-Lite root element
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename = "DIDL-Lite")]
pub struct DidlLite {
    #[serde(rename = "item", default)]
    pub items: Vec<DidlItem>,
}

impl DidlLite {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let stripped = strip_namespaces(xml)?;
        quick_xml::de::from_str(&stripped).map_err(|e| BackendError::Protocol(format!("bad DIDL-Lite: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DidlItem {
    #[serde(rename = "@id", default)]
    pub id: String,

    #[serde(rename = "title", default)]
    pub title: Option<String>,

    #[serde(rename = "creator", default)]
    pub creator: Option<String>,

    #[serde(rename = "artist", default)]
    pub artists: Vec<DidlArtist>,

    #[serde(rename = "album", default)]
    pub album: Option<String>,

    #[serde(rename = "genre", default)]
    pub genre: Option<String>,

    #[serde(rename = "date", default)]
    pub date: Option<String>,

    #[serde(rename = "originalTrackNumber", default)]
    pub original_track_number: Option<u32>,

    /// e.g. `object.item.audioItem.musicTrack`
    #[serde(rename = "class", default)]
    pub class: Option<String>,

    #[serde(rename = "res", default)]
    pub resources: Vec<DidlResource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DidlArtist {
    #[serde(rename = "@role", default)]
    pub role: Option<String>,

    #[serde(rename = "$value", default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct DidlResource {
    /// `H:MM:SS` format
    #[serde(rename = "@duration", default)]
    pub duration: Option<String>,

    /// `protocol:network:mimetype:info`
    #[serde(rename = "@protocolInfo", default)]
    pub protocol_info: Option<String>,

    #[serde(rename = "$value", default)]
    pub uri: Option<String>,
}

impl DidlResource {
    /// Third field of the protocol info
    pub fn mimetype(&self) -> Option<&str> {
        self.protocol_info
            .as_deref()
            .and_then(|p| p.split(':').nth(2))
            .filter(|m| !m.is_empty() && *m != "*")
    }
}

/// Remove namespace prefixes from element and attribute names, and drop
/// `xmlns` declarations
pub fn strip_namespaces(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let err = |e: &dyn std::fmt::Display| BackendError::Protocol(format!("bad XML: {}", e));

    loop {
        let event = reader.read_event().map_err(|e| err(&e))?;
        let event = match event {
            Event::Start(start) => Event::Start(local_start(&start)),
            Event::Empty(start) => Event::Empty(local_start(&start)),
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.local_name().as_ref()).into_owned();
                Event::End(BytesEnd::new(name))
            }
            Event::Eof => break,
            other => other,
        };
        writer.write_event(event).map_err(|e| err(&e))?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| err(&e))
}

fn local_start(start: &BytesStart<'_>) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut stripped = BytesStart::new(name);

    for attr in start.attributes().flatten() {
        let key = attr.key;
        let is_declaration =
            key.as_ref() == b"xmlns" || key.prefix().map_or(false, |p| p.as_ref() == b"xmlns");
        if !is_declaration {
            stripped.push_attribute((key.local_name().as_ref(), attr.value.as_ref()));
        }
    }
    stripped
}

/// Track metadata of the first item in a DIDL-Lite document
pub fn track_from_didl(xml: &str) -> Result<TrackInfo> {
    let didl = DidlLite::from_xml(xml)?;
    let item = didl
        .items
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Protocol("DIDL-Lite without item".to_string()))?;

    let artists: Vec<&str> = item
        .artists
        .iter()
        .map(|a| a.name.trim())
        .filter(|a| !a.is_empty())
        .collect();
    let artist = if artists.is_empty() {
        item.creator.clone()
    } else {
        Some(artists.join(", "))
    };

    let resource = item
        .resources
        .iter()
        .find(|r| r.uri.as_deref().map_or(false, |u| !u.trim().is_empty()))
        .or_else(|| item.resources.first());

    let uri = resource
        .and_then(|r| r.uri.as_deref())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    Ok(TrackInfo {
        id: if uri.is_empty() { String::new() } else { id_from_uri(&uri) },
        title: item.title,
        artist,
        album: item.album,
        genre: item.genre,
        date: item.date,
        track_number: item.original_track_number,
        duration: item
            .resources
            .iter()
            .find_map(|r| r.duration.as_deref().and_then(parse_time))
            .filter(|d| *d > 0.0),
        mimetype: resource.and_then(DidlResource::mimetype).map(String::from),
        uri,
        ..Default::default()
    })
}

/// DIDL-Lite document describing `track` at `uri`
pub fn track_to_didl(track: &TrackInfo, uri: &str) -> String {
    let mut item = String::new();

    let mut element = |name: &str, value: &Option<String>| {
        if let Some(value) = value {
            item.push_str(&format!("<{name}>{}</{name}>", escape(value.as_str()), name = name));
        }
    };
    element("dc:title", &track.title.clone().or_else(|| Some(track.display_label())));
    element("upnp:artist", &track.artist);
    element("dc:creator", &track.artist);
    element("upnp:album", &track.album);
    element("upnp:genre", &track.genre);
    element("dc:date", &track.date);

    let class = match track.mimetype.as_deref() {
        Some(m) if m.starts_with("video/") => "object.item.videoItem",
        Some(m) if m.starts_with("image/") => "object.item.imageItem.photo",
        _ => "object.item.audioItem.musicTrack",
    };
    item.push_str(&format!("<upnp:class>{}</upnp:class>", class));

    let protocol_info = format!("http-get:*:{}:*", track.mimetype.as_deref().unwrap_or("*"));
    let duration = track
        .known_duration()
        .map(|d| format!(" duration=\"{}\"", format_time(d)))
        .unwrap_or_default();
    item.push_str(&format!(
        "<res protocolInfo=\"{}\"{}>{}</res>",
        escape(protocol_info.as_str()),
        duration,
        escape(uri)
    ));

    format!(
        concat!(
            "<DIDL-Lite xmlns=\"urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/\" ",
            "xmlns:dc=\"http://purl.org/dc/elements/1.1/\" ",
            "xmlns:upnp=\"urn:schemas-upnp-org:metadata-1-0/upnp/\">",
            "<item id=\"{}\" parentID=\"-1\" restricted=\"1\">{}</item></DIDL-Lite>"
        ),
        escape(track.id.as_str()),
        item
    )
}
