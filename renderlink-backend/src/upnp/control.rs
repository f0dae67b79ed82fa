//! UPnP renderer control over SOAP
//!
//! `UpnpControl` is the action set the adapter needs from AVTransport,
//! RenderingControl and ConnectionManager. `SoapUpnpControl` implements
//! it with `soap-client`; tests drive the adapter with in-memory fakes.

use soap_client::description::{AV_TRANSPORT, CONNECTION_MANAGER, MEDIA_RENDERER, RENDERING_CONTROL};
use soap_client::{child_text, DeviceDescription, Scpd, ServiceEndpoints, SoapClient, ValueRange};
use xmltree::Element;

use super::time::parse_time;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

/// `GetPositionInfo` response, times in seconds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionInfo {
    pub track_uri: Option<String>,
    /// DIDL-Lite document
    pub track_metadata: Option<String>,
    pub track_duration: Option<f64>,
    pub rel_time: Option<f64>,
}

impl PositionInfo {
    fn from_response(response: &Element) -> Self {
        let text = |name: &str| {
            child_text(response, name)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty() && t != "NOT_IMPLEMENTED")
        };
        Self {
            track_uri: text("TrackURI"),
            track_metadata: text("TrackMetaData"),
            track_duration: text("TrackDuration").as_deref().and_then(parse_time),
            rel_time: text("RelTime").as_deref().and_then(parse_time),
        }
    }
}

/// SOAP actions used on a MediaRenderer
///
/// All AVTransport and RenderingControl calls address instance 0;
/// RenderingControl calls use the `Master` channel.
pub trait UpnpControl: Send {
    fn get_position_info(&mut self) -> Result<PositionInfo>;

    /// `CurrentTransportState`, e.g. `PLAYING`
    fn get_transport_info(&mut self) -> Result<String>;

    /// Action names, e.g. `["Play", "Pause", "Seek"]`
    fn get_current_transport_actions(&mut self) -> Result<Vec<String>>;

    fn set_av_transport_uri(&mut self, uri: &str, metadata: &str) -> Result<()>;

    fn set_next_av_transport_uri(&mut self, uri: &str, metadata: &str) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Seek with unit `REL_TIME`, target formatted `H:MM:SS.mmm`
    fn seek_rel_time(&mut self, target: &str) -> Result<()>;

    /// Device volume in the advertised range
    fn get_volume(&mut self) -> Result<i64>;

    fn set_volume(&mut self, volume: i64) -> Result<()>;

    fn get_mute(&mut self) -> Result<bool>;

    fn set_mute(&mut self, mute: bool) -> Result<()>;

    /// `Sink` of `GetProtocolInfo`
    fn get_protocol_info(&mut self) -> Result<String>;
}

/// What a renderer supports, from its service descriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererCapabilities {
    pub has_set_next: bool,
    pub has_transport_actions: bool,
    pub has_pause: bool,
    pub has_seek: bool,
    /// Range of the `Volume` variable, when `SetVolume` exists
    pub volume_range: Option<ValueRange>,
    pub has_mute: bool,
}

impl RendererCapabilities {
    pub fn from_scpds(av_transport: &Scpd, rendering_control: Option<&Scpd>) -> Self {
        let volume_range = rendering_control
            .filter(|rc| rc.has_action("SetVolume"))
            .and_then(|rc| rc.variable("Volume"))
            .and_then(|v| v.range)
            .filter(|r| r.max > r.min);

        let has_mute = rendering_control
            .map(|rc| rc.has_action("SetMute") && rc.variable("Mute").is_some())
            .unwrap_or(false);

        Self {
            has_set_next: av_transport.has_action("SetNextAVTransportURI"),
            has_transport_actions: av_transport.has_action("GetCurrentTransportActions"),
            has_pause: av_transport.has_action("Pause"),
            has_seek: av_transport.has_action("Seek")
                && av_transport.allows_value("A_ARG_TYPE_SeekMode", "REL_TIME"),
            volume_range,
            has_mute,
        }
    }

    pub fn has_volume(&self) -> bool {
        self.volume_range.is_some()
    }
}

/// Mimetypes playable over `http-get`, from a protocol info list
///
/// Entries look like `http-get:*:audio/mpeg:DLNA.ORG_PN=MP3`.
pub fn parse_protocol_info(sink: &str) -> Vec<String> {
    let mut mimetypes: Vec<String> = Vec::new();
    for entry in sink.split(',') {
        let mut fields = entry.trim().split(':');
        if fields.next() != Some("http-get") {
            continue;
        }
        let Some(mimetype) = fields.nth(1).map(str::trim) else {
            continue;
        };
        if mimetype.is_empty() || mimetype == "*" {
            continue;
        }
        if !mimetypes.iter().any(|m| m == mimetype) {
            mimetypes.push(mimetype.to_string());
        }
    }
    mimetypes
}

/// A renderer reached through its description document
pub struct SoapUpnpControl {
    client: SoapClient,
    description: DeviceDescription,
    av_transport: ServiceEndpoints,
    rendering_control: Option<ServiceEndpoints>,
    connection_manager: Option<ServiceEndpoints>,
    capabilities: RendererCapabilities,
}

impl SoapUpnpControl {
    /// Fetch the description at `url` and probe the service descriptions
    pub fn probe(url: &str, config: &BackendConfig) -> Result<Self> {
        let client = SoapClient::with_timeouts(config.soap_connect_timeout, config.soap_read_timeout);

        let root = client.fetch_xml(url)?;
        let description = DeviceDescription::from_element(&root, url, MEDIA_RENDERER)?;

        let av_transport = description
            .av_transport()
            .cloned()
            .ok_or_else(|| BackendError::Protocol(format!("{} has no AVTransport service", url)))?;
        let rendering_control = description.rendering_control().cloned();
        let connection_manager = description.connection_manager().cloned();

        let av_scpd = Scpd::from_element(&client.fetch_xml(&av_transport.scpd_url)?);
        let rc_scpd = match &rendering_control {
            Some(rc) => match client.fetch_xml(&rc.scpd_url) {
                Ok(root) => Some(Scpd::from_element(&root)),
                Err(e) => {
                    tracing::warn!("Cannot read RenderingControl description: {}", e);
                    None
                }
            },
            None => None,
        };

        let capabilities = RendererCapabilities::from_scpds(&av_scpd, rc_scpd.as_ref());
        tracing::debug!("Renderer {} capabilities: {:?}", description.friendly_name, capabilities);

        Ok(Self {
            client,
            description,
            av_transport,
            rendering_control,
            connection_manager,
            capabilities,
        })
    }

    pub fn description(&self) -> &DeviceDescription {
        &self.description
    }

    pub fn capabilities(&self) -> RendererCapabilities {
        self.capabilities
    }

    fn av(&self, action: &str, args: &[(&str, &str)]) -> Result<Element> {
        let mut all = vec![("InstanceID", "0")];
        all.extend_from_slice(args);
        let service_type = service_type(&self.av_transport, AV_TRANSPORT);
        Ok(self
            .client
            .call(&self.av_transport.control_url, service_type, action, &all)?)
    }

    fn rc(&self, action: &str, args: &[(&str, &str)]) -> Result<Element> {
        let rc = self
            .rendering_control
            .as_ref()
            .ok_or_else(|| BackendError::Protocol("renderer has no RenderingControl service".into()))?;
        let mut all = vec![("InstanceID", "0"), ("Channel", "Master")];
        all.extend_from_slice(args);
        Ok(self
            .client
            .call(&rc.control_url, service_type(rc, RENDERING_CONTROL), action, &all)?)
    }
}

fn service_type<'a>(service: &'a ServiceEndpoints, fallback: &'a str) -> &'a str {
    if service.service_type.is_empty() {
        fallback
    } else {
        &service.service_type
    }
}

fn response_value(response: &Element, name: &str) -> Result<String> {
    child_text(response, name)
        .map(|t| t.trim().to_string())
        .ok_or_else(|| BackendError::Protocol(format!("{} missing from {}", name, response.name)))
}

/// UPnP boolean state variable value
pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True" | "TRUE" | "yes")
}

impl UpnpControl for SoapUpnpControl {
    fn get_position_info(&mut self) -> Result<PositionInfo> {
        let response = self.av("GetPositionInfo", &[])?;
        Ok(PositionInfo::from_response(&response))
    }

    fn get_transport_info(&mut self) -> Result<String> {
        let response = self.av("GetTransportInfo", &[])?;
        response_value(&response, "CurrentTransportState")
    }

    fn get_current_transport_actions(&mut self) -> Result<Vec<String>> {
        let response = self.av("GetCurrentTransportActions", &[])?;
        Ok(response_value(&response, "Actions")?
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect())
    }

    fn set_av_transport_uri(&mut self, uri: &str, metadata: &str) -> Result<()> {
        self.av("SetAVTransportURI", &[("CurrentURI", uri), ("CurrentURIMetaData", metadata)])?;
        Ok(())
    }

    fn set_next_av_transport_uri(&mut self, uri: &str, metadata: &str) -> Result<()> {
        self.av("SetNextAVTransportURI", &[("NextURI", uri), ("NextURIMetaData", metadata)])?;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.av("Play", &[("Speed", "1")])?;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.av("Pause", &[])?;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.av("Stop", &[])?;
        Ok(())
    }

    fn seek_rel_time(&mut self, target: &str) -> Result<()> {
        self.av("Seek", &[("Unit", "REL_TIME"), ("Target", target)])?;
        Ok(())
    }

    fn get_volume(&mut self) -> Result<i64> {
        let response = self.rc("GetVolume", &[])?;
        let value = response_value(&response, "CurrentVolume")?;
        value
            .parse()
            .map_err(|_| BackendError::Protocol(format!("bad CurrentVolume {}", value)))
    }

    fn set_volume(&mut self, volume: i64) -> Result<()> {
        let volume = volume.to_string();
        self.rc("SetVolume", &[("DesiredVolume", volume.as_str())])?;
        Ok(())
    }

    fn get_mute(&mut self) -> Result<bool> {
        let response = self.rc("GetMute", &[])?;
        Ok(parse_bool(&response_value(&response, "CurrentMute")?))
    }

    fn set_mute(&mut self, mute: bool) -> Result<()> {
        self.rc("SetMute", &[("DesiredMute", if mute { "1" } else { "0" })])?;
        Ok(())
    }

    fn get_protocol_info(&mut self) -> Result<String> {
        let cm = self
            .connection_manager
            .as_ref()
            .ok_or_else(|| BackendError::Protocol("renderer has no ConnectionManager service".into()))?;
        let response = self
            .client
            .call(&cm.control_url, service_type(cm, CONNECTION_MANAGER), "GetProtocolInfo", &[])?;
        Ok(child_text(&response, "Sink").unwrap_or_default())
    }
}
