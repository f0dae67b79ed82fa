//! SSDP message construction
//!
//! Builds NOTIFY announcements, M-SEARCH requests and search replies for
//! local devices. Each device advertises a fixed group of notification
//! targets derived from its URI scheme.

use http_codec::HttpMessage;
use uuid::Uuid;

use crate::config::SsdpConfig;
use crate::registry::{Resource, ResourceClass};

/// Namespace for deriving device UUIDs from resource URIs
pub const UUID_NAMESPACE: Uuid = Uuid::from_u128(0x4c7a190f_4472_40ae_b801_f085e56dbcb8);

pub const UPNP_SERVER_NT_PREFIX: &str = "urn:schemas-upnp-org:device:MediaServer:";
pub const UPNP_RENDERER_NT_PREFIX: &str = "urn:schemas-upnp-org:device:MediaRenderer:";
pub const GMERLIN_SERVER_NT: &str = "urn:gmerlin-sourceforge-net:device:MediaServer:";
pub const GMERLIN_RENDERER_NT: &str = "urn:gmerlin-sourceforge-net:device:MediaRenderer:";

/// Header carrying the resource hash
pub const GMERLIN_ID_HEADER: &str = "GMERLIN-ID";

const HOST: &str = "239.255.255.250:1900";
const ROOT_DEVICE: &str = "upnp:rootdevice";

const RENDERER_SERVICES: &[&str] = &[
    "urn:schemas-upnp-org:service:ConnectionManager:1",
    "urn:schemas-upnp-org:service:RenderingControl:1",
    "urn:schemas-upnp-org:service:AVTransport:1",
];

const SERVER_SERVICES: &[&str] = &[
    "urn:schemas-upnp-org:service:ContentDirectory:1",
    "urn:schemas-upnp-org:service:ConnectionManager:1",
];

/// Stable UUID (version 3) of a resource URI
pub fn uri_to_uuid(uri: &str) -> String {
    Uuid::new_v3(&UUID_NAMESPACE, uri.as_bytes()).to_string()
}

/// Announceable device flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    UpnpRenderer,
    UpnpServer,
    GmerlinRenderer,
    GmerlinServer,
}

impl DeviceKind {
    pub fn from_uri(uri: &str) -> Option<Self> {
        let scheme = uri.split_once("://")?.0;
        match scheme {
            "upnp-renderer" => Some(DeviceKind::UpnpRenderer),
            "upnp-server" => Some(DeviceKind::UpnpServer),
            "gmerlin-renderer" => Some(DeviceKind::GmerlinRenderer),
            "gmerlin-mdb" => Some(DeviceKind::GmerlinServer),
            _ => None,
        }
    }

    pub fn is_upnp(self) -> bool {
        matches!(self, DeviceKind::UpnpRenderer | DeviceKind::UpnpServer)
    }

    pub fn class(self) -> ResourceClass {
        match self {
            DeviceKind::UpnpRenderer | DeviceKind::GmerlinRenderer => ResourceClass::Renderer,
            DeviceKind::UpnpServer | DeviceKind::GmerlinServer => ResourceClass::MediaServer,
        }
    }

    /// NT of the device-type target
    pub fn device_type(self) -> &'static str {
        match self {
            DeviceKind::UpnpRenderer => "urn:schemas-upnp-org:device:MediaRenderer:1",
            DeviceKind::UpnpServer => "urn:schemas-upnp-org:device:MediaServer:1",
            DeviceKind::GmerlinRenderer => GMERLIN_RENDERER_NT,
            DeviceKind::GmerlinServer => GMERLIN_SERVER_NT,
        }
    }

    pub fn service_types(self) -> &'static [&'static str] {
        match self {
            DeviceKind::UpnpRenderer => RENDERER_SERVICES,
            DeviceKind::UpnpServer => SERVER_SERVICES,
            DeviceKind::GmerlinRenderer | DeviceKind::GmerlinServer => &[],
        }
    }
}

/// One NT/USN pair of a device's announcement group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub nt: String,
    pub usn: String,
    /// The device-type target also carries `GMERLIN-ID`
    pub carries_id: bool,
}

/// A local resource in announceable form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDevice {
    pub uri: String,
    pub uuid: String,
    pub kind: DeviceKind,
    pub hash: Option<String>,
}

impl LocalDevice {
    /// `None` for URI schemes that are not announced over SSDP
    pub fn from_resource(resource: &Resource) -> Option<Self> {
        let kind = DeviceKind::from_uri(&resource.uri)?;
        Some(Self {
            uri: resource.uri.clone(),
            uuid: uri_to_uuid(&resource.uri),
            kind,
            hash: resource.hash.clone(),
        })
    }

    /// Value of the LOCATION header
    ///
    /// UPnP devices swap their scheme for `http`, gmerlin devices are
    /// located by their URI itself.
    pub fn location(&self) -> String {
        match (self.kind.is_upnp(), self.uri.find("://")) {
            (true, Some(pos)) => format!("http{}", &self.uri[pos..]),
            _ => self.uri.clone(),
        }
    }

    /// The full announcement group, in sending order
    pub fn targets(&self) -> Vec<Target> {
        let uuid = &self.uuid;
        let device_type = self.kind.device_type();
        let mut targets = Vec::with_capacity(2 + self.kind.service_types().len() + 1);

        if self.kind.is_upnp() {
            targets.push(Target {
                nt: ROOT_DEVICE.to_string(),
                usn: format!("uuid:{}::{}", uuid, ROOT_DEVICE),
                carries_id: false,
            });
            targets.push(Target {
                nt: format!("uuid:{}", uuid),
                usn: format!("uuid:{}", uuid),
                carries_id: false,
            });
        }

        targets.push(Target {
            nt: device_type.to_string(),
            usn: format!("uuid:{}::{}", uuid, device_type),
            carries_id: true,
        });

        for service in self.kind.service_types() {
            targets.push(Target {
                nt: service.to_string(),
                usn: format!("uuid:{}::{}", uuid, service),
                carries_id: false,
            });
        }

        targets
    }

    /// Targets answering a search for `st`
    ///
    /// Type searches only match types this device exposes.
    pub fn search_targets(&self, st: &str) -> Vec<Target> {
        let st = st.trim();
        if st.eq_ignore_ascii_case("ssdp:all") {
            return self.targets();
        }

        if st.eq_ignore_ascii_case(ROOT_DEVICE) {
            return self
                .targets()
                .into_iter()
                .filter(|t| t.nt == ROOT_DEVICE)
                .collect();
        }

        if let Some(requested) = strip_prefix_i(st, "uuid:") {
            if !self.kind.is_upnp() || requested != self.uuid {
                return Vec::new();
            }
            return self
                .targets()
                .into_iter()
                .filter(|t| t.nt.starts_with("uuid:"))
                .collect();
        }

        self.targets()
            .into_iter()
            .filter(|t| t.nt.starts_with("urn:") && t.nt.eq_ignore_ascii_case(st))
            .collect()
    }
}

fn strip_prefix_i<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Case-insensitive `starts_with`
pub(crate) fn starts_with_i(s: &str, prefix: &str) -> bool {
    strip_prefix_i(s, prefix).is_some()
}

/// `NOTIFY` for one target, `ssdp:alive` or `ssdp:byebye`
pub fn notify_message(
    device: &LocalDevice,
    target: &Target,
    alive: bool,
    config: &SsdpConfig,
) -> HttpMessage {
    let mut msg = HttpMessage::request("NOTIFY", "*").with_header("HOST", HOST);
    if alive {
        msg = msg.with_header("CACHE-CONTROL", format!("max-age={}", config.max_age));
    }
    msg = msg
        .with_header("LOCATION", device.location())
        .with_header("NT", target.nt.as_str())
        .with_header("NTS", if alive { "ssdp:alive" } else { "ssdp:byebye" })
        .with_header("SERVER", config.server_string.as_str())
        .with_header("USN", target.usn.as_str());
    with_id(msg, device, target)
}

/// Unicast answer to an M-SEARCH
pub fn search_reply(device: &LocalDevice, target: &Target, config: &SsdpConfig) -> HttpMessage {
    let msg = HttpMessage::response(200, "OK")
        .with_header("CACHE-CONTROL", format!("max-age={}", config.max_age))
        .with_header("EXT", "")
        .with_header("LOCATION", device.location())
        .with_header("SERVER", config.server_string.as_str())
        .with_header("ST", target.nt.as_str())
        .with_header("USN", target.usn.as_str());
    with_id(msg, device, target)
}

fn with_id(msg: HttpMessage, device: &LocalDevice, target: &Target) -> HttpMessage {
    match (&device.hash, target.carries_id) {
        (Some(hash), true) => msg.with_header(GMERLIN_ID_HEADER, hash.as_str()),
        _ => msg,
    }
}

/// `M-SEARCH` for every device on the network
pub fn search_request(mx: u32) -> HttpMessage {
    HttpMessage::request("M-SEARCH", "*")
        .with_header("HOST", HOST)
        .with_header("MAN", "\"ssdp:discover\"")
        .with_header("MX", mx.to_string())
        .with_header("ST", "ssdp:all")
}
