//! UPnP device and service description documents
//!
//! `DeviceDescription` locates one device inside a description document
//! (searching nested `deviceList`s) and resolves its service URLs.
//! `Scpd` lists the actions and state variables of one service, which is
//! what capability probing looks at.

use url::Url;
use xmltree::Element;

use crate::{child_text, SoapError};

pub const MEDIA_RENDERER: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
pub const AV_TRANSPORT: &str = "urn:schemas-upnp-org:service:AVTransport:1";
pub const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:1";
pub const CONNECTION_MANAGER: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

/// Absolute URLs of one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_url: String,
    pub scpd_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub mimetype: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub device_type: String,
    pub friendly_name: String,
    pub udn: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub icons: Vec<Icon>,
    pub services: Vec<ServiceEndpoints>,
    /// Base every relative URL was resolved against
    pub base_url: String,
}

impl DeviceDescription {
    /// Parse the MediaRenderer device out of a description document
    pub fn parse_renderer(xml: &str, document_url: &str) -> Result<Self, SoapError> {
        Self::parse(xml, document_url, MEDIA_RENDERER)
    }

    /// Parse the device of `device_type` out of a description document
    ///
    /// Relative URLs resolve against `URLBase` when present, otherwise
    /// against the URL the document was fetched from.
    pub fn parse(xml: &str, document_url: &str, device_type: &str) -> Result<Self, SoapError> {
        let root = Element::parse(xml.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;
        Self::from_element(&root, document_url, device_type)
    }

    pub fn from_element(root: &Element, document_url: &str, device_type: &str) -> Result<Self, SoapError> {
        let base = child_text(root, "URLBase")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| document_url.to_string());
        let base_url = Url::parse(&base).map_err(|e| SoapError::Parse(format!("bad base URL {}: {}", base, e)))?;

        let device = root
            .get_child("device")
            .and_then(|d| find_device(d, device_type))
            .ok_or_else(|| SoapError::Parse(format!("no {} device in description", device_type)))?;

        let resolve = |path: &str| -> Result<String, SoapError> {
            base_url
                .join(path.trim())
                .map(String::from)
                .map_err(|e| SoapError::Parse(format!("bad URL {}: {}", path, e)))
        };

        let mut services = Vec::new();
        if let Some(list) = device.get_child("serviceList") {
            for service in elements(list).filter(|e| e.name == "service") {
                let text = |name: &str| child_text(service, name).unwrap_or_default();
                services.push(ServiceEndpoints {
                    service_type: text("serviceType").trim().to_string(),
                    service_id: text("serviceId").trim().to_string(),
                    control_url: resolve(&text("controlURL"))?,
                    event_url: resolve(&text("eventSubURL"))?,
                    scpd_url: resolve(&text("SCPDURL"))?,
                });
            }
        }

        let mut icons = Vec::new();
        if let Some(list) = device.get_child("iconList") {
            for icon in elements(list).filter(|e| e.name == "icon") {
                let Some(url) = child_text(icon, "url") else {
                    continue;
                };
                let number = |name: &str| {
                    child_text(icon, name)
                        .and_then(|t| t.trim().parse::<u32>().ok())
                        .unwrap_or(0)
                };
                icons.push(Icon {
                    mimetype: child_text(icon, "mimetype").unwrap_or_default(),
                    width: number("width"),
                    height: number("height"),
                    url: resolve(&url)?,
                });
            }
        }

        Ok(Self {
            device_type: device_type.to_string(),
            friendly_name: child_text(device, "friendlyName").unwrap_or_default(),
            udn: child_text(device, "UDN"),
            manufacturer: child_text(device, "manufacturer"),
            model_name: child_text(device, "modelName"),
            icons,
            services,
            base_url: base_url.to_string(),
        })
    }

    /// Service of the given type, matched without its version suffix
    pub fn service(&self, service_type: &str) -> Option<&ServiceEndpoints> {
        let wanted = strip_version(service_type);
        self.services
            .iter()
            .find(|s| strip_version(&s.service_type) == wanted)
    }

    pub fn av_transport(&self) -> Option<&ServiceEndpoints> {
        self.service(AV_TRANSPORT)
    }

    pub fn rendering_control(&self) -> Option<&ServiceEndpoints> {
        self.service(RENDERING_CONTROL)
    }

    pub fn connection_manager(&self) -> Option<&ServiceEndpoints> {
        self.service(CONNECTION_MANAGER)
    }
}

fn strip_version(urn: &str) -> &str {
    match urn.rfind(':') {
        Some(pos) if urn[pos + 1..].chars().all(|c| c.is_ascii_digit()) => &urn[..pos],
        _ => urn,
    }
}

fn elements(parent: &Element) -> impl Iterator<Item = &Element> {
    parent.children.iter().filter_map(|n| n.as_element())
}

fn find_device<'a>(device: &'a Element, device_type: &str) -> Option<&'a Element> {
    let this_type = child_text(device, "deviceType").unwrap_or_default();
    if strip_version(this_type.trim()) == strip_version(device_type) {
        return Some(device);
    }
    device
        .get_child("deviceList")
        .into_iter()
        .flat_map(elements)
        .filter(|e| e.name == "device")
        .find_map(|d| find_device(d, device_type))
}

// ============================================================================
// SCPD
// ============================================================================

/// `allowedValueRange` of a numeric state variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub min: i64,
    pub max: i64,
    pub step: i64,
}

impl ValueRange {
    /// Map `0.0..=1.0` onto the range, honoring the step
    pub fn float_to_int(&self, value: f64) -> i64 {
        let value = value.clamp(0.0, 1.0);
        let mut ret = self.min + (value * (self.max - self.min) as f64 + 0.5) as i64;
        if self.step > 1 {
            ret -= ret % self.step;
        }
        ret.clamp(self.min, self.max)
    }

    /// Map a device value back onto `0.0..=1.0`
    pub fn int_to_float(&self, value: i64) -> f64 {
        if self.max <= self.min {
            return 0.0;
        }
        ((value - self.min) as f64 / (self.max - self.min) as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: Option<String>,
    pub allowed_values: Vec<String>,
    pub range: Option<ValueRange>,
}

/// Service description: actions and state variables
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scpd {
    pub actions: Vec<String>,
    pub variables: Vec<StateVariable>,
}

impl Scpd {
    pub fn parse(xml: &str) -> Result<Self, SoapError> {
        let root = Element::parse(xml.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;
        Ok(Self::from_element(&root))
    }

    pub fn from_element(root: &Element) -> Self {
        let actions = root
            .get_child("actionList")
            .into_iter()
            .flat_map(elements)
            .filter(|e| e.name == "action")
            .filter_map(|a| child_text(a, "name"))
            .map(|n| n.trim().to_string())
            .collect();

        let variables = root
            .get_child("serviceStateTable")
            .into_iter()
            .flat_map(elements)
            .filter(|e| e.name == "stateVariable")
            .filter_map(parse_state_variable)
            .collect();

        Self { actions, variables }
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.iter().any(|a| a == name)
    }

    pub fn variable(&self, name: &str) -> Option<&StateVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Whether a state variable lists `value` among its allowed values
    pub fn allows_value(&self, variable: &str, value: &str) -> bool {
        self.variable(variable)
            .map(|v| v.allowed_values.iter().any(|a| a == value))
            .unwrap_or(false)
    }
}

fn parse_state_variable(element: &Element) -> Option<StateVariable> {
    let name = child_text(element, "name")?.trim().to_string();

    let allowed_values = element
        .get_child("allowedValueList")
        .into_iter()
        .flat_map(elements)
        .filter(|e| e.name == "allowedValue")
        .filter_map(|e| e.get_text().map(|t| t.trim().to_string()))
        .collect();

    let range = element.get_child("allowedValueRange").and_then(|r| {
        let number = |name: &str| child_text(r, name).and_then(|t| t.trim().parse::<i64>().ok());
        Some(ValueRange {
            min: number("minimum")?,
            max: number("maximum")?,
            step: number("step").unwrap_or(1),
        })
    });

    Some(StateVariable {
        name,
        data_type: child_text(element, "dataType").map(|t| t.trim().to_string()),
        allowed_values,
        range,
    })
}
