//! SOAP client for UPnP renderer control
//!
//! This crate provides a minimal SOAP client for invoking UPnP actions
//! on AVTransport, RenderingControl and ConnectionManager services, and
//! parsers for the device description and service description (SCPD)
//! documents needed to find those services and probe their capabilities.

mod error;
pub mod description;

pub use description::{DeviceDescription, Icon, Scpd, ServiceEndpoints, StateVariable, ValueRange};
pub use error::SoapError;

use std::time::Duration;
use xmltree::Element;

/// A minimal SOAP client for UPnP device communication
#[derive(Debug, Clone)]
pub struct SoapClient {
    agent: ureq::Agent,
}

impl SoapClient {
    /// Create a new SOAP client with default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(Duration::from_secs(5), Duration::from_secs(10))
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout_connect(connect)
                .timeout_read(read)
                .build(),
        }
    }

    /// Invoke `action` on the service at `control_url`
    ///
    /// `args` are written in order as `<Name>value</Name>` children of the
    /// action element. Returns the `<ActionResponse>` element.
    pub fn call(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<Element, SoapError> {
        let body = build_envelope(service_type, action, args);
        let soap_action = format!("\"{}#{}\"", service_type, action);

        tracing::debug!("SOAP {} -> {}", action, control_url);

        let response = match self
            .agent
            .post(control_url)
            .set("Content-Type", "text/xml; charset=\"utf-8\"")
            .set("SOAPACTION", &soap_action)
            .send_string(&body)
        {
            Ok(response) => response,
            // Faults come back with HTTP 500 and a SOAP body
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => return Err(SoapError::Network(e.to_string())),
        };

        let xml_text = response
            .into_string()
            .map_err(|e| SoapError::Network(e.to_string()))?;

        let xml = Element::parse(xml_text.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))?;

        self.extract_response(&xml, action)
    }

    /// Fetch and parse an XML document (device description, SCPD)
    pub fn fetch_xml(&self, url: &str) -> Result<Element, SoapError> {
        let text = self
            .agent
            .get(url)
            .call()
            .map_err(|e| SoapError::Network(e.to_string()))?
            .into_string()
            .map_err(|e| SoapError::Network(e.to_string()))?;

        Element::parse(text.as_bytes()).map_err(|e| SoapError::Parse(e.to_string()))
    }

    fn extract_response(&self, xml: &Element, action: &str) -> Result<Element, SoapError> {
        let body = xml
            .get_child("Body")
            .ok_or_else(|| SoapError::Parse("Missing SOAP Body".to_string()))?;

        // Check for SOAP fault first
        if let Some(fault) = body.get_child("Fault") {
            let error_code = fault
                .get_child("detail")
                .and_then(|d| d.get_child("UPnPError").or_else(|| d.get_child("UpnPError")))
                .and_then(|e| e.get_child("errorCode"))
                .and_then(|c| c.get_text())
                .and_then(|t| t.trim().parse::<u16>().ok())
                .unwrap_or(500);
            return Err(SoapError::Fault(error_code));
        }

        let response_name = format!("{}Response", action);
        body.get_child(response_name.as_str())
            .cloned()
            .ok_or_else(|| SoapError::Parse(format!("Missing {} element", response_name)))
    }
}

impl Default for SoapClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of the child element `name`, or `None` when missing
pub fn child_text(element: &Element, name: &str) -> Option<String> {
    element
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.into_owned())
}

fn build_envelope(service_type: &str, action: &str, args: &[(&str, &str)]) -> String {
    let payload: String = args
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>", quick_xml::escape::escape(*value)))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{action} xmlns:u="{service_type}">{payload}</u:{action}></s:Body></s:Envelope>"#,
        action = action,
        service_type = service_type,
        payload = payload
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_envelope_escapes_arguments() {
        let envelope = build_envelope(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", "http://host/a.mp3?x=1&y=2"),
                ("CurrentURIMetaData", "<DIDL-Lite/>"),
            ],
        );

        assert!(envelope.contains(r#"<u:SetAVTransportURI xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">"#));
        assert!(envelope.contains("<InstanceID>0</InstanceID>"));
        assert!(envelope.contains("<CurrentURI>http://host/a.mp3?x=1&amp;y=2</CurrentURI>"));
        assert!(envelope.contains("<CurrentURIMetaData>&lt;DIDL-Lite/&gt;</CurrentURIMetaData>"));

        // the envelope is well formed
        let xml = Element::parse(envelope.as_bytes()).unwrap();
        let action = xml.get_child("Body").and_then(|b| b.get_child("SetAVTransportURI")).unwrap();
        assert_eq!(child_text(action, "CurrentURIMetaData").as_deref(), Some("<DIDL-Lite/>"));
    }

    #[test]
    fn test_extract_response_with_valid_response() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:GetPositionInfoResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">
                        <Track>1</Track>
                        <TrackDuration>0:03:00</TrackDuration>
                        <RelTime>0:00:12</RelTime>
                    </u:GetPositionInfoResponse>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        let response = client.extract_response(&xml, "GetPositionInfo").unwrap();

        assert_eq!(response.name, "GetPositionInfoResponse");
        assert_eq!(child_text(&response, "RelTime").as_deref(), Some("0:00:12"));
        assert_eq!(child_text(&response, "Missing"), None);
    }

    #[test]
    fn test_extract_response_with_soap_fault() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>701</errorCode>
                                <errorDescription>Transition not available</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "Pause").unwrap_err() {
            SoapError::Fault(code) => assert_eq!(code, 701),
            other => panic!("Expected SoapError::Fault, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_response_missing_body() {
        let client = SoapClient::new();

        let xml_str = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"></s:Envelope>"#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "Play").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing SOAP Body")),
            other => panic!("Expected SoapError::Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_response_missing_action_response() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "Play").unwrap_err() {
            SoapError::Parse(msg) => assert!(msg.contains("Missing PlayResponse element")),
            other => panic!("Expected SoapError::Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_soap_fault_with_default_error_code() {
        let client = SoapClient::new();

        let xml_str = r#"
            <s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Server</faultcode>
                        <faultstring>Internal Error</faultstring>
                    </s:Fault>
                </s:Body>
            </s:Envelope>
        "#;

        let xml = Element::parse(xml_str.as_bytes()).unwrap();
        match client.extract_response(&xml, "Play").unwrap_err() {
            SoapError::Fault(code) => assert_eq!(code, 500),
            other => panic!("Expected SoapError::Fault, got {:?}", other),
        }
    }
}
