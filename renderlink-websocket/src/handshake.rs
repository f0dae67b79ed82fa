//! HTTP upgrade handshake
//!
//! The client sends a GET with `Upgrade: websocket` and a random base64
//! nonce; the server answers `101 Switching Protocols` with the SHA-1 of
//! nonce plus the RFC 6455 GUID. Both sides insist on the same
//! subprotocol.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_codec::HttpMessage;
use rand::Rng;
use sha1::{Digest, Sha1};

use crate::error::{Result, WebSocketError};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Random 16-byte nonce, base64 encoded
pub fn generate_key<R: Rng>(rng: &mut R) -> String {
    let nonce: [u8; 16] = rng.gen();
    STANDARD.encode(nonce)
}

/// `Sec-WebSocket-Accept` value for a `Sec-WebSocket-Key`
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Upgrade request sent by a client
///
/// `host` includes the port when it is not the default one. Without an
/// explicit origin, `http://<host>` is sent.
pub fn client_request(host: &str, path: &str, origin: Option<&str>, key: &str, protocol: &str) -> HttpMessage {
    let origin = origin.map_or_else(|| format!("http://{}", host), str::to_string);
    HttpMessage::request("GET", path)
        .with_header("Host", host)
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Key", key)
        .with_header("Origin", origin)
        .with_header("Sec-WebSocket-Protocol", protocol)
        .with_header("Sec-WebSocket-Version", "13")
}

/// Check the server's answer to a request sent with `key`
pub fn validate_server_response(response: &HttpMessage, key: &str, protocol: &str) -> Result<()> {
    match response.status() {
        Some(101) => {}
        Some(status) => return Err(WebSocketError::Handshake(format!("server answered {}", status))),
        None => return Err(WebSocketError::Handshake("expected a response".to_string())),
    }

    if !response.headers.contains_token("Connection", "upgrade") {
        return Err(WebSocketError::Handshake("missing Connection: Upgrade".to_string()));
    }
    if !header_is(response, "Upgrade", "websocket") {
        return Err(WebSocketError::Handshake("missing Upgrade: websocket".to_string()));
    }

    let expected = accept_key(key);
    if response.header("Sec-WebSocket-Accept").map(str::trim) != Some(expected.as_str()) {
        return Err(WebSocketError::Handshake("wrong Sec-WebSocket-Accept".to_string()));
    }

    if !header_is(response, "Sec-WebSocket-Protocol", protocol) {
        return Err(WebSocketError::Handshake(format!("subprotocol {} not accepted", protocol)));
    }
    Ok(())
}

/// Check an upgrade request, returning its `Sec-WebSocket-Key`
pub fn validate_client_request(request: &HttpMessage, protocol: &str) -> Result<String> {
    if request.method() != Some("GET") {
        return Err(WebSocketError::Handshake("upgrade must be a GET".to_string()));
    }
    if !request.headers.contains_token("Upgrade", "websocket") {
        return Err(WebSocketError::Handshake("missing Upgrade: websocket".to_string()));
    }
    if !request.headers.contains_token("Connection", "upgrade") {
        return Err(WebSocketError::Handshake("missing Connection: Upgrade".to_string()));
    }
    if !request.headers.contains_token("Sec-WebSocket-Protocol", protocol) {
        return Err(WebSocketError::Handshake(format!("client does not offer {}", protocol)));
    }

    request
        .header("Sec-WebSocket-Key")
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or_else(|| WebSocketError::Handshake("missing Sec-WebSocket-Key".to_string()))
}

/// `101 Switching Protocols` answer
pub fn server_response(accept: &str, protocol: &str) -> HttpMessage {
    HttpMessage::response(101, "Switching Protocols")
        .with_header("Upgrade", "websocket")
        .with_header("Connection", "Upgrade")
        .with_header("Sec-WebSocket-Protocol", protocol)
        .with_header("Sec-WebSocket-Accept", accept)
}

fn header_is(msg: &HttpMessage, name: &str, value: &str) -> bool {
    msg.header(name).map_or(false, |v| v.trim().eq_ignore_ascii_case(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_accept_key_rfc_sample() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_generated_key_is_16_bytes() {
        let mut rng = StdRng::seed_from_u64(3);
        let key = generate_key(&mut rng);
        assert_eq!(STANDARD.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key(&mut rng));
    }

    #[test]
    fn test_client_and_server_agree() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let request = client_request("10.0.0.2:8080", "/ws/renderer", None, key, "json");
        assert_eq!(request.header("Origin"), Some("http://10.0.0.2:8080"));

        let parsed = HttpMessage::parse(&request.to_bytes()).unwrap();
        let received_key = validate_client_request(&parsed, "json").unwrap();
        assert_eq!(received_key, key);

        let response = server_response(&accept_key(&received_key), "json");
        let parsed = HttpMessage::parse(&response.to_bytes()).unwrap();
        assert!(validate_server_response(&parsed, key, "json").is_ok());
    }

    #[test]
    fn test_wrong_accept_rejected() {
        let response = server_response("bm90IHRoZSByaWdodCBrZXk=", "json");
        assert!(validate_server_response(&response, "dGhlIHNhbXBsZSBub25jZQ==", "json").is_err());
    }

    #[test]
    fn test_missing_subprotocol_rejected() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let response = server_response(&accept_key(key), "xml");
        assert!(validate_server_response(&response, key, "json").is_err());

        let request = client_request("host", "/ws", Some("http://ui"), key, "xml");
        assert!(validate_client_request(&request, "json").is_err());
    }

    #[test]
    fn test_non_upgrade_status_rejected() {
        let response = HttpMessage::response(503, "Service Unavailable");
        let err = validate_server_response(&response, "a2V5", "json").unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
