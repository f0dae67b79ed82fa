//! Outbound connections to `ws://` URLs

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use http_codec::HttpMessage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};
use url::Url;

use crate::config::WebSocketConfig;
use crate::connection::{Connection, Role};
use crate::error::{Result, WebSocketError};
use crate::handshake::{client_request, generate_key, validate_server_response};

const MAX_HEAD_LEN: usize = 16 * 1024;

/// Connect to `url` and perform the handshake
///
/// Connecting and the handshake block for at most `timeout` each; the
/// returned connection is non-blocking.
pub fn connect(url: &str, timeout: Duration) -> Result<Connection<TcpStream>> {
    let config = WebSocketConfig::default().with_handshake_timeout(timeout);
    connect_with_config(url, None, &config)
}

/// Like [`connect`], with an explicit `Origin` and configuration
pub fn connect_with_config(url: &str, origin: Option<&str>, config: &WebSocketConfig) -> Result<Connection<TcpStream>> {
    let parsed = Url::parse(url).map_err(|e| WebSocketError::Url(format!("{}: {}", url, e)))?;
    if parsed.scheme() != "ws" {
        return Err(WebSocketError::Url(format!("{}: only ws:// is supported", url)));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| WebSocketError::Url(format!("{}: missing host", url)))?;

    let host_header = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let mut target = match parsed.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };
    if let Some(query) = parsed.query() {
        target.push('?');
        target.push_str(query);
    }

    let addr = parsed
        .socket_addrs(|| Some(80))?
        .into_iter()
        .next()
        .ok_or_else(|| WebSocketError::Url(format!("{}: cannot resolve host", url)))?;

    debug!("Connecting to {} ({})", url, addr);
    let mut stream = TcpStream::connect_timeout(&addr, config.handshake_timeout)?;
    stream.set_read_timeout(Some(config.handshake_timeout))?;
    stream.set_write_timeout(Some(config.handshake_timeout))?;

    let key = generate_key(&mut StdRng::from_entropy());
    let request = client_request(&host_header, &target, origin, &key, &config.subprotocol);
    stream.write_all(&request.to_bytes())?;

    let (response, buffered) = read_head(&mut stream)?;
    validate_server_response(&response, &key, &config.subprotocol)?;

    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;
    stream.set_nodelay(true)?;
    stream.set_nonblocking(true)?;

    info!("WebSocket connected to {}", url);
    Ok(Connection::with_buffered(stream, Role::Client, config.clone(), buffered))
}

/// Read a message head, returning it and any bytes that followed it
pub(crate) fn read_head<R: Read>(stream: &mut R) -> Result<(HttpMessage, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        if let Some((msg, consumed)) = HttpMessage::parse_head(&buf)? {
            return Ok((msg, buf[consumed..].to_vec()));
        }
        if buf.len() > MAX_HEAD_LEN {
            return Err(WebSocketError::Handshake("message head too large".to_string()));
        }
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Err(WebSocketError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}
