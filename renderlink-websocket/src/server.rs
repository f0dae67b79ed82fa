//! Server side: upgrade requests, `/info` and fan-out
//!
//! A [`ServerContext`] is handed accepted sockets. It reads their request
//! heads without blocking, upgrades requests for its path into
//! connections, answers `/info` directly and turns everything else away.
//! Messages passed to [`ServerContext::broadcast`] go to every connected
//! peer; messages from peers are collected for [`ServerContext::take_messages`].

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Instant;

use http_codec::HttpMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WebSocketConfig;
use crate::connection::{Connection, ConnectionState, Role};
use crate::error::{Result, WebSocketError};
use crate::handshake::{accept_key, server_response, validate_client_request};

/// Path answered with [`ServerInfo`] as JSON
pub const INFO_PATH: &str = "/info";

const MAX_HEAD_LEN: usize = 16 * 1024;

/// `/ws/<class>`, or `/ws` without a class
pub fn ws_path(class: Option<&str>) -> String {
    match class {
        Some(class) if !class.is_empty() => format!("/ws/{}", class),
        _ => "/ws".to_string(),
    }
}

/// An icon of the local application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Icon {
    pub url: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

/// Document served at `/info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub label: String,
    pub icons: Vec<Icon>,
}

impl ServerInfo {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            icons: Vec::new(),
        }
    }

    pub fn with_icon(mut self, icon: Icon) -> Self {
        self.icons.push(icon);
        self
    }
}

/// A socket whose request has not been handled yet
struct PendingRequest<S> {
    stream: S,
    head: Vec<u8>,
    deadline: Instant,
    reply: Option<(Vec<u8>, usize)>,
}

enum RequestStep {
    Waiting,
    Answered,
    Upgrade { response: Vec<u8>, buffered: Vec<u8> },
}

/// WebSocket endpoint serving one path
pub struct ServerContext<S = TcpStream> {
    path: String,
    info: ServerInfo,
    config: WebSocketConfig,
    pending: Vec<PendingRequest<S>>,
    connections: Vec<Connection<S>>,
    inbox: VecDeque<Value>,
}

impl<S: Read + Write> ServerContext<S> {
    /// Serve `/ws/<class>` (or `/ws`)
    pub fn new(class: Option<&str>, info: ServerInfo, config: WebSocketConfig) -> Self {
        Self::with_path(ws_path(class), info, config)
    }

    /// Serve an explicit path
    pub fn with_path(path: impl Into<String>, info: ServerInfo, config: WebSocketConfig) -> Self {
        Self {
            path: path.into(),
            info,
            config,
            pending: Vec::new(),
            connections: Vec::new(),
            inbox: VecDeque::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Connected peers
    pub fn num_clients(&self) -> usize {
        self.connections.len()
    }

    /// Take over an accepted, non-blocking socket
    pub fn accept(&mut self, stream: S, now: Instant) {
        self.pending.push(PendingRequest {
            stream,
            head: Vec::new(),
            deadline: now + self.config.handshake_timeout,
            reply: None,
        });
    }

    /// Queue `msg` on every open connection, returning how many took it
    pub fn broadcast(&mut self, msg: &Value) -> usize {
        let mut sent = 0;
        for conn in self.connections.iter_mut().filter(|c| c.is_open()) {
            match conn.send_message(msg) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Cannot queue message: {}", e),
            }
        }
        sent
    }

    /// Messages received from peers since the last call
    pub fn take_messages(&mut self) -> Vec<Value> {
        self.inbox.drain(..).collect()
    }

    /// Ask every peer to close
    pub fn close_all(&mut self) {
        for conn in &mut self.connections {
            conn.close();
            if let Err(e) = conn.flush() {
                debug!("Flushing close frame failed: {}", e);
            }
        }
    }

    /// Handle pending requests and run every connection once
    ///
    /// Returns the amount of work done: requests handled, messages
    /// received, connections dropped.
    pub fn iteration(&mut self, now: Instant) -> usize {
        let mut work = 0;

        for mut request in std::mem::take(&mut self.pending) {
            match self.advance_request(&mut request, now) {
                Ok(RequestStep::Waiting) => self.pending.push(request),
                Ok(RequestStep::Answered) => work += 1,
                Ok(RequestStep::Upgrade { response, buffered }) => {
                    let mut conn = Connection::with_buffered(request.stream, Role::Server, self.config.clone(), buffered);
                    conn.queue_raw(response);
                    self.connections.push(conn);
                    info!("WebSocket client connected on {} ({} total)", self.path, self.connections.len());
                    work += 1;
                }
                Err(e) => {
                    debug!("Dropping HTTP request: {}", e);
                    work += 1;
                }
            }
        }

        let inbox = &mut self.inbox;
        self.connections.retain_mut(|conn| match conn.iteration(now) {
            Ok(messages) => {
                work += messages.len();
                inbox.extend(messages);
                if conn.state() == ConnectionState::Closed {
                    debug!("WebSocket client left");
                    work += 1;
                    return false;
                }
                true
            }
            Err(e) => {
                debug!("WebSocket client dropped: {}", e);
                work += 1;
                false
            }
        });

        work
    }

    fn advance_request(&self, request: &mut PendingRequest<S>, now: Instant) -> Result<RequestStep> {
        if now >= request.deadline {
            return Err(WebSocketError::Handshake("request timed out".to_string()));
        }
        if request.reply.is_some() {
            return write_reply(request);
        }

        let mut chunk = [0u8; 1024];
        loop {
            match request.stream.read(&mut chunk) {
                Ok(0) => return Err(WebSocketError::Closed),
                Ok(n) => request.head.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let (msg, consumed) = match HttpMessage::parse_head(&request.head)? {
            Some(parsed) => parsed,
            None if request.head.len() > MAX_HEAD_LEN => {
                return Err(WebSocketError::Handshake("request head too large".to_string()));
            }
            None => return Ok(RequestStep::Waiting),
        };

        let path = msg.target().unwrap_or_default().split('?').next().unwrap_or_default();
        let reply = if path == INFO_PATH {
            self.info_response()?
        } else if path != self.path {
            plain_response(404, "Not Found")
        } else if self.connections.len() >= self.config.max_connections {
            warn!("Refusing WebSocket client, {} connections open", self.connections.len());
            plain_response(503, "Service Unavailable")
        } else {
            match validate_client_request(&msg, &self.config.subprotocol) {
                Ok(key) => {
                    let response = server_response(&accept_key(&key), &self.config.subprotocol);
                    return Ok(RequestStep::Upgrade {
                        response: response.to_bytes(),
                        buffered: request.head[consumed..].to_vec(),
                    });
                }
                Err(e) => {
                    debug!("Bad upgrade request: {}", e);
                    plain_response(400, "Bad Request")
                }
            }
        };

        request.reply = Some((reply.to_bytes(), 0));
        write_reply(request)
    }

    fn info_response(&self) -> Result<HttpMessage> {
        let body = serde_json::to_vec(&self.info)?;
        Ok(HttpMessage::response(200, "OK")
            .with_header("Content-Type", "application/json")
            .with_header("Content-Length", body.len().to_string())
            .with_header("Connection", "close")
            .with_body(body))
    }
}

impl ServerContext<TcpStream> {
    /// Accept every connection waiting on a non-blocking listener
    pub fn accept_from(&mut self, listener: &TcpListener, now: Instant) -> Result<usize> {
        let mut accepted = 0;
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    debug!("HTTP client {}", addr);
                    self.accept(stream, now);
                    accepted += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(accepted)
    }
}

fn plain_response(status: u16, reason: &str) -> HttpMessage {
    HttpMessage::response(status, reason)
        .with_header("Content-Length", "0")
        .with_header("Connection", "close")
}

fn write_reply<S: Write>(request: &mut PendingRequest<S>) -> Result<RequestStep> {
    let Some((bytes, written)) = request.reply.as_mut() else {
        return Ok(RequestStep::Waiting);
    };
    while *written < bytes.len() {
        match request.stream.write(&bytes[*written..]) {
            Ok(0) => return Err(WebSocketError::Closed),
            Ok(n) => *written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(RequestStep::Waiting),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(RequestStep::Answered)
}
