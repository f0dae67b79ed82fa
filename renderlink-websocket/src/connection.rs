//! One WebSocket peer over a non-blocking stream
//!
//! A [`Connection`] owns the stream after the handshake. Each call to
//! [`Connection::iteration`] drains whatever the socket has to offer,
//! answers control frames, runs the server keep-alive and writes as much
//! of the outgoing queue as the socket accepts. Outgoing frames stay
//! strictly ordered; a frame leaves the queue only when every byte of it
//! has been written.
//!
//! Messages are JSON values carried in single text frames. A message
//! `{"cmd": "quit"}` ends the connection from either side.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::WebSocketConfig;
use crate::error::{Result, WebSocketError};
use crate::frame::{encode_frame, DecodeStatus, Frame, FrameDecoder, Opcode};

const PING_PAYLOAD_LEN: usize = 8;
const READ_CHUNK: usize = 16 * 1024;
const CLOSE_NORMAL: u16 = 1000;

/// Which end of the connection we are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Masks outgoing frames, never pings
    Client,
    /// Requires masked frames, keeps the peer alive with pings
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Closing frame or quit message queued, waiting for it to be written
    Closing,
    Closed,
}

/// Whether a message asks the receiving end to hang up
pub fn is_quit(msg: &Value) -> bool {
    msg.get("cmd").and_then(Value::as_str) == Some("quit")
}

#[derive(Debug)]
struct Outgoing {
    bytes: Vec<u8>,
    written: usize,
}

#[derive(Debug, Default)]
struct PingState {
    outstanding: bool,
    last_sent: Option<Instant>,
    payload: [u8; PING_PAYLOAD_LEN],
}

/// A WebSocket connection in either role
pub struct Connection<S> {
    stream: S,
    role: Role,
    state: ConnectionState,
    config: WebSocketConfig,
    decoder: FrameDecoder,
    buffered: Vec<u8>,
    partial: Option<Vec<u8>>,
    queue: VecDeque<Outgoing>,
    ping: PingState,
    epoch: Instant,
    rng: StdRng,
}

impl<S: Read + Write> Connection<S> {
    /// Wrap a stream whose handshake is complete
    pub fn new(stream: S, role: Role, config: WebSocketConfig) -> Self {
        Self::with_buffered(stream, role, config, Vec::new())
    }

    /// Like [`Connection::new`], with bytes already read past the handshake head
    pub fn with_buffered(stream: S, role: Role, config: WebSocketConfig, buffered: Vec<u8>) -> Self {
        let decoder = FrameDecoder::new(role == Role::Server).with_max_payload(config.max_message_size);
        Self {
            stream,
            role,
            state: ConnectionState::Open,
            config,
            decoder,
            buffered,
            partial: None,
            queue: VecDeque::new(),
            ping: PingState::default(),
            epoch: Instant::now(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Whether a ping is waiting for its pong
    pub fn ping_outstanding(&self) -> bool {
        self.ping.outstanding
    }

    /// Frames not completely written yet
    pub fn queued_frames(&self) -> usize {
        self.queue.len()
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Serialize `msg` and queue it as one text frame
    pub fn send_message(&mut self, msg: &Value) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Err(WebSocketError::Closed);
        }
        let text = serde_json::to_string(msg)?;
        self.queue_frame(Opcode::Text, text.as_bytes());

        if is_quit(msg) {
            debug!("Sent quit message, closing");
            self.state = ConnectionState::Closing;
        }
        Ok(())
    }

    /// Queue a close frame; the connection ends once it is written
    pub fn close(&mut self) {
        if self.state == ConnectionState::Open {
            self.queue_frame(Opcode::Close, &CLOSE_NORMAL.to_be_bytes());
            self.state = ConnectionState::Closing;
        }
    }

    /// Queue a ping carrying the monotonic time of `now` in microseconds
    pub fn send_ping(&mut self, now: Instant) {
        let micros = now.saturating_duration_since(self.epoch).as_micros() as u64;
        self.ping.payload = micros.to_be_bytes();
        self.ping.outstanding = true;
        self.ping.last_sent = Some(now);
        let payload = self.ping.payload;
        self.queue_frame(Opcode::Ping, &payload);
    }

    /// Read, answer control frames, keep alive and flush
    ///
    /// Returns the messages that arrived. An `Err` means the connection is
    /// dead and should be dropped.
    pub fn iteration(&mut self, now: Instant) -> Result<Vec<Value>> {
        if self.state == ConnectionState::Closed {
            return Err(WebSocketError::Closed);
        }

        let mut messages = Vec::new();
        if self.state == ConnectionState::Open {
            self.read_available(&mut messages)?;
        }
        if self.state == ConnectionState::Open && self.role == Role::Server {
            self.keep_alive(now)?;
        }
        self.flush()?;
        Ok(messages)
    }

    /// Write queued frames until the socket would block
    ///
    /// Returns the number of frames completed.
    pub fn flush(&mut self) -> Result<usize> {
        let mut done = 0;
        while let Some(front) = self.queue.front_mut() {
            match self.stream.write(&front.bytes[front.written..]) {
                Ok(0) => {
                    self.state = ConnectionState::Closed;
                    return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                }
                Ok(n) => {
                    front.written += n;
                    if front.written == front.bytes.len() {
                        self.queue.pop_front();
                        done += 1;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.state = ConnectionState::Closed;
                    return Err(e.into());
                }
            }
        }

        if self.state == ConnectionState::Closing && self.queue.is_empty() {
            debug!("Connection closed");
            self.state = ConnectionState::Closed;
        }
        Ok(done)
    }

    /// Put raw bytes (the handshake response) ahead of any frame
    pub(crate) fn queue_raw(&mut self, bytes: Vec<u8>) {
        self.queue.push_front(Outgoing { bytes, written: 0 });
    }

    fn queue_frame(&mut self, opcode: Opcode, payload: &[u8]) {
        let mask = match self.role {
            Role::Client => Some(self.rng.gen::<[u8; 4]>()),
            Role::Server => None,
        };
        self.queue.push_back(Outgoing {
            bytes: encode_frame(opcode, true, payload, mask),
            written: 0,
        });
    }

    fn read_available(&mut self, messages: &mut Vec<Value>) -> Result<()> {
        if !self.buffered.is_empty() {
            let input = std::mem::take(&mut self.buffered);
            self.feed(&input, messages)?;
        }

        let mut buf = vec![0u8; READ_CHUNK];
        while self.state == ConnectionState::Open {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    debug!("Peer hung up");
                    self.state = ConnectionState::Closed;
                    return Err(WebSocketError::Closed);
                }
                Ok(n) => self.feed(&buf[..n], messages)?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.state = ConnectionState::Closed;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn feed(&mut self, mut data: &[u8], messages: &mut Vec<Value>) -> Result<()> {
        while !data.is_empty() && self.state == ConnectionState::Open {
            let frame = match self.decoder.push(data) {
                Ok(DecodeStatus::Incomplete) => break,
                Ok(DecodeStatus::Complete { frame, consumed }) => {
                    data = &data[consumed..];
                    frame
                }
                Err(e) => return Err(self.fail(e)),
            };
            if let Err(e) = self.handle_frame(frame, messages) {
                return Err(self.fail(e));
            }
        }
        Ok(())
    }

    fn fail(&mut self, e: WebSocketError) -> WebSocketError {
        warn!("Dropping connection: {}", e);
        self.state = ConnectionState::Closed;
        e
    }

    fn handle_frame(&mut self, frame: Frame, messages: &mut Vec<Value>) -> Result<()> {
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                if self.partial.is_some() {
                    return Err(WebSocketError::Protocol("new message inside a fragmented one".to_string()));
                }
                if frame.fin {
                    self.deliver(&frame.payload, messages)?;
                } else {
                    self.partial = Some(frame.payload);
                }
            }
            Opcode::Continuation => {
                let mut partial = self
                    .partial
                    .take()
                    .ok_or_else(|| WebSocketError::Protocol("continuation without a message".to_string()))?;
                partial.extend_from_slice(&frame.payload);
                if partial.len() > self.config.max_message_size {
                    return Err(WebSocketError::Protocol("message exceeds limit".to_string()));
                }
                if frame.fin {
                    self.deliver(&partial, messages)?;
                } else {
                    self.partial = Some(partial);
                }
            }
            Opcode::Close => {
                debug!("Peer sent close, echoing");
                self.queue_frame(Opcode::Close, &frame.payload);
                self.state = ConnectionState::Closing;
            }
            Opcode::Ping => self.queue_frame(Opcode::Pong, &frame.payload),
            Opcode::Pong => {
                if self.ping.outstanding && frame.payload[..] == self.ping.payload[..] {
                    self.ping.outstanding = false;
                }
            }
        }
        Ok(())
    }

    fn deliver(&mut self, payload: &[u8], messages: &mut Vec<Value>) -> Result<()> {
        let msg: Value = serde_json::from_slice(payload)?;
        if is_quit(&msg) {
            debug!("Got quit message");
            self.state = ConnectionState::Closed;
            return Ok(());
        }
        messages.push(msg);
        Ok(())
    }

    fn keep_alive(&mut self, now: Instant) -> Result<()> {
        match self.ping.last_sent {
            Some(sent) if self.ping.outstanding => {
                if now.saturating_duration_since(sent) > self.config.ping_timeout {
                    debug!("Ping timeout");
                    self.state = ConnectionState::Closed;
                    return Err(WebSocketError::PingTimeout);
                }
            }
            Some(sent) if now.saturating_duration_since(sent) <= self.config.ping_interval => {}
            _ => self.send_ping(now),
        }
        Ok(())
    }
}
