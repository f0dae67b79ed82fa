//! In-memory sockets for driving the server context
#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::rc::Rc;

use http_codec::HttpMessage;
use renderlink_websocket::handshake::client_request;
use renderlink_websocket::{encode_frame, DecodeStatus, Frame, FrameDecoder, Opcode};
use serde_json::Value;

pub const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

#[derive(Default)]
pub struct Wire {
    pub to_server: Vec<u8>,
    pub from_server: Vec<u8>,
    pub hung_up: bool,
    /// Peer stopped reading; writes would block
    pub stalled: bool,
}

/// Server end of an in-memory socket; clones share the wire
#[derive(Clone, Default)]
pub struct MemorySocket {
    pub wire: Rc<RefCell<Wire>>,
}

impl MemorySocket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes the peer sends to the server
    pub fn send(&self, bytes: &[u8]) {
        self.wire.borrow_mut().to_server.extend_from_slice(bytes);
    }

    /// Bytes the server wrote since the last call
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.wire.borrow_mut().from_server)
    }

    pub fn hang_up(&self) {
        self.wire.borrow_mut().hung_up = true;
    }

    pub fn stall(&self) {
        self.wire.borrow_mut().stalled = true;
    }
}

impl Read for MemorySocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        if wire.to_server.is_empty() {
            return if wire.hung_up { Ok(0) } else { Err(io::ErrorKind::WouldBlock.into()) };
        }
        let n = buf.len().min(wire.to_server.len());
        buf[..n].copy_from_slice(&wire.to_server[..n]);
        wire.to_server.drain(..n);
        Ok(n)
    }
}

impl Write for MemorySocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut wire = self.wire.borrow_mut();
        if wire.hung_up {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        if wire.stalled {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        wire.from_server.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn upgrade_request(path: &str) -> Vec<u8> {
    client_request("127.0.0.1:8888", path, None, KEY, "json").to_bytes()
}

pub fn get_request(path: &str) -> Vec<u8> {
    HttpMessage::request("GET", path).with_header("Host", "127.0.0.1:8888").to_bytes()
}

/// Masked text frame as a browser would send it
pub fn client_text(msg: &Value) -> Vec<u8> {
    encode_frame(Opcode::Text, true, msg.to_string().as_bytes(), Some([0xa1, 0xb2, 0xc3, 0xd4]))
}

/// Split server output into the HTTP head and what follows it
pub fn split_response(bytes: &[u8]) -> (HttpMessage, Vec<u8>) {
    let (head, consumed) = HttpMessage::parse_head(bytes).unwrap().expect("complete response head");
    (head, bytes[consumed..].to_vec())
}

pub fn decode_frames(bytes: &[u8]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new(false);
    let mut frames = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        match decoder.push(rest).unwrap() {
            DecodeStatus::Complete { frame, consumed } => {
                frames.push(frame);
                rest = &rest[consumed..];
            }
            DecodeStatus::Incomplete => break,
        }
    }
    frames
}

/// JSON messages among the frames, skipping pings
pub fn text_messages(frames: &[Frame]) -> Vec<Value> {
    frames
        .iter()
        .filter(|f| f.opcode == Opcode::Text)
        .map(|f| serde_json::from_slice(&f.payload).unwrap())
        .collect()
}
