//! Fakes for driving `Renderlink` without a network or real players
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use renderlink::backend::{Backend, BackendError, BackendKind, Result};
use renderlink::discovery::SsdpTransport;
use renderlink::{BackendCommand, BackendHandle, Renderlink, RenderlinkConfig, StateDict};
use serde_json::json;

/// Transport that never receives anything and counts what is sent
#[derive(Default)]
pub struct SilentTransport {
    pub sent: usize,
}

impl SsdpTransport for SilentTransport {
    fn recv_multicast(&mut self, _buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(None)
    }

    fn recv_unicast(&mut self, _buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(None)
    }

    fn send_to(&mut self, data: &[u8], _addr: SocketAddr) -> io::Result<usize> {
        self.sent += 1;
        Ok(data.len())
    }
}

pub fn renderlink() -> Renderlink<SilentTransport> {
    Renderlink::with_transport(SilentTransport::default(), RenderlinkConfig::responsive()).unwrap()
}

#[derive(Default)]
pub struct Log {
    pub commands: Vec<BackendCommand>,
    pub pings: usize,
    pub destroyed: bool,
    /// Fail every ping from now on
    pub broken: bool,
}

/// Backend recording what it is asked to do
///
/// `SetVolume` is published to `player/volume` so state relaying can be
/// observed.
pub struct FakeBackend {
    pub log: Arc<Mutex<Log>>,
    state: StateDict,
}

impl FakeBackend {
    pub fn handle(uri: &str) -> (BackendHandle, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let backend = FakeBackend {
            log: Arc::clone(&log),
            state: StateDict::new(),
        };
        backend.state.set("player", "status", json!("stopped"));
        (BackendHandle::new(uri, Box::new(backend)), log)
    }
}

impl Backend for FakeBackend {
    fn ping(&mut self, _now: Instant) -> Result<usize> {
        let mut log = self.log.lock().unwrap();
        if log.broken {
            return Err(BackendError::Disconnected);
        }
        log.pings += 1;
        Ok(0)
    }

    fn handle_msg(&mut self, cmd: BackendCommand, _now: Instant) -> Result<bool> {
        if let BackendCommand::SetVolume { value } = cmd {
            self.state.set("player", "volume", json!(value));
        }
        let quit = cmd == BackendCommand::Quit;
        self.log.lock().unwrap().commands.push(cmd);
        Ok(!quit)
    }

    fn destroy(&mut self) {
        self.log.lock().unwrap().destroyed = true;
    }

    fn state(&self) -> &StateDict {
        &self.state
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mpd
    }
}
