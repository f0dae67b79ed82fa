//! Command queue and driver loop around one backend
//!
//! A `BackendHandle` owns the backend and the receiving end of its
//! command queue. Senders can be cloned freely and used from any thread;
//! commands are applied on the next `ping`.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use state_store::StateDict;

use crate::backend::{create_backend, Backend};
use crate::command::BackendCommand;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

/// Cloneable sending side of a backend's command queue
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<BackendCommand>,
}

impl CommandSender {
    /// Queue a command; fails once the handle has been dropped
    pub fn send(&self, cmd: BackendCommand) -> Result<()> {
        self.tx.send(cmd).map_err(|_| BackendError::Disconnected)
    }
}

pub struct BackendHandle {
    uri: String,
    backend: Box<dyn Backend>,
    command_tx: mpsc::Sender<BackendCommand>,
    command_rx: mpsc::Receiver<BackendCommand>,
    quit: bool,
}

impl BackendHandle {
    pub fn new(uri: impl Into<String>, backend: Box<dyn Backend>) -> Self {
        let (command_tx, command_rx) = mpsc::channel();
        Self {
            uri: uri.into(),
            backend,
            command_tx,
            command_rx,
            quit: false,
        }
    }

    /// Create the backend for `uri` through the factory
    pub fn create(uri: &str, config: &BackendConfig, state: StateDict) -> Result<Self> {
        let backend = create_backend(uri, config, state)?;
        Ok(Self::new(uri, backend))
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.command_tx.clone(),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> &StateDict {
        self.backend.state()
    }

    /// Whether a command asked the backend to quit
    pub fn is_quit(&self) -> bool {
        self.quit
    }

    /// Apply queued commands, then poll the player
    pub fn ping(&mut self, now: Instant) -> Result<usize> {
        let mut work = 0;

        while !self.quit {
            let Ok(cmd) = self.command_rx.try_recv() else {
                break;
            };
            tracing::debug!("{}: handling {}", self.uri, cmd.name());
            work += 1;
            if !self.backend.handle_msg(cmd, now)? {
                tracing::info!("{}: quit requested", self.uri);
                self.quit = true;
            }
        }

        if !self.quit {
            work += self.backend.ping(now)?;
        }
        Ok(work)
    }

    pub fn destroy(&mut self) {
        tracing::debug!("{}: destroying backend", self.uri);
        self.backend.destroy();
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("uri", &self.uri)
            .field("kind", &self.backend.kind())
            .field("quit", &self.quit)
            .finish()
    }
}

/// Drive a backend until it quits or fails
///
/// Sleeps `idle` after every tick that did no work. The backend is
/// destroyed before returning in both cases.
pub fn run(mut handle: BackendHandle, idle: Duration) -> Result<()> {
    tracing::info!("Backend driver for {} started", handle.uri);

    loop {
        match handle.ping(Instant::now()) {
            Ok(_) if handle.is_quit() => {
                handle.destroy();
                tracing::info!("Backend driver for {} stopped", handle.uri);
                return Ok(());
            }
            Ok(0) => thread::sleep(idle),
            Ok(_) => {}
            Err(e) => {
                tracing::error!("Backend {} failed: {}", handle.uri, e);
                handle.destroy();
                return Err(e);
            }
        }
    }
}

/// Run the driver loop on its own thread
pub fn spawn_backend(handle: BackendHandle, idle: Duration) -> JoinHandle<Result<()>> {
    thread::spawn(move || run(handle, idle))
}
