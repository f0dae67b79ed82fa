//! Renderlink - single-threaded driver tying discovery, backends and the bridge together
//!
//! Everything is advanced by [`Renderlink::tick`]: the SSDP engine, every
//! attached backend and, once [`Renderlink::serve`] was called, the
//! WebSocket bridge. A backend that fails is destroyed and dropped, and its
//! remote registry entry is removed so it is not offered again until the
//! device announces itself anew.

use std::net::TcpListener;
use std::thread;
use std::time::Instant;

use renderlink_backend::{BackendCommand, BackendHandle, CommandSender};
use renderlink_discovery::{ResourceRegistry, SsdpEngine, SsdpTransport, UdpTransport};
use renderlink_websocket::{ServerContext, ServerInfo};
use serde_json::{json, Value};
use state_store::StateDict;

use crate::config::RenderlinkConfig;
use crate::error::{RenderlinkError, Result};

/// Main entry point: discovery, attached backends and an optional WebSocket bridge
///
/// # Example
///
/// ```rust,no_run
/// use std::time::{Duration, Instant};
/// use renderlink::{BackendCommand, Renderlink, RenderlinkConfig};
///
/// fn main() -> Result<(), renderlink::RenderlinkError> {
///     let mut link = Renderlink::new(RenderlinkConfig::default())?;
///
///     let player = link.connect("mpd://localhost:6600")?;
///     player.send(BackendCommand::Play)?;
///
///     link.run_until(Instant::now() + Duration::from_secs(10));
///     link.shutdown();
///     Ok(())
/// }
/// ```
pub struct Renderlink<T: SsdpTransport = UdpTransport> {
    config: RenderlinkConfig,
    registry: ResourceRegistry,
    ssdp: SsdpEngine<T>,
    backends: Vec<BackendHandle>,
    bridge: Option<Bridge>,
}

impl Renderlink<UdpTransport> {
    /// Bind the SSDP sockets and start with no backends
    pub fn new(config: RenderlinkConfig) -> Result<Self> {
        config.validate()?;
        let transport = UdpTransport::bind(&config.ssdp)?;
        Self::with_transport(transport, config)
    }
}

impl<T: SsdpTransport> Renderlink<T> {
    /// Start over an explicit SSDP transport
    pub fn with_transport(transport: T, config: RenderlinkConfig) -> Result<Self> {
        config.validate()?;
        let registry = ResourceRegistry::new();
        let ssdp = SsdpEngine::new(transport, registry.clone(), config.ssdp.clone())?;

        tracing::info!("Renderlink started");
        Ok(Self {
            config,
            registry,
            ssdp,
            backends: Vec::new(),
            bridge: None,
        })
    }

    pub fn config(&self) -> &RenderlinkConfig {
        &self.config
    }

    /// Registry shared with the SSDP engine
    ///
    /// Add local resources here to have them announced.
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn ssdp(&self) -> &SsdpEngine<T> {
        &self.ssdp
    }

    pub fn ssdp_mut(&mut self) -> &mut SsdpEngine<T> {
        &mut self.ssdp
    }

    /// Create the backend for `uri` and attach it
    pub fn connect(&mut self, uri: &str) -> Result<CommandSender> {
        if self.is_connected(uri) {
            return Err(RenderlinkError::AlreadyConnected(uri.to_string()));
        }
        let handle = BackendHandle::create(uri, &self.config.backend, StateDict::new())?;
        self.attach(handle)
    }

    /// Attach an already created backend
    pub fn attach(&mut self, handle: BackendHandle) -> Result<CommandSender> {
        if self.is_connected(handle.uri()) {
            return Err(RenderlinkError::AlreadyConnected(handle.uri().to_string()));
        }
        if self.bridge.is_some() {
            handle.state().watch_all();
        }

        tracing::info!("Attached backend {}", handle.uri());
        let sender = handle.sender();
        self.backends.push(handle);
        Ok(sender)
    }

    /// Destroy and drop the backend for `uri`
    pub fn disconnect(&mut self, uri: &str) -> Result<()> {
        let idx = self
            .backends
            .iter()
            .position(|h| h.uri() == uri)
            .ok_or_else(|| RenderlinkError::NotConnected(uri.to_string()))?;

        let mut handle = self.backends.remove(idx);
        handle.destroy();
        tracing::info!("Detached backend {}", uri);
        Ok(())
    }

    pub fn is_connected(&self, uri: &str) -> bool {
        self.backends.iter().any(|h| h.uri() == uri)
    }

    /// URIs of the attached backends, in attach order
    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|h| h.uri())
    }

    pub fn sender(&self, uri: &str) -> Option<CommandSender> {
        self.backend(uri).map(|h| h.sender())
    }

    /// State dictionary published by the backend for `uri`
    pub fn state(&self, uri: &str) -> Option<StateDict> {
        self.backend(uri).map(|h| h.state().clone())
    }

    fn backend(&self, uri: &str) -> Option<&BackendHandle> {
        self.backends.iter().find(|h| h.uri() == uri)
    }

    /// Share backend state with WebSocket clients
    ///
    /// From now on every backend's dictionary is watched and its change
    /// events are consumed by the bridge: clients get a snapshot when they
    /// connect, then one `state_changed` message per change. Commands sent
    /// by clients are routed to the backend named in their `backend` field,
    /// or to every backend when it is absent.
    pub fn serve(&mut self, listener: TcpListener, class: Option<&str>, info: ServerInfo) -> Result<()> {
        listener.set_nonblocking(true)?;
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("WebSocket bridge listening on {}", addr);
        }

        for handle in &self.backends {
            handle.state().watch_all();
        }
        self.bridge = Some(Bridge {
            listener,
            server: ServerContext::new(class, info, self.config.websocket.clone()),
            clients: 0,
        });
        Ok(())
    }

    /// Number of connected WebSocket clients
    pub fn num_clients(&self) -> usize {
        self.bridge.as_ref().map_or(0, |b| b.server.num_clients())
    }

    /// Advance discovery, the backends and the bridge once
    ///
    /// Returns the amount of work done; zero means the caller may sleep.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut work = self.ssdp.update(now);
        work += self.ping_backends(now);
        if let Some(bridge) = self.bridge.as_mut() {
            work += bridge.run(now, &self.backends);
        }
        work
    }

    fn ping_backends(&mut self, now: Instant) -> usize {
        let registry = &self.registry;
        let mut work = 0;

        self.backends.retain_mut(|handle| match handle.ping(now) {
            Ok(n) if handle.is_quit() => {
                work += n;
                handle.destroy();
                tracing::info!("Backend {} quit", handle.uri());
                false
            }
            Ok(n) => {
                work += n;
                true
            }
            Err(e) => {
                work += 1;
                tracing::error!("Backend {} failed: {}", handle.uri(), e);
                handle.destroy();
                registry.remove_remote(handle.uri());
                false
            }
        });
        work
    }

    /// Tick until `deadline`, sleeping the idle interval after idle ticks
    pub fn run_until(&mut self, deadline: Instant) {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            if self.tick(now) == 0 {
                thread::sleep(self.config.backend.idle_sleep.min(deadline - now));
            }
        }
    }

    /// Destroy every backend, close the bridge and send the SSDP byebyes
    ///
    /// Returns the number of byebye messages sent.
    pub fn shutdown(mut self) -> usize {
        for handle in &mut self.backends {
            handle.destroy();
        }
        self.backends.clear();

        if let Some(mut bridge) = self.bridge.take() {
            bridge.server.close_all();
            bridge.server.iteration(Instant::now());
        }

        let sent = self.ssdp.shutdown();
        tracing::info!("Renderlink stopped, {} byebye messages sent", sent);
        sent
    }
}

/// WebSocket server plus what it needs to relay state
struct Bridge {
    listener: TcpListener,
    server: ServerContext,
    /// Client count after the previous run
    clients: usize,
}

impl Bridge {
    fn run(&mut self, now: Instant, backends: &[BackendHandle]) -> usize {
        let mut work = match self.server.accept_from(&self.listener, now) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("WebSocket accept failed: {}", e);
                0
            }
        };
        work += self.server.iteration(now);

        for msg in self.server.take_messages() {
            work += 1;
            route(&msg, backends);
        }

        let clients = self.server.num_clients();
        if clients > self.clients {
            for handle in backends {
                self.server.broadcast(&snapshot_message(handle));
            }
        }
        self.clients = clients;

        for handle in backends {
            for change in handle.state().changes().try_iter() {
                work += 1;
                if clients > 0 {
                    self.server.broadcast(&json!({
                        "event": "state_changed",
                        "backend": handle.uri(),
                        "context": change.context,
                        "variable": change.variable,
                        "value": change.value,
                        "last": change.last,
                    }));
                }
            }
        }
        work
    }
}

fn snapshot_message(handle: &BackendHandle) -> Value {
    json!({
        "event": "snapshot",
        "backend": handle.uri(),
        "state": handle.state().snapshot(),
    })
}

/// Deliver a client command to its backend, or to all of them
fn route(msg: &Value, backends: &[BackendHandle]) {
    let cmd = match BackendCommand::from_json(msg) {
        Ok(cmd) => cmd,
        Err(e) => {
            tracing::warn!("Ignoring client message {}: {}", msg, e);
            return;
        }
    };

    let target = msg.get("backend").and_then(Value::as_str);
    let mut delivered = false;
    for handle in backends.iter().filter(|h| target.map_or(true, |uri| uri == h.uri())) {
        delivered = true;
        if let Err(e) = handle.sender().send(cmd.clone()) {
            tracing::warn!("Could not queue {} for {}: {}", cmd.name(), handle.uri(), e);
        }
    }

    if !delivered {
        tracing::warn!("No backend for client command {}", cmd.name());
    }
}
