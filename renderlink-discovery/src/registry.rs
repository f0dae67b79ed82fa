//! Resource registry
//!
//! Tracks media renderers and servers by URI. Local resources are the ones
//! this process exposes and announces; remote resources are learned from
//! the network and expire unless refreshed. A URI is never tracked in both
//! tables at once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

/// What a resource does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Renderer,
    MediaServer,
}

impl ResourceClass {
    /// Derive the class from a resource URI scheme
    pub fn from_uri(uri: &str) -> Option<Self> {
        let scheme = uri.split_once("://")?.0;
        match scheme {
            "upnp-renderer" | "gmerlin-renderer" | "mpd" | "mpris2" => Some(ResourceClass::Renderer),
            "upnp-server" | "gmerlin-mdb" => Some(ResourceClass::MediaServer),
            _ => None,
        }
    }
}

/// Preference between duplicate advertisements of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ResourcePriority {
    #[default]
    Default,
    Max,
}

/// A renderer or media server known to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub uri: String,
    pub class: ResourceClass,
    /// Identity announced in `GMERLIN-ID`
    pub hash: Option<String>,
    pub label: Option<String>,
    /// Remote entries only
    pub expire_time: Option<Instant>,
    pub priority: ResourcePriority,
}

impl Resource {
    pub fn new(uri: impl Into<String>, class: ResourceClass) -> Self {
        Self {
            uri: uri.into(),
            class,
            hash: None,
            label: None,
            expire_time: None,
            priority: ResourcePriority::Default,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_priority(mut self, priority: ResourcePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_expire_time(mut self, expire_time: Instant) -> Self {
        self.expire_time = Some(expire_time);
        self
    }

    /// Time left until expiry, zero once expired
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expire_time.map(|t| t.saturating_duration_since(now))
    }
}

/// Registry change notification
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    LocalAdded(Resource),
    LocalRemoved(Resource),
    RemoteAdded(Resource),
    RemoteDeleted(Resource),
}

impl ResourceEvent {
    pub fn resource(&self) -> &Resource {
        match self {
            ResourceEvent::LocalAdded(r)
            | ResourceEvent::LocalRemoved(r)
            | ResourceEvent::RemoteAdded(r)
            | ResourceEvent::RemoteDeleted(r) => r,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    local: BTreeMap<String, Resource>,
    remote: BTreeMap<String, Resource>,
}

/// Shared registry of local and remote resources
///
/// Cloning yields another handle onto the same tables. Events are only
/// queued once someone has asked for them with [`ResourceRegistry::events`].
#[derive(Clone)]
pub struct ResourceRegistry {
    tables: Arc<RwLock<Tables>>,
    event_tx: mpsc::Sender<ResourceEvent>,
    event_rx: Arc<Mutex<mpsc::Receiver<ResourceEvent>>>,
    events_enabled: Arc<AtomicBool>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            event_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            events_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn emit(&self, event: ResourceEvent) {
        if self.events_enabled.load(Ordering::Relaxed) {
            let _ = self.event_tx.send(event);
        }
    }

    /// Register a resource exposed by this process
    ///
    /// Replaces an existing local entry with the same URI and drops any
    /// remote entry for it. Returns `true` when the URI was not local yet.
    pub fn add_local(&self, resource: Resource) -> bool {
        let inserted = {
            let mut tables = self.tables.write();
            tables.remote.remove(&resource.uri);
            tables
                .local
                .insert(resource.uri.clone(), resource.clone())
                .is_none()
        };
        tracing::info!("Local resource added: {}", resource.uri);
        self.emit(ResourceEvent::LocalAdded(resource));
        inserted
    }

    pub fn remove_local(&self, uri: &str) -> Option<Resource> {
        let removed = self.tables.write().local.remove(uri);
        if let Some(resource) = &removed {
            tracing::info!("Local resource removed: {}", uri);
            self.emit(ResourceEvent::LocalRemoved(resource.clone()));
        }
        removed
    }

    pub fn local(&self, uri: &str) -> Option<Resource> {
        self.tables.read().local.get(uri).cloned()
    }

    pub fn contains_local(&self, uri: &str) -> bool {
        self.tables.read().local.contains_key(uri)
    }

    pub fn local_resources(&self) -> Vec<Resource> {
        self.tables.read().local.values().cloned().collect()
    }

    /// Track a resource found on the network
    ///
    /// Refuses URIs that are local and URIs already tracked. Returns
    /// whether the resource was inserted.
    pub fn add_remote(&self, resource: Resource) -> bool {
        {
            let mut tables = self.tables.write();
            if tables.local.contains_key(&resource.uri) || tables.remote.contains_key(&resource.uri) {
                return false;
            }
            tables.remote.insert(resource.uri.clone(), resource.clone());
        }
        tracing::info!("Remote resource added: {}", resource.uri);
        self.emit(ResourceEvent::RemoteAdded(resource));
        true
    }

    /// Push back the expiry of a remote resource
    pub fn refresh_remote(&self, uri: &str, expire_time: Instant) -> bool {
        match self.tables.write().remote.get_mut(uri) {
            Some(resource) => {
                resource.expire_time = Some(expire_time);
                true
            }
            None => false,
        }
    }

    pub fn remove_remote(&self, uri: &str) -> Option<Resource> {
        let removed = self.tables.write().remote.remove(uri);
        if let Some(resource) = &removed {
            tracing::info!("Remote resource deleted: {}", uri);
            self.emit(ResourceEvent::RemoteDeleted(resource.clone()));
        }
        removed
    }

    pub fn remote(&self, uri: &str) -> Option<Resource> {
        self.tables.read().remote.get(uri).cloned()
    }

    pub fn remote_resources(&self) -> Vec<Resource> {
        self.tables.read().remote.values().cloned().collect()
    }

    /// Remove every remote resource whose expiry is at or before `now`
    pub fn expire_remote(&self, now: Instant) -> Vec<Resource> {
        let expired: Vec<Resource> = {
            let mut tables = self.tables.write();
            let uris: Vec<String> = tables
                .remote
                .values()
                .filter(|r| r.expire_time.is_some_and(|t| t <= now))
                .map(|r| r.uri.clone())
                .collect();
            uris.iter()
                .filter_map(|uri| tables.remote.remove(uri))
                .collect()
        };

        for resource in &expired {
            tracing::info!("Remote resource expired: {}", resource.uri);
            self.emit(ResourceEvent::RemoteDeleted(resource.clone()));
        }
        expired
    }

    /// Subscribe to registry events
    ///
    /// Events are queued from the first call on. All handles share one
    /// queue, so each event is delivered once.
    pub fn events(&self) -> ResourceEvents {
        self.events_enabled.store(true, Ordering::Relaxed);
        ResourceEvents {
            rx: Arc::clone(&self.event_rx),
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("ResourceRegistry")
            .field("local", &tables.local.len())
            .field("remote", &tables.remote.len())
            .finish()
    }
}

/// Iterator over registry events
pub struct ResourceEvents {
    rx: Arc<Mutex<mpsc::Receiver<ResourceEvent>>>,
}

impl ResourceEvents {
    /// Block until the next event is available
    pub fn recv(&self) -> Option<ResourceEvent> {
        self.rx.lock().recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ResourceEvent> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<ResourceEvent> {
        self.rx.lock().try_recv().ok()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> impl Iterator<Item = ResourceEvent> + '_ {
        std::iter::from_fn(move || self.try_recv())
    }
}

impl Iterator for ResourceEvents {
    type Item = ResourceEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}
