//! SSDP announce and search engine
//!
//! The engine is driven by repeated calls to [`SsdpEngine::update`], each
//! doing whatever work is due at the given instant without blocking.
//! Local devices come from the [`ResourceRegistry`]; remote devices heard
//! on the network are written back into it.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use http_codec::{max_age, HttpMessage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SsdpConfig;
use crate::error::Result;
use crate::message::{
    notify_message, search_reply, search_request, starts_with_i, LocalDevice, GMERLIN_ID_HEADER,
    GMERLIN_RENDERER_NT, GMERLIN_SERVER_NT, UPNP_RENDERER_NT_PREFIX, UPNP_SERVER_NT_PREFIX,
};
use crate::registry::{Resource, ResourceClass, ResourcePriority, ResourceRegistry};
use crate::transport::{multicast_group, SsdpTransport};

const UDP_BUFFER_SIZE: usize = 2048;

/// A datagram waiting to be sent to one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastEntry {
    pub addr: SocketAddr,
    pub message: Vec<u8>,
    /// `None` sends on the next update
    pub send_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceState {
    /// Repeating quickly after the device appeared
    Announcing,
    Steady,
}

/// Notification schedule of one local device
#[derive(Debug, Clone)]
pub struct Announcement {
    pub device: LocalDevice,
    pub next_notify: Instant,
    pub notify_count: u32,
    pub state: AnnounceState,
}

/// Draw a uniformly random delay from `(min, max)`
pub(crate) fn random_delay<R: Rng>(rng: &mut R, (min, max): (Duration, Duration)) -> Duration {
    if max <= min {
        min
    } else {
        rng.gen_range(min..=max)
    }
}

/// SSDP engine
pub struct SsdpEngine<T: SsdpTransport, R: Rng = StdRng> {
    transport: T,
    registry: ResourceRegistry,
    config: SsdpConfig,
    rng: R,
    multicast_queue: VecDeque<Vec<u8>>,
    unicast_queue: Vec<UnicastEntry>,
    next_multicast_time: Instant,
    search_count: u32,
    next_search_time: Option<Instant>,
    announcements: BTreeMap<String, Announcement>,
}

impl<T: SsdpTransport> SsdpEngine<T, StdRng> {
    /// Create an engine with an entropy-seeded RNG, starting now
    pub fn new(transport: T, registry: ResourceRegistry, config: SsdpConfig) -> Result<Self> {
        Self::with_rng(transport, registry, config, StdRng::from_entropy(), Instant::now())
    }
}

impl<T: SsdpTransport, R: Rng> SsdpEngine<T, R> {
    /// Create an engine with an explicit RNG and start instant
    pub fn with_rng(
        transport: T,
        registry: ResourceRegistry,
        config: SsdpConfig,
        mut rng: R,
        start: Instant,
    ) -> Result<Self> {
        config.validate()?;
        let next_multicast_time = start + random_delay(&mut rng, config.initial_multicast_delay);

        Ok(Self {
            transport,
            registry,
            config,
            rng,
            multicast_queue: VecDeque::new(),
            unicast_queue: Vec::new(),
            next_multicast_time,
            search_count: 0,
            next_search_time: None,
            announcements: BTreeMap::new(),
        })
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SsdpConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn multicast_queue_len(&self) -> usize {
        self.multicast_queue.len()
    }

    pub fn unicast_queue(&self) -> &[UnicastEntry] {
        &self.unicast_queue
    }

    pub fn next_multicast_time(&self) -> Instant {
        self.next_multicast_time
    }

    pub fn next_search_time(&self) -> Option<Instant> {
        self.next_search_time
    }

    pub fn search_count(&self) -> u32 {
        self.search_count
    }

    pub fn announcement(&self, uri: &str) -> Option<&Announcement> {
        self.announcements.get(uri)
    }

    pub fn announcements(&self) -> impl Iterator<Item = &Announcement> {
        self.announcements.values()
    }

    /// Do all work due at `now`
    ///
    /// Returns how many datagrams were handled, sent or queued plus the
    /// number of expired remote devices. Zero means the engine was idle.
    pub fn update(&mut self, now: Instant) -> usize {
        let mut work = 0;
        work += self.drain_multicast(now);
        work += self.drain_unicast(now);
        work += self.flush_multicast(now);
        work += self.flush_unicast(now);
        work += self.registry.expire_remote(now).len();
        work += self.search(now);
        work += self.sync_local_devices(now);
        work += self.notify(now);
        work
    }

    /// Say goodbye for every announced device and flush the multicast queue
    ///
    /// The flush ignores the multicast rate limit. Returns the number of
    /// datagrams sent.
    pub fn shutdown(mut self) -> usize {
        let announcements = std::mem::take(&mut self.announcements);
        for announcement in announcements.values() {
            tracing::info!("Sending byebye for {}", announcement.device.uri);
            self.queue_group(&announcement.device, false);
        }

        let group = multicast_group();
        let mut sent = 0;
        while let Some(datagram) = self.multicast_queue.pop_front() {
            match self.transport.send_to(&datagram, group) {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!("Failed to send multicast datagram: {}", e),
            }
        }
        sent
    }

    fn drain_multicast(&mut self, now: Instant) -> usize {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        let mut handled = 0;
        loop {
            match self.transport.recv_multicast(&mut buf) {
                Ok(Some((len, sender))) => {
                    self.handle_multicast(&buf[..len], sender, now);
                    handled += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Multicast receive failed: {}", e);
                    break;
                }
            }
        }
        handled
    }

    fn drain_unicast(&mut self, now: Instant) -> usize {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        let mut handled = 0;
        loop {
            match self.transport.recv_unicast(&mut buf) {
                Ok(Some((len, _))) => {
                    self.handle_unicast(&buf[..len], now);
                    handled += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Unicast receive failed: {}", e);
                    break;
                }
            }
        }
        handled
    }

    fn handle_multicast(&mut self, data: &[u8], sender: SocketAddr, now: Instant) {
        let msg = match HttpMessage::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Dropping malformed datagram from {}: {}", sender, e);
                return;
            }
        };

        let Some(method) = msg.method() else {
            return;
        };

        if method.eq_ignore_ascii_case("M-SEARCH") {
            let (Some(st), Some(mx)) = (msg.header("ST"), msg.header("MX")) else {
                tracing::debug!("Dropping M-SEARCH without ST/MX from {}", sender);
                return;
            };
            // MX must be at least 1
            let Some(mx) = mx.trim().parse::<u32>().ok().filter(|&mx| mx >= 1) else {
                tracing::debug!("Dropping M-SEARCH with bad MX from {}", sender);
                return;
            };
            self.handle_search(st, mx, sender, now);
        } else if method.eq_ignore_ascii_case("NOTIFY") {
            let (Some(nt), Some(location), Some(nts)) =
                (msg.header("NT"), msg.header("LOCATION"), msg.header("NTS"))
            else {
                return;
            };
            let alive = nts == "ssdp:alive";
            let age = msg.header("CACHE-CONTROL").and_then(max_age);
            self.update_remote(nt, location, alive, age, msg.header(GMERLIN_ID_HEADER), now);
        }
    }

    fn handle_unicast(&mut self, data: &[u8], now: Instant) {
        let msg = match HttpMessage::parse(data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Dropping malformed search response: {}", e);
                return;
            }
        };

        if msg.status() != Some(200) {
            return;
        }
        let (Some(st), Some(location)) = (msg.header("ST"), msg.header("LOCATION")) else {
            return;
        };
        let age = msg.header("CACHE-CONTROL").and_then(max_age);
        self.update_remote(st, location, true, age, msg.header(GMERLIN_ID_HEADER), now);
    }

    /// Queue replies to a search for every announced local device
    fn handle_search(&mut self, st: &str, mx: u32, sender: SocketAddr, now: Instant) -> usize {
        let mx = mx.min(5);
        let window = (Duration::from_millis(10), Duration::from_secs(u64::from(mx)));
        let mut queued = 0;

        for announcement in self.announcements.values() {
            for target in announcement.device.search_targets(st) {
                let reply = search_reply(&announcement.device, &target, &self.config);
                let delay = random_delay(&mut self.rng, window);
                self.unicast_queue.push(UnicastEntry {
                    addr: sender,
                    message: reply.to_bytes(),
                    send_at: Some(now + delay),
                });
                queued += 1;
            }
        }

        if queued > 0 {
            tracing::debug!("Queued {} search replies for {} ({})", queued, sender, st);
        }
        queued
    }

    /// Apply an advertisement heard on the network to the registry
    ///
    /// Only media renderer and server device types are tracked. Returns
    /// whether a remote device was added or removed.
    pub fn update_remote(
        &mut self,
        nt: &str,
        location: &str,
        alive: bool,
        max_age: Option<i64>,
        gmerlin_id: Option<&str>,
        now: Instant,
    ) -> bool {
        let (uri, class, priority) = if starts_with_i(nt, UPNP_SERVER_NT_PREFIX) {
            let Some(pos) = location.find("://") else {
                return false;
            };
            (
                format!("upnp-server{}", &location[pos..]),
                ResourceClass::MediaServer,
                ResourcePriority::Default,
            )
        } else if starts_with_i(nt, UPNP_RENDERER_NT_PREFIX) {
            let Some(pos) = location.find("://") else {
                return false;
            };
            (
                format!("upnp-renderer{}", &location[pos..]),
                ResourceClass::Renderer,
                ResourcePriority::Default,
            )
        } else if nt.eq_ignore_ascii_case(GMERLIN_SERVER_NT) {
            (location.to_string(), ResourceClass::MediaServer, ResourcePriority::Max)
        } else if nt.eq_ignore_ascii_case(GMERLIN_RENDERER_NT) {
            (location.to_string(), ResourceClass::Renderer, ResourcePriority::Max)
        } else {
            return false;
        };

        if self.registry.contains_local(&uri) {
            return false;
        }

        if !alive {
            tracing::debug!("Got byebye for {}", uri);
            return self.registry.remove_remote(&uri).is_some();
        }

        let expire_time = match max_age {
            Some(age) if age > 0 => now.checked_add(Duration::from_secs(age as u64)),
            _ => None,
        };
        let Some(expire_time) = expire_time else {
            tracing::debug!("Ignoring alive for {} without valid max-age", uri);
            return false;
        };

        if self.registry.refresh_remote(&uri, expire_time) {
            return false;
        }

        let mut resource = Resource::new(uri, class)
            .with_priority(priority)
            .with_expire_time(expire_time);
        if let Some(id) = gmerlin_id {
            resource = resource.with_hash(id);
        }
        self.registry.add_remote(resource)
    }

    fn flush_multicast(&mut self, now: Instant) -> usize {
        if now < self.next_multicast_time {
            return 0;
        }
        let Some(datagram) = self.multicast_queue.pop_front() else {
            return 0;
        };

        if let Err(e) = self.transport.send_to(&datagram, multicast_group()) {
            tracing::warn!("Failed to send multicast datagram: {}", e);
        }
        self.next_multicast_time = now + random_delay(&mut self.rng, self.config.multicast_flush_interval);
        1
    }

    fn flush_unicast(&mut self, now: Instant) -> usize {
        let (due, pending): (Vec<UnicastEntry>, Vec<UnicastEntry>) = std::mem::take(&mut self.unicast_queue)
            .into_iter()
            .partition(|entry| entry.send_at.map_or(true, |t| t <= now));
        self.unicast_queue = pending;

        for entry in &due {
            if let Err(e) = self.transport.send_to(&entry.message, entry.addr) {
                tracing::warn!("Failed to send to {}: {}", entry.addr, e);
            }
        }
        due.len()
    }

    fn search(&mut self, now: Instant) -> usize {
        if !self.config.search_enabled {
            return 0;
        }
        if self.next_search_time.is_some_and(|t| now < t) {
            return 0;
        }

        self.multicast_queue
            .push_back(search_request(self.config.search_mx).to_bytes());
        tracing::debug!("Queued search request");

        let interval = if self.search_count < self.config.search_burst_count {
            self.search_count += 1;
            self.config.search_burst_interval
        } else {
            self.search_count = 0;
            self.config.search_steady_interval
        };
        self.next_search_time = Some(now + random_delay(&mut self.rng, interval));
        1
    }

    /// Start announcing new local devices and say goodbye for removed ones
    fn sync_local_devices(&mut self, now: Instant) -> usize {
        let local: BTreeMap<String, LocalDevice> = self
            .registry
            .local_resources()
            .iter()
            .filter_map(LocalDevice::from_resource)
            .map(|device| (device.uri.clone(), device))
            .collect();

        let mut changed = 0;

        let removed: Vec<String> = self
            .announcements
            .keys()
            .filter(|uri| !local.contains_key(*uri))
            .cloned()
            .collect();
        for uri in removed {
            if let Some(announcement) = self.announcements.remove(&uri) {
                tracing::info!("Sending byebye for {}", uri);
                self.queue_group(&announcement.device, false);
                changed += 1;
            }
        }

        for (uri, device) in local {
            match self.announcements.get_mut(&uri) {
                Some(announcement) => announcement.device.hash = device.hash,
                None => {
                    tracing::info!("Announcing local device {}", uri);
                    let next_notify = now + random_delay(&mut self.rng, self.config.initial_notify_delay);
                    self.announcements.insert(
                        uri,
                        Announcement {
                            device,
                            next_notify,
                            notify_count: 0,
                            state: AnnounceState::Announcing,
                        },
                    );
                    changed += 1;
                }
            }
        }

        changed
    }

    fn notify(&mut self, now: Instant) -> usize {
        let due: Vec<String> = self
            .announcements
            .values()
            .filter(|a| a.next_notify <= now)
            .map(|a| a.device.uri.clone())
            .collect();

        for uri in &due {
            let Some(announcement) = self.announcements.get_mut(uri) else {
                continue;
            };

            let interval = if announcement.notify_count < self.config.notify_burst_count {
                announcement.notify_count += 1;
                announcement.state = AnnounceState::Announcing;
                self.config.notify_burst_interval
            } else {
                announcement.notify_count = 0;
                announcement.state = AnnounceState::Steady;
                self.config.notify_steady_interval
            };
            announcement.next_notify = now + random_delay(&mut self.rng, interval);

            let device = announcement.device.clone();
            self.queue_group(&device, true);
        }
        due.len()
    }

    fn queue_group(&mut self, device: &LocalDevice, alive: bool) {
        for target in device.targets() {
            let msg = notify_message(device, &target, alive, &self.config);
            self.multicast_queue.push_back(msg.to_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Default)]
    struct NullTransport {
        sent: Vec<(Vec<u8>, SocketAddr)>,
    }

    impl SsdpTransport for NullTransport {
        fn recv_multicast(&mut self, _buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
            Ok(None)
        }

        fn recv_unicast(&mut self, _buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
            Ok(None)
        }

        fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
            self.sent.push((data.to_vec(), addr));
            Ok(data.len())
        }
    }

    fn engine(start: Instant) -> SsdpEngine<NullTransport, StdRng> {
        SsdpEngine::with_rng(
            NullTransport::default(),
            ResourceRegistry::new(),
            SsdpConfig::default(),
            StdRng::seed_from_u64(7),
            start,
        )
        .unwrap()
    }

    #[test]
    fn test_random_delay_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let range = (Duration::from_secs(1), Duration::from_secs(3));
        for _ in 0..100 {
            let d = random_delay(&mut rng, range);
            assert!(d >= range.0 && d <= range.1);
        }
        let fixed = (Duration::from_millis(5), Duration::from_millis(5));
        assert_eq!(random_delay(&mut rng, fixed), Duration::from_millis(5));
    }

    #[test]
    fn test_initial_multicast_delay() {
        let start = Instant::now();
        let engine = engine(start);
        let delay = engine.next_multicast_time() - start;
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
    }

    #[test]
    fn test_search_schedule() {
        let start = Instant::now();
        let mut engine = engine(start);
        let mut now = start;

        for expected_count in 1..=3 {
            assert_eq!(engine.search(now), 1);
            assert_eq!(engine.search_count(), expected_count);
            let next = engine.next_search_time().unwrap();
            let delay = next - now;
            assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));
            assert_eq!(engine.search(now), 0);
            now = next;
        }

        assert_eq!(engine.search(now), 1);
        assert_eq!(engine.search_count(), 0);
        let delay = engine.next_search_time().unwrap() - now;
        assert!(delay >= Duration::from_secs(500) && delay <= Duration::from_secs(1000));
        assert_eq!(engine.multicast_queue_len(), 4);
    }

    #[test]
    fn test_search_disabled() {
        let start = Instant::now();
        let mut engine = SsdpEngine::with_rng(
            NullTransport::default(),
            ResourceRegistry::new(),
            SsdpConfig::default().with_search(false),
            StdRng::seed_from_u64(7),
            start,
        )
        .unwrap();
        assert_eq!(engine.update(start + Duration::from_secs(10)), 0);
    }

    #[test]
    fn test_multicast_rate_limit() {
        let start = Instant::now();
        let mut engine = engine(start);
        for _ in 0..3 {
            engine.multicast_queue.push_back(b"x".to_vec());
        }

        assert_eq!(engine.flush_multicast(start), 0);

        let first = engine.next_multicast_time();
        assert_eq!(engine.flush_multicast(first), 1);
        assert_eq!(engine.flush_multicast(first), 0);

        let gap = engine.next_multicast_time() - first;
        assert!(gap >= Duration::from_millis(10) && gap <= Duration::from_millis(100));
        assert_eq!(engine.transport().sent.len(), 1);
        assert_eq!(engine.transport().sent[0].1, multicast_group());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SsdpEngine::with_rng(
            NullTransport::default(),
            ResourceRegistry::new(),
            SsdpConfig::default().with_max_age(0),
            StdRng::seed_from_u64(7),
            Instant::now(),
        );
        assert!(result.is_err());
    }
}
