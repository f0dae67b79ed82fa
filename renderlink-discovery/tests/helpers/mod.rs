//! Test helpers for driving the SSDP engine without sockets

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

use http_codec::HttpMessage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use renderlink_discovery::{ResourceRegistry, SsdpConfig, SsdpEngine, SsdpTransport};

#[derive(Default)]
pub struct FakeNetwork {
    pub multicast_in: VecDeque<(Vec<u8>, SocketAddr)>,
    pub unicast_in: VecDeque<(Vec<u8>, SocketAddr)>,
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
}

/// In-memory transport; clones share the same network
#[derive(Clone, Default)]
pub struct FakeTransport {
    pub net: Rc<RefCell<FakeNetwork>>,
}

impl FakeTransport {
    pub fn push_multicast(&self, data: &str, from: SocketAddr) {
        self.net
            .borrow_mut()
            .multicast_in
            .push_back((data.as_bytes().to_vec(), from));
    }

    pub fn push_unicast(&self, data: &str, from: SocketAddr) {
        self.net
            .borrow_mut()
            .unicast_in
            .push_back((data.as_bytes().to_vec(), from));
    }

    /// Parsed datagrams sent so far, oldest first
    pub fn sent_messages(&self) -> Vec<(HttpMessage, SocketAddr)> {
        self.net
            .borrow()
            .sent
            .iter()
            .map(|(data, addr)| (HttpMessage::parse(data).unwrap(), *addr))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.net.borrow_mut().sent.clear();
    }
}

fn pop(queue: &mut VecDeque<(Vec<u8>, SocketAddr)>, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
    let (data, addr) = queue.pop_front()?;
    let len = data.len().min(buf.len());
    buf[..len].copy_from_slice(&data[..len]);
    Some((len, addr))
}

impl SsdpTransport for FakeTransport {
    fn recv_multicast(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(pop(&mut self.net.borrow_mut().multicast_in, buf))
    }

    fn recv_unicast(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(pop(&mut self.net.borrow_mut().unicast_in, buf))
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.net.borrow_mut().sent.push((data.to_vec(), addr));
        Ok(data.len())
    }
}

/// Engine with a fixed seed; searching is disabled unless asked for
pub fn engine(
    registry: &ResourceRegistry,
    config: SsdpConfig,
    start: Instant,
) -> (SsdpEngine<FakeTransport, StdRng>, FakeTransport) {
    let transport = FakeTransport::default();
    let engine = SsdpEngine::with_rng(
        transport.clone(),
        registry.clone(),
        config,
        StdRng::seed_from_u64(42),
        start,
    )
    .unwrap();
    (engine, transport)
}

pub fn peer() -> SocketAddr {
    "10.0.0.5:1900".parse().unwrap()
}

pub fn renderer_notify(location: &str, nts: &str, max_age: u32) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
         NTS: {}\r\n\
         SERVER: Linux/5.10 UPnP/1.0 Test/1.0\r\n\
         USN: uuid:11111111-2222-3333-4444-555555555555::urn:schemas-upnp-org:device:MediaRenderer:1\r\n\
         \r\n",
        max_age, location, nts
    )
}

pub fn m_search(st: &str, mx: u32) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: 239.255.255.250:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         \r\n",
        mx, st
    )
}
