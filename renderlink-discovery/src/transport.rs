//! UDP transport for the SSDP engine
//!
//! The engine talks to the network only through [`SsdpTransport`], so it
//! can be driven by an in-memory transport in tests.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::SsdpConfig;
use crate::error::{DiscoveryError, Result};

/// SSDP multicast group
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port
pub const SSDP_PORT: u16 = 1900;

/// `239.255.255.250:1900` as a socket address
pub fn multicast_group() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT))
}

/// Non-blocking datagram I/O used by the engine
///
/// Receive methods return `Ok(None)` when nothing is pending.
pub trait SsdpTransport {
    /// Receive from the socket joined to the multicast group
    fn recv_multicast(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Receive from the unicast socket (search responses)
    fn recv_unicast(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Send a datagram from the unicast socket
    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

/// Transport over two real UDP sockets
#[derive(Debug)]
pub struct UdpTransport {
    multicast: UdpSocket,
    unicast: UdpSocket,
}

impl UdpTransport {
    /// Bind the multicast listener on port 1900 and an ephemeral unicast socket
    pub fn bind(config: &SsdpConfig) -> Result<Self> {
        let multicast = Self::bind_multicast()?;
        let unicast = Self::bind_unicast(config.multicast_ttl)?;

        tracing::debug!(
            "SSDP transport bound, unicast port {}",
            unicast.local_addr().map(|a| a.port()).unwrap_or_default()
        );

        Ok(Self { multicast, unicast })
    }

    fn bind_multicast() -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to create multicast socket: {}", e))
        })?;

        socket.set_reuse_address(true).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to set SO_REUSEADDR: {}", e))
        })?;

        #[cfg(unix)]
        if let Err(e) = socket.set_reuse_port(true) {
            tracing::debug!("SO_REUSEPORT unavailable: {}", e);
        }

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT));
        socket.bind(&bind_addr.into()).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to bind {}: {}", bind_addr, e))
        })?;

        socket
            .join_multicast_v4(&SSDP_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| {
                DiscoveryError::NetworkError(format!("Failed to join multicast group: {}", e))
            })?;

        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }

    fn bind_unicast(ttl: u32) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to create unicast socket: {}", e))
        })?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        socket.bind(&bind_addr.into()).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to bind unicast socket: {}", e))
        })?;

        socket.set_multicast_ttl_v4(ttl)?;
        socket.set_multicast_loop_v4(true)?;
        socket.set_nonblocking(true)?;
        Ok(socket.into())
    }
}

fn recv_nonblocking(socket: &UdpSocket, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
    match socket.recv_from(buf) {
        Ok(received) => Ok(Some(received)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e),
    }
}

impl SsdpTransport for UdpTransport {
    fn recv_multicast(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        recv_nonblocking(&self.multicast, buf)
    }

    fn recv_unicast(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        recv_nonblocking(&self.unicast, buf)
    }

    fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.unicast.send_to(data, addr)
    }
}
