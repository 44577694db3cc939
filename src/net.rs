//! Socket factory: builds the listen socket and per-interface responder
//! sockets used by the engine.
//! Grounded on the `socket2`-based setup in the mDNS discovery module under
//! `other_examples/` (reuse-address/reuse-port, multicast TTL/loopback,
//! `join_multicast_v4`), adapted from tokio to blocking `std::net::UdpSocket`
//! since this crate's concurrency model is OS threads, not async.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::DNSResult;

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Builds the one shared socket the engine listens on: bound to `0.0.0.0:5353`,
/// reuse-address/reuse-port so multiple local processes can coexist, and a
/// member of the mDNS multicast group on every requested interface.
pub fn new_listen_socket(interfaces: &[Ipv4Addr]) -> DNSResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT);
    socket.bind(&bind_addr.into())?;

    for addr in interfaces {
        socket.join_multicast_v4(&MDNS_GROUP, addr)?;
    }

    // Recv is driven by the engine's select-with-timeout loop, not a blocking
    // read with no escape hatch; a short read timeout lets it poll the
    // shutdown flag without spinning.
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;

    Ok(socket.into())
}

/// Builds one responder socket per interface: bound to an ephemeral port,
/// with its outgoing multicast interface pinned so replies leave on the
/// interface the query arrived on.
pub fn new_respond_socket(interface: Ipv4Addr) -> DNSResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_ttl_v4(255)?;
    socket.set_multicast_loop_v4(true)?;

    let bind_addr = SocketAddrV4::new(interface, 0);
    socket.bind(&bind_addr.into())?;

    Ok(socket.into())
}

pub fn mdns_group_addr() -> SocketAddr {
    SocketAddr::new(MDNS_GROUP.into(), MDNS_PORT)
}
