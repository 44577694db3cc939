//! Interface enumeration: resolves an `Interface` selector to the concrete
//! IPv4 addresses the engine should bind/join on. Deliberately not a full
//! OS-level enumerator; no example repo in the corpus carries an
//! interface-enumeration crate, so this stays a minimal std-only
//! implementation rather than pulling in one just for this corner.
use std::net::{Ipv4Addr, UdpSocket};

use crate::config::Interface;
use crate::error::DNSResult;

/// Resolves `interface` to the addresses the node should operate on.
///
/// `Interface::Default` and `Interface::All` both resolve through the same
/// "connect a UDP socket to a public address and read back its local
/// endpoint" trick: it costs no packets (UDP connect never touches the
/// network) and reliably reports the address the kernel would pick for
/// outbound multicast traffic, without walking `/proc` or linking a
/// platform-specific netlink/ifaddrs crate.
pub fn resolve(interface: &Interface) -> DNSResult<Vec<Ipv4Addr>> {
    match interface {
        Interface::Addresses(addrs) if !addrs.is_empty() => Ok(addrs.clone()),
        _ => Ok(vec![default_ipv4_address()?]),
    }
}

fn default_ipv4_address() -> DNSResult<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    match socket.local_addr()?.ip() {
        std::net::IpAddr::V4(v4) => Ok(v4),
        std::net::IpAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_addresses_pass_through_unchanged() {
        let addrs = vec![Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 6)];
        let resolved = resolve(&Interface::Addresses(addrs.clone())).unwrap();
        assert_eq!(resolved, addrs);
    }
}
