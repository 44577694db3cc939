//! Tunable timing constants and the interface-selection type, gathered in
//! one place the way `dandyvica-dnsquery`'s `args.rs` centralizes its CLI
//! argument defaults, rather than scattered as magic numbers through the
//! protocol modules.
use std::net::Ipv4Addr;
use std::time::Duration;

/// Which network interface(s) a `Node` should bind and join the multicast
/// group on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interface {
    /// The interface the kernel would pick for outbound traffic.
    Default,
    /// Every interface `iface::resolve` can find.
    All,
    /// An explicit set of addresses, bypassing enumeration entirely.
    Addresses(Vec<Ipv4Addr>),
}

impl Default for Interface {
    fn default() -> Interface {
        Interface::Default
    }
}

/// Timing knobs for the query/response/probe/announce state machines, all
/// defaulted to the values RFC 6762 recommends.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// First PTR-query retry delay for a browser (RFC 6762 §5.2).
    pub browse_initial_delay: Duration,
    /// Cap the browser's exponential backoff at this delay.
    pub browse_max_delay: Duration,
    /// Interval between cache-reaper sweeps.
    pub reaper_interval: Duration,
    /// Spacing between the three probe queries of a registration (RFC 6762 §8.1).
    pub probe_interval: Duration,
    /// Spacing between the three unsolicited announcements (RFC 6762 §8.3).
    pub announce_interval: Duration,
    /// Spacing between the goodbye (TTL=0) packets sent on unregister.
    pub goodbye_interval: Duration,
    /// Initial retry delay for a synchronous `get_service_info` resolve.
    pub resolve_initial_delay: Duration,
    /// How many goodbye/announce rounds to send.
    pub broadcast_rounds: u32,
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            browse_initial_delay: Duration::from_millis(500),
            browse_max_delay: Duration::from_secs(20),
            reaper_interval: Duration::from_secs(10),
            probe_interval: Duration::from_millis(175),
            announce_interval: Duration::from_millis(225),
            goodbye_interval: Duration::from_millis(125),
            resolve_initial_delay: Duration::from_millis(200),
            broadcast_rounds: 3,
        }
    }
}
