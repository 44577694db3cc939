//! Dispatches freshly-received datagrams from the engine to the node's
//! query/response handlers, based on what the sender's source port implies
//! about who it expects to hear back: 5353 is a normal multicast query,
//! 53 is a legacy unicast mDNS client expecting both a direct unicast reply
//! and the usual multicast one, and anything else is neither and is dropped.
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use crate::codec::Incoming;
use crate::engine::PacketHandler;
use crate::net::MDNS_PORT;
use crate::node::NodeInner;

/// The conventional unicast DNS port a legacy mDNS client queries from.
const LEGACY_UNICAST_PORT: u16 = 53;

pub struct Listener {
    pub node: Weak<NodeInner>,
}

impl PacketHandler for Listener {
    fn on_packet(&self, data: &[u8], from: SocketAddr) {
        let node = match self.node.upgrade() {
            Some(n) => n,
            None => return,
        };

        let incoming = match Incoming::parse(data) {
            Ok(incoming) => incoming,
            Err(e) => {
                log::debug!("listener: dropping unparsable packet from {}: {}", from, e);
                return;
            }
        };

        if !incoming.is_query() {
            node.handle_response(&incoming);
            return;
        }

        match from.port() {
            MDNS_PORT => node.handle_query(&incoming, None),
            LEGACY_UNICAST_PORT => node.handle_query(&incoming, Some(from)),
            _ => log::trace!("listener: dropping query from non-mDNS source port {}", from),
        }
    }
}
