//! A peer-to-peer mDNS / DNS-SD node for link-local service discovery
//! (RFC 6762 multicast DNS, RFC 6763 DNS-based service discovery).
//!
//! [`Node`] is the entry point: open one on an interface, register services
//! on it, browse for service types, and resolve instances to addresses.
//! Everything past that -- the wire codec, the record cache, the concurrent
//! engine/reaper/browser threads -- is implementation detail reachable
//! through the module tree for callers who need the lower layers directly.
pub mod browser;
pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod iface;
pub mod listener;
pub mod name;
pub mod net;
pub mod node;
pub mod reaper;
pub mod record;
pub mod resolver;
pub mod service;
pub mod time;

pub use browser::{Browser, ServiceEvent, ServiceListener};
pub use config::{Interface, NodeConfig};
pub use error::{DNSError, DNSResult};
pub use name::Name;
pub use node::Node;
pub use record::{Record, RecordClass, RecordData, RecordType};
pub use service::{Properties, PropertyValue, ServiceInfo};
