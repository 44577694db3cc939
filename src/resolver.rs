//! The synchronous resolver: a single-use waiter that
//! registers for SRV/TXT/A answers about one instance name, retries with a
//! doubling delay, and resolves into a populated `ServiceInfo` once the
//! server, address and text blob are all known.
use std::net::Ipv4Addr;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::name::Name;
use crate::node::NodeInner;
use crate::record::{Record, RecordData};
use crate::service::{Properties, ServiceInfo};

#[derive(Default)]
struct State {
    server: Option<Name>,
    srv: Option<(u16, u16, u16)>,
    address: Option<Ipv4Addr>,
    text: Option<Vec<u8>>,
    done: bool,
}

/// One in-flight resolve, registered with the node under `instance` while
/// alive. The node forwards every SRV/TXT/A answer that matches to `offer`.
pub struct Resolver {
    pub instance: Name,
    state: Mutex<State>,
    cv: Condvar,
}

impl Resolver {
    pub fn new(instance: Name) -> Arc<Resolver> {
        Arc::new(Resolver { instance, state: Mutex::new(State::default()), cv: Condvar::new() })
    }

    /// Feeds one answer record relevant to this resolve: a SRV/TXT for the
    /// instance name itself, or an A record for the server name the SRV
    /// record pointed to.
    pub fn offer(&self, record: &Record) {
        let mut state = self.state.lock().unwrap();
        match &record.data {
            RecordData::Srv { priority, weight, port, target } => {
                state.srv = Some((*priority, *weight, *port));
                state.server = Some(target.clone());
            }
            RecordData::Txt(bytes) => state.text = Some(bytes.clone()),
            RecordData::A(addr) => state.address = Some(*addr),
            _ => return,
        }
        if state.srv.is_some() && state.text.is_some() && state.address.is_some() {
            state.done = true;
            self.cv.notify_all();
        }
    }

    /// The server name named by a SRV answer seen so far, if any -- used to
    /// decide whether the next outgoing query should also ask for an A
    /// record.
    pub fn known_server(&self) -> Option<Name> {
        self.state.lock().unwrap().server.clone()
    }

    /// Blocks until satisfied or `deadline`, asking `node` to (re)send the
    /// outstanding query at `delay`, doubling each round.
    pub fn wait(self: &Arc<Self>, node: &NodeInner, mut delay: Duration, deadline: Instant) -> Option<ServiceInfo> {
        loop {
            if let Err(e) = node.send_resolve_query(self) {
                log::warn!("resolver for {}: failed to send query: {}", self.instance, e);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let wait_for = std::cmp::min(delay, deadline - now);

            let state = self.state.lock().unwrap();
            if state.done {
                break;
            }
            let (state, _timed_out) = self.cv.wait_timeout(state, wait_for).unwrap();
            let done = state.done;
            drop(state);
            if done {
                break;
            }

            delay = std::cmp::min(delay * 2, Duration::from_secs(1));
        }

        self.build()
    }

    fn build(&self) -> Option<ServiceInfo> {
        let state = self.state.lock().unwrap();
        let (priority, weight, port) = state.srv?;
        let server = state.server.clone()?;
        let address = state.address;
        let text = state.text.clone().unwrap_or_default();
        drop(state);

        let service_type = instance_service_type(&self.instance);
        let properties = Properties::from_blob(&text);

        ServiceInfo::new(&service_type, self.instance.as_str(), address, port, weight, priority, Some(server.as_str()), properties).ok()
    }
}

/// Strips the leading instance label off a fully-qualified instance name to
/// recover its service type, e.g. `My Service._http._tcp.local.` ->
/// `_http._tcp.local.`.
fn instance_service_type(instance: &Name) -> String {
    let labels = instance.labels();
    if labels.len() <= 1 {
        return instance.as_str().to_string();
    }
    format!("{}.", labels[1..].join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordClass;

    fn srv(target: &str) -> Record {
        Record::new(Name::new("a._http._tcp.local."), RecordClass::IN, true, 120, 0, RecordData::Srv { priority: 0, weight: 0, port: 8080, target: Name::new(target) })
    }

    fn txt() -> Record {
        Record::new(Name::new("a._http._tcp.local."), RecordClass::IN, true, 120, 0, RecordData::Txt(b"\x04a=b".to_vec()))
    }

    fn a(addr: [u8; 4]) -> Record {
        Record::new(Name::new("host.local."), RecordClass::IN, true, 120, 0, RecordData::A(Ipv4Addr::from(addr)))
    }

    #[test]
    fn becomes_satisfied_once_all_three_pieces_arrive() {
        let r = Resolver::new(Name::new("a._http._tcp.local."));
        r.offer(&srv("host.local."));
        assert!(!r.state.lock().unwrap().done);
        r.offer(&txt());
        assert!(!r.state.lock().unwrap().done);
        r.offer(&a([10, 0, 0, 5]));
        assert!(r.state.lock().unwrap().done);
    }

    #[test]
    fn build_populates_service_info() {
        let r = Resolver::new(Name::new("a._http._tcp.local."));
        r.offer(&srv("host.local."));
        r.offer(&txt());
        r.offer(&a([10, 0, 0, 5]));
        let info = r.build().expect("fully resolved");
        assert_eq!(info.address, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(info.port, 8080);
        assert_eq!(info.server, Name::new("host.local."));
    }

    #[test]
    fn service_type_recovered_from_instance_name() {
        assert_eq!(instance_service_type(&Name::new("My Service._http._tcp.local.")), "_http._tcp.local.");
    }
}
