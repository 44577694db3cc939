//! The node: the top-level coordinator tying the cache, engine, reaper,
//! browsers and resolvers together. `NodeInner` holds
//! the shared state and is wrapped in `Arc` so the engine's listener, every
//! browser thread and the reaper can each hold a handle to it; `Node` owns
//! the engine and reaper threads themselves and is the public handle callers
//! register/browse/resolve/close through.
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::browser::{Browser, ServiceEvent, ServiceListener};
use crate::cache::DNSCache;
use crate::codec::{Incoming, Outgoing, FLAG_AA, FLAG_QR};
use crate::config::{Interface, NodeConfig};
use crate::engine::Engine;
use crate::error::{DNSError, DNSResult};
use crate::iface;
use crate::listener::Listener;
use crate::name::Name;
use crate::net;
use crate::reaper::Reaper;
use crate::record::{Question, Record, RecordClass, RecordData, RecordType};
use crate::resolver::Resolver;
use crate::service::ServiceInfo;

const META_QUERY_TYPE: &str = "_services._dns-sd._udp.local.";
const META_QUERY_TTL: u32 = 4500;

pub struct NodeInner {
    cache: Mutex<DNSCache>,
    browsers: Mutex<Vec<Arc<Browser>>>,
    browser_handles: Mutex<Vec<JoinHandle<()>>>,
    resolvers: Mutex<Vec<Arc<Resolver>>>,
    services: Mutex<HashMap<String, ServiceInfo>>,
    service_types: Mutex<HashSet<String>>,
    respond_sockets: Mutex<Vec<(Ipv4Addr, std::net::UdpSocket)>>,
    pub(crate) shutdown: Mutex<bool>,
    pub(crate) condvar: Condvar,
    config: NodeConfig,
}

impl NodeInner {
    fn send(&self, out: &Outgoing) -> DNSResult<()> {
        self.send_to(out, net::mdns_group_addr())
    }

    fn send_to(&self, out: &Outgoing, target: SocketAddr) -> DNSResult<()> {
        let packet = out.packet()?;
        let sockets = self.respond_sockets.lock().unwrap();
        for (_, socket) in sockets.iter() {
            let written = socket.send_to(&packet, target)?;
            if written != packet.len() {
                return Err(DNSError::SendFailure);
            }
        }
        Ok(())
    }

    /// Handles one parsed response: updates the cache, fans `ServiceEvent`s
    /// out to browsers, and feeds answers to waiting resolvers. A record
    /// arriving with ttl 0 is a goodbye and is evicted immediately rather
    /// than left for the reaper to find on its next sweep.
    pub fn handle_response(&self, incoming: &Incoming) {
        for record in incoming.answers.iter().chain(incoming.additionals.iter()) {
            if record.ttl == 0 {
                let existed = self.cache.lock().unwrap().get(record).is_some();
                if existed {
                    self.cache.lock().unwrap().remove(record);
                    self.notify_browsers(record, false);
                }
                continue;
            }

            let is_new = self.cache.lock().unwrap().get(record).is_none();
            self.cache.lock().unwrap().add(record.clone());
            if is_new {
                self.notify_browsers(record, true);
            }
            self.feed_resolvers(record);
        }
        self.condvar.notify_all();
    }

    fn feed_resolvers(&self, record: &Record) {
        let resolvers = self.resolvers.lock().unwrap();
        for resolver in resolvers.iter() {
            let matches = record.name == resolver.instance || resolver.known_server().map(|s| s == record.name).unwrap_or(false);
            if matches {
                resolver.offer(record);
            }
        }
    }

    fn notify_browsers(&self, record: &Record, added: bool) {
        if let RecordData::Ptr(ref instance) = record.data {
            let browsers = self.browsers.lock().unwrap();
            for browser in browsers.iter() {
                if browser.service_type == record.name {
                    browser.notify(if added { ServiceEvent::Added(instance.clone()) } else { ServiceEvent::Removed(instance.clone()) });
                }
            }
        }
    }

    /// Handles one parsed query: the `_services._dns-sd._udp.local.`
    /// enumeration meta-query, registered-type PTR browsing, and
    /// instance/host SRV/TXT/A lookups. Answers already
    /// present as known answers in the incoming message are suppressed
    /// before anything is sent. When `unicast_reply_to` is set the query
    /// came from the conventional unicast DNS port and gets a direct
    /// unicast reply (echoing its id and questions) in addition to the
    /// usual multicast one.
    pub fn handle_query(&self, incoming: &Incoming, unicast_reply_to: Option<SocketAddr>) {
        let now = crate::time::now_millis();
        let mut answers: Vec<Record> = Vec::new();
        let mut additionals: Vec<Record> = Vec::new();

        for question in &incoming.questions {
            self.answer_question(question, now, &mut answers, &mut additionals);
        }

        answers.retain(|a| !incoming.suppresses(a));
        if answers.is_empty() {
            return;
        }

        let mut multicast = Outgoing::new(FLAG_QR | FLAG_AA, true);
        for a in &answers {
            multicast.add_answer(a.clone(), Some(now));
        }
        for a in &additionals {
            multicast.add_additional(a.clone());
        }
        if let Err(e) = self.send(&multicast) {
            log::warn!("node: failed to send multicast response: {}", e);
        }

        if let Some(target) = unicast_reply_to {
            let mut unicast = Outgoing::new(FLAG_QR | FLAG_AA, false);
            unicast.set_id(incoming.id);
            for q in &incoming.questions {
                unicast.add_question(q.clone());
            }
            for a in &answers {
                unicast.add_answer(a.clone(), Some(now));
            }
            for a in &additionals {
                unicast.add_additional(a.clone());
            }
            if let Err(e) = self.send_to(&unicast, target) {
                log::warn!("node: failed to send unicast response to {}: {}", target, e);
            }
        }
    }

    fn answer_question(&self, question: &Question, now: u64, answers: &mut Vec<Record>, additionals: &mut Vec<Record>) {
        if question.name == Name::new(META_QUERY_TYPE) && matches!(question.qtype, RecordType::PTR | RecordType::ANY) {
            let types = self.service_types.lock().unwrap();
            for ty in types.iter() {
                answers.push(Record::new(Name::new(META_QUERY_TYPE), RecordClass::IN, false, META_QUERY_TTL, now, RecordData::Ptr(Name::new(ty))));
            }
            return;
        }

        let services = self.services.lock().unwrap();

        if matches!(question.qtype, RecordType::PTR | RecordType::ANY) {
            for info in services.values() {
                if info.service_type == question.name {
                    answers.push(Record::new(info.service_type.clone(), RecordClass::IN, false, META_QUERY_TTL, now, RecordData::Ptr(info.instance_name.clone())));
                }
            }
        }

        for info in services.values() {
            if info.instance_name != question.name {
                continue;
            }
            if matches!(question.qtype, RecordType::SRV | RecordType::ANY) {
                answers.push(Record::new(
                    info.instance_name.clone(),
                    RecordClass::IN,
                    true,
                    120,
                    now,
                    RecordData::Srv { priority: info.priority, weight: info.weight, port: info.port, target: info.server.clone() },
                ));
            }
            if matches!(question.qtype, RecordType::TXT | RecordType::ANY) {
                answers.push(Record::new(info.instance_name.clone(), RecordClass::IN, true, META_QUERY_TTL, now, RecordData::Txt(info.text_blob())));
            }
            if let Some(addr) = info.address {
                additionals.push(Record::new(info.server.clone(), RecordClass::IN, true, 120, now, RecordData::A(addr)));
            }
        }

        if matches!(question.qtype, RecordType::A | RecordType::ANY) {
            for info in services.values() {
                if info.server == question.name {
                    if let Some(addr) = info.address {
                        answers.push(Record::new(info.server.clone(), RecordClass::IN, true, 120, now, RecordData::A(addr)));
                    }
                }
            }
        }
    }

    /// Evicts every cached record whose ordinary ttl countdown has expired,
    /// notifying browsers before removing it from the cache.
    pub fn reap_expired(&self) {
        let now = crate::time::now_millis();
        let expired: Vec<Record> = {
            let cache = self.cache.lock().unwrap();
            cache.entries().into_iter().filter(|r| r.is_expired(now)).collect()
        };
        for record in &expired {
            self.notify_browsers(record, false);
            self.cache.lock().unwrap().remove(record);
        }
    }

    pub fn send_browse_query(&self, service_type: &Name) -> DNSResult<()> {
        let now = crate::time::now_millis();
        let mut out = Outgoing::new(0, true);
        out.add_question(Question::new(service_type.clone(), RecordType::PTR, RecordClass::IN));
        for record in self.cache.lock().unwrap().entries_with_name(&service_type.key()) {
            if !record.is_stale(now) {
                out.add_answer(record.clone(), Some(now));
            }
        }
        self.send(&out)
    }

    pub fn send_resolve_query(&self, resolver: &Resolver) -> DNSResult<()> {
        let mut out = Outgoing::new(0, true);
        out.add_question(Question::new(resolver.instance.clone(), RecordType::SRV, RecordClass::IN));
        out.add_question(Question::new(resolver.instance.clone(), RecordType::TXT, RecordClass::IN));
        if let Some(server) = resolver.known_server() {
            out.add_question(Question::new(server, RecordType::A, RecordClass::IN));
        }

        let now = crate::time::now_millis();
        for record in self.cache.lock().unwrap().entries_with_name(&resolver.instance.key()) {
            if !record.is_stale(now) {
                out.add_answer(record.clone(), Some(now));
            }
        }
        self.send(&out)
    }

    pub fn remove_browser(&self, browser: &Browser) {
        self.browsers.lock().unwrap().retain(|b| !std::ptr::eq(b.as_ref(), browser));
    }

    /// Registers `info`: a uniqueness probe (mangling the instance name once
    /// and retrying only if it has no dot in it, otherwise raising on a real
    /// collision), then three unsolicited announce rounds (RFC 6762 §8).
    pub fn register_service(&self, mut info: ServiceInfo, ttl: u32) -> DNSResult<ServiceInfo> {
        self.probe(&mut info)?;

        self.announce(&info, ttl)?;

        self.services.lock().unwrap().insert(info.instance_name.key(), info.clone());
        self.service_types.lock().unwrap().insert(info.service_type.key());

        Ok(info)
    }

    /// Uniqueness probe (spec.md §4.8 item 1, `zeroconf.py`'s `check_service`):
    /// up to `broadcast_rounds` rounds, each first scanning the cache for a
    /// non-expired PTR(info.type) whose alias equals `info.name`. On a
    /// collision, a name with no dot in it is mangled once and the probe
    /// restarts; any other collision raises `NameNotUnique` (every valid
    /// instance name already has a dot, since it's suffixed by the dotted
    /// service type, so in practice a collision always raises). Absent a
    /// collision, each round sends a `QR_QUERY|AA` message carrying one PTR
    /// question on the type plus an authoritative PTR(type→name) record,
    /// spaced `probe_interval` apart.
    fn probe(&self, info: &mut ServiceInfo) -> DNSResult<()> {
        let mut attempts = 0;
        loop {
            let mut collided = false;

            for _ in 0..self.config.broadcast_rounds {
                let now = crate::time::now_millis();
                let collision = {
                    let cache = self.cache.lock().unwrap();
                    cache.entries_with_name(&info.service_type.key()).iter().any(|r| {
                        !r.is_expired(now) && matches!(&r.data, RecordData::Ptr(alias) if alias == &info.instance_name)
                    })
                };
                if collision {
                    collided = true;
                    break;
                }

                let mut out = Outgoing::new(FLAG_QR | FLAG_AA, true);
                out.add_question(Question::new(info.service_type.clone(), RecordType::PTR, RecordClass::IN));
                out.add_authority(Record::new(info.service_type.clone(), RecordClass::IN, false, 120, 0, RecordData::Ptr(info.instance_name.clone())));
                self.send(&out)?;
                thread::sleep(self.config.probe_interval);
            }

            if !collided {
                return Ok(());
            }

            if info.instance_name.as_str().trim_end_matches('.').contains('.') {
                return Err(DNSError::NameNotUnique(info.instance_name.as_str().to_string()));
            }

            attempts += 1;
            if attempts >= 10 {
                return Err(DNSError::NameNotUnique(info.instance_name.as_str().to_string()));
            }
            info.mangle_name();
        }
    }

    fn announce(&self, info: &ServiceInfo, ttl: u32) -> DNSResult<()> {
        for _ in 0..self.config.broadcast_rounds {
            let now = crate::time::now_millis();
            let mut out = Outgoing::new(FLAG_QR | FLAG_AA, true);
            out.add_answer(
                Record::new(
                    info.instance_name.clone(),
                    RecordClass::IN,
                    true,
                    ttl,
                    now,
                    RecordData::Srv { priority: info.priority, weight: info.weight, port: info.port, target: info.server.clone() },
                ),
                None,
            );
            out.add_answer(Record::new(info.instance_name.clone(), RecordClass::IN, true, ttl, now, RecordData::Txt(info.text_blob())), None);
            if let Some(addr) = info.address {
                out.add_answer(Record::new(info.server.clone(), RecordClass::IN, true, ttl, now, RecordData::A(addr)), None);
            }
            out.add_answer(Record::new(info.service_type.clone(), RecordClass::IN, false, ttl, now, RecordData::Ptr(info.instance_name.clone())), None);
            self.send(&out)?;
            thread::sleep(self.config.announce_interval);
        }
        Ok(())
    }

    pub fn unregister_service(&self, instance_name: &Name) -> DNSResult<()> {
        let info = self.services.lock().unwrap().remove(&instance_name.key());
        let info = match info {
            Some(i) => i,
            None => return Ok(()),
        };
        self.send_goodbye(std::slice::from_ref(&info))?;
        self.maybe_drop_service_type(&info.service_type);
        Ok(())
    }

    pub fn unregister_all_services(&self) -> DNSResult<()> {
        let services: Vec<ServiceInfo> = {
            let mut guard = self.services.lock().unwrap();
            let all = guard.values().cloned().collect();
            guard.clear();
            all
        };
        self.service_types.lock().unwrap().clear();

        if services.is_empty() {
            return Ok(());
        }
        self.send_goodbye(&services)
    }

    /// Withdraws `services`: the same PTR/SRV/TXT/A records `announce`
    /// sends, all with ttl=0 (spec.md §4.8, `zeroconf.py`'s `_broadcast_service`
    /// goodbye path).
    fn send_goodbye(&self, services: &[ServiceInfo]) -> DNSResult<()> {
        for _ in 0..self.config.broadcast_rounds {
            let mut out = Outgoing::new(FLAG_QR | FLAG_AA, true);
            for info in services {
                out.add_answer(Record::new(info.service_type.clone(), RecordClass::IN, false, 0, 0, RecordData::Ptr(info.instance_name.clone())), None);
                out.add_answer(
                    Record::new(
                        info.instance_name.clone(),
                        RecordClass::IN,
                        true,
                        0,
                        0,
                        RecordData::Srv { priority: info.priority, weight: info.weight, port: info.port, target: info.server.clone() },
                    ),
                    None,
                );
                out.add_answer(Record::new(info.instance_name.clone(), RecordClass::IN, true, 0, 0, RecordData::Txt(info.text_blob())), None);
                if let Some(addr) = info.address {
                    out.add_answer(Record::new(info.server.clone(), RecordClass::IN, true, 0, 0, RecordData::A(addr)), None);
                }
            }
            self.send(&out)?;
            thread::sleep(self.config.goodbye_interval);
        }
        Ok(())
    }

    fn maybe_drop_service_type(&self, ty: &Name) {
        let still_used = self.services.lock().unwrap().values().any(|i| &i.service_type == ty);
        if !still_used {
            self.service_types.lock().unwrap().remove(&ty.key());
        }
    }

    pub fn add_service_listener(self: &Arc<NodeInner>, service_type: &str, listener: Arc<dyn ServiceListener>) -> Arc<Browser> {
        let browser = Browser::new(Name::new(service_type), listener);
        self.browsers.lock().unwrap().push(Arc::clone(&browser));

        let node = Arc::clone(self);
        let b = Arc::clone(&browser);
        let initial = self.config.browse_initial_delay;
        let max = self.config.browse_max_delay;
        let handle = thread::Builder::new()
            .name("mdns-browser".into())
            .spawn(move || b.run(node, initial, max))
            .expect("spawning a browser thread");
        self.browser_handles.lock().unwrap().push(handle);

        browser
    }

    pub fn get_service_info(&self, service_type: &str, instance_name: &str, timeout: Duration) -> Option<ServiceInfo> {
        let instance = Name::new(instance_name);
        if !instance.ends_with(&Name::new(service_type)) {
            return None;
        }

        let resolver = Resolver::new(instance);
        self.resolvers.lock().unwrap().push(Arc::clone(&resolver));

        let deadline = Instant::now() + timeout;
        let result = resolver.wait(self, self.config.resolve_initial_delay, deadline);

        self.resolvers.lock().unwrap().retain(|r| !Arc::ptr_eq(r, &resolver));
        result
    }
}

/// The public mDNS/DNS-SD node handle: one engine thread, one reaper thread,
/// and any number of browser threads, all coordinated through `NodeInner`.
pub struct Node {
    inner: Arc<NodeInner>,
    engine: Engine,
    reaper: Reaper,
}

impl Node {
    pub fn open(interface: &Interface) -> DNSResult<Node> {
        Node::with_config(interface, NodeConfig::default())
    }

    pub fn with_config(interface: &Interface, config: NodeConfig) -> DNSResult<Node> {
        let interfaces = iface::resolve(interface)?;

        let listen_socket = net::new_listen_socket(&interfaces)?;
        let mut respond_sockets = Vec::with_capacity(interfaces.len());
        for addr in &interfaces {
            respond_sockets.push((*addr, net::new_respond_socket(*addr)?));
        }

        let inner = Arc::new(NodeInner {
            cache: Mutex::new(DNSCache::new()),
            browsers: Mutex::new(Vec::new()),
            browser_handles: Mutex::new(Vec::new()),
            resolvers: Mutex::new(Vec::new()),
            services: Mutex::new(HashMap::new()),
            service_types: Mutex::new(HashSet::new()),
            respond_sockets: Mutex::new(respond_sockets),
            shutdown: Mutex::new(false),
            condvar: Condvar::new(),
            config,
        });

        let engine = Engine::new();
        let listener: Arc<dyn crate::engine::PacketHandler> = Arc::new(Listener { node: Arc::downgrade(&inner) });
        engine.add_reader(listen_socket, listener)?;

        let reaper = Reaper::spawn(Arc::clone(&inner), inner.config.reaper_interval);

        Ok(Node { inner, engine, reaper })
    }

    pub fn register_service(&self, info: ServiceInfo, ttl: u32) -> DNSResult<ServiceInfo> {
        self.inner.register_service(info, ttl)
    }

    pub fn unregister_service(&self, instance_name: &str) -> DNSResult<()> {
        self.inner.unregister_service(&Name::new(instance_name))
    }

    pub fn add_service_listener(&self, service_type: &str, listener: Arc<dyn ServiceListener>) -> Arc<Browser> {
        self.inner.add_service_listener(service_type, listener)
    }

    pub fn remove_service_listener(&self, browser: &Arc<Browser>) {
        browser.cancel();
    }

    pub fn get_service_info(&self, service_type: &str, instance_name: &str, timeout_ms: u64) -> Option<ServiceInfo> {
        self.inner.get_service_info(service_type, instance_name, Duration::from_millis(timeout_ms))
    }

    /// Idempotent shutdown: goodbyes every registered service, wakes and
    /// joins every browser thread, then joins the reaper and engine
    /// so dropping a `Node` can't leak either.
    pub fn close(&mut self) -> DNSResult<()> {
        if *self.inner.shutdown.lock().unwrap() {
            return Ok(());
        }

        self.inner.unregister_all_services()?;

        *self.inner.shutdown.lock().unwrap() = true;
        self.inner.condvar.notify_all();

        let browsers: Vec<Arc<Browser>> = self.inner.browsers.lock().unwrap().clone();
        for browser in &browsers {
            browser.cancel();
        }
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.browser_handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }

        self.reaper.join();
        self.engine.close();

        Ok(())
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
