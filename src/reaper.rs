//! The background cache reaper: the only agent that evicts
//! records whose ttl expired through the ordinary countdown, as opposed to
//! an explicit goodbye (TTL=0) packet, which the response handler evicts
//! immediately on arrival.
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::node::NodeInner;

pub struct Reaper {
    thread: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn spawn(node: Arc<NodeInner>, interval: Duration) -> Reaper {
        let thread = thread::Builder::new()
            .name("mdns-reaper".into())
            .spawn(move || Reaper::run(node, interval))
            .expect("spawning the reaper thread");
        Reaper { thread: Some(thread) }
    }

    fn run(node: Arc<NodeInner>, interval: Duration) {
        loop {
            let shutdown = {
                let guard = node.shutdown.lock().unwrap();
                let (guard, _timed_out) = node.condvar.wait_timeout(guard, interval).unwrap();
                *guard
            };
            if shutdown {
                return;
            }
            node.reap_expired();
        }
    }

    pub fn join(&mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.join();
    }
}
