//! The browsing state machine: one thread per (service type, listener) pair,
//! issuing PTR queries with exponential backoff and known-answer
//! suppression. Cache-driven add/remove notification is done by the node
//! (the single place that mutates the cache); this module owns the query
//! schedule, a FIFO queue of pending callbacks, and the listener dispatch.
//!
//! `ServiceEvent` is a plain enum rather than a callback-subclass interface.
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::name::Name;
use crate::node::NodeInner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    Added(Name),
    Removed(Name),
}

/// Receives `ServiceEvent`s for one browse session, always invoked from this
/// browser's own `run` thread (never the engine or reaper thread that
/// discovered the underlying cache change) so two events can never race each
/// other into the listener out of order.
pub trait ServiceListener: Send + Sync {
    fn event(&self, event: ServiceEvent);
}

struct State {
    done: bool,
    /// FIFO queue of events discovered by the node (engine thread for
    /// adds/goodbyes, reaper thread for expirations) and awaiting delivery
    /// on `run`'s thread.
    pending: VecDeque<ServiceEvent>,
}

/// One (service type, listener) browse session.
pub struct Browser {
    pub service_type: Name,
    listener: Arc<dyn ServiceListener>,
    state: Mutex<State>,
    cv: Condvar,
}

impl Browser {
    pub fn new(service_type: Name, listener: Arc<dyn ServiceListener>) -> Arc<Browser> {
        Arc::new(Browser { service_type, listener, state: Mutex::new(State { done: false, pending: VecDeque::new() }), cv: Condvar::new() })
    }

    /// Marks this browser done and wakes its scheduling loop so it can exit
    /// and remove itself from the node's browser list -- a cancelled
    /// browser deregisters itself rather than leaving dead entries for the
    /// node to sweep.
    pub fn cancel(&self) {
        self.state.lock().unwrap().done = true;
        self.cv.notify_all();
    }

    /// Queues `event` for delivery on `run`'s thread and wakes it -- this
    /// never invokes the listener itself, since the caller may be the
    /// engine thread or the reaper thread and the two must not call into
    /// the same listener concurrently (spec.md §5, §9).
    pub fn notify(&self, event: ServiceEvent) {
        self.state.lock().unwrap().pending.push_back(event);
        self.cv.notify_all();
    }

    /// Runs the query-scheduling loop until cancelled, delivering queued
    /// callbacks from this thread alone. Spawned as its own thread by
    /// `Node::add_service_listener`.
    ///
    /// Each iteration (spec.md §4.6): wait for the next query's due time
    /// unless a callback is already pending; send the query if due and
    /// reschedule with doubling backoff; then pop and deliver the oldest
    /// pending callback, one per iteration.
    pub fn run(self: Arc<Browser>, node: Arc<NodeInner>, initial_delay: Duration, max_delay: Duration) {
        let mut delay = initial_delay;
        let mut next_time = Instant::now();

        loop {
            let to_wait = next_time.saturating_duration_since(Instant::now());

            {
                let guard = self.state.lock().unwrap();
                if guard.done {
                    break;
                }
                if guard.pending.is_empty() && !to_wait.is_zero() {
                    let (guard, _timed_out) = self.cv.wait_timeout(guard, to_wait).unwrap();
                    if guard.done {
                        break;
                    }
                }
            }

            if Instant::now() >= next_time {
                if let Err(e) = node.send_browse_query(&self.service_type) {
                    log::warn!("browser for {}: failed to send query: {}", self.service_type, e);
                }
                next_time = Instant::now() + delay;
                delay = std::cmp::min(delay * 2, max_delay);
            }

            let event = self.state.lock().unwrap().pending.pop_front();
            if let Some(event) = event {
                self.listener.event(event);
            }
        }

        node.remove_browser(&self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        added: AtomicUsize,
    }

    impl ServiceListener for CountingListener {
        fn event(&self, event: ServiceEvent) {
            if matches!(event, ServiceEvent::Added(_)) {
                self.added.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn cancel_marks_done_and_wakes_waiters() {
        let listener = Arc::new(CountingListener { added: AtomicUsize::new(0) });
        let browser = Browser::new(Name::new("_http._tcp.local."), listener.clone());
        browser.cancel();
        assert!(browser.state.lock().unwrap().done);
    }

    #[test]
    fn notify_enqueues_without_invoking_listener_directly() {
        let listener = Arc::new(CountingListener { added: AtomicUsize::new(0) });
        let browser = Browser::new(Name::new("_http._tcp.local."), listener.clone());
        browser.notify(ServiceEvent::Added(Name::new("a._http._tcp.local.")));

        // notify() only queues; the listener is untouched until `run` drains it.
        assert_eq!(listener.added.load(Ordering::SeqCst), 0);
        assert_eq!(browser.state.lock().unwrap().pending.len(), 1);
    }

    #[test]
    fn pending_events_preserve_fifo_order() {
        let listener = Arc::new(CountingListener { added: AtomicUsize::new(0) });
        let browser = Browser::new(Name::new("_http._tcp.local."), listener.clone());
        browser.notify(ServiceEvent::Added(Name::new("a._http._tcp.local.")));
        browser.notify(ServiceEvent::Removed(Name::new("a._http._tcp.local.")));
        browser.notify(ServiceEvent::Added(Name::new("b._http._tcp.local.")));

        let mut state = browser.state.lock().unwrap();
        assert_eq!(state.pending.pop_front(), Some(ServiceEvent::Added(Name::new("a._http._tcp.local."))));
        assert_eq!(state.pending.pop_front(), Some(ServiceEvent::Removed(Name::new("a._http._tcp.local."))));
        assert_eq!(state.pending.pop_front(), Some(ServiceEvent::Added(Name::new("b._http._tcp.local."))));
    }
}
