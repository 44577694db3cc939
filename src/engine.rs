//! The engine: the single thread allowed to read any of this node's sockets.
//! No one platform-portable `select()` call is used here --
//! each registered socket carries a short read timeout, and the engine
//! round-robins them in a loop a `Condvar` wakes early whenever a socket is
//! added or removed. Handler panics are caught and logged rather than taking
//! the engine thread down with them.
use std::net::{SocketAddr, UdpSocket};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::codec::MAX_MSG_ABSOLUTE;

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Anything the engine can hand a freshly-received datagram to.
pub trait PacketHandler: Send + Sync {
    fn on_packet(&self, data: &[u8], from: SocketAddr);
}

struct Reader {
    socket: UdpSocket,
    handler: Arc<dyn PacketHandler>,
}

struct Shared {
    readers: Mutex<Vec<Reader>>,
    cv: Condvar,
    shutdown: Mutex<bool>,
}

/// The engine itself. Owns the worker thread; dropping it joins the thread.
pub struct Engine {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new() -> Engine {
        let shared = Arc::new(Shared { readers: Mutex::new(Vec::new()), cv: Condvar::new(), shutdown: Mutex::new(false) });
        let worker = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("mdns-engine".into())
            .spawn(move || Engine::run(worker))
            .expect("spawning the engine thread");
        Engine { shared, thread: Some(thread) }
    }

    /// Registers `socket` with `handler` and wakes the run loop immediately
    /// so the new reader doesn't wait out the current poll timeout.
    pub fn add_reader(&self, socket: UdpSocket, handler: Arc<dyn PacketHandler>) -> std::io::Result<()> {
        socket.set_read_timeout(Some(POLL_TIMEOUT))?;
        self.shared.readers.lock().unwrap().push(Reader { socket, handler });
        self.shared.cv.notify_all();
        Ok(())
    }

    pub fn close(&mut self) {
        *self.shared.shutdown.lock().unwrap() = true;
        self.shared.cv.notify_all();
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }

    fn run(shared: Arc<Shared>) {
        let mut buf = vec![0u8; MAX_MSG_ABSOLUTE];

        loop {
            if *shared.shutdown.lock().unwrap() {
                return;
            }

            let snapshot: Vec<(UdpSocket, Arc<dyn PacketHandler>)> = {
                let readers = shared.readers.lock().unwrap();
                if readers.is_empty() {
                    let guard = shared.shutdown.lock().unwrap();
                    drop(readers);
                    let (guard, _timed_out) = shared.cv.wait_timeout(guard, POLL_TIMEOUT).unwrap();
                    if *guard {
                        return;
                    }
                    continue;
                }
                readers.iter().filter_map(|r| r.socket.try_clone().ok().map(|s| (s, Arc::clone(&r.handler)))).collect()
            };

            for (socket, handler) in snapshot {
                match socket.recv_from(&mut buf) {
                    Ok((len, from)) => {
                        let slice = &buf[..len];
                        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.on_packet(slice, from)));
                        if result.is_err() {
                            log::error!("engine: packet handler panicked while handling a datagram from {}", from);
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
                    Err(e) => log::warn!("engine: socket read failed: {}", e),
                }
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}
