use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};

use portwire_frame::Frame;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

/// Handle returned when a request listener is registered.
pub type ListenerId = u64;

/// Observer of device-originated request frames.
pub type RequestListener = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Registered request listeners.
///
/// The registry outlives individual open/close cycles of a session, so
/// listeners added before `open` keep receiving frames after a reopen.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, RequestListener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<(ListenerId, RequestListener)>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<(ListenerId, RequestListener)>> {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a listener.
    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Deliver `frame` to a snapshot of the current listeners.
    ///
    /// The registry lock is not held while listeners run, so a listener may
    /// add or remove listeners, including itself. A panicking listener is
    /// logged and the remaining listeners still run.
    pub fn dispatch(&self, frame: &Frame) {
        let snapshot: Vec<RequestListener> =
            self.read().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(frame))).is_err() {
                warn!(len = frame.len(), "request listener panicked");
            }
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

/// Ordered, non-blocking delivery of request frames to listeners.
///
/// The receive loop publishes into an unbounded queue; a dedicated dispatcher
/// thread drains it in arrival order.
pub struct EventFanout {
    tx: Option<Sender<Frame>>,
    handle: Option<JoinHandle<()>>,
}

impl EventFanout {
    /// Start the dispatcher thread for `registry`.
    pub fn start(registry: Arc<ListenerRegistry>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("portwire-fanout".to_string())
            .spawn(move || run_dispatcher(&registry, rx))
            .map_err(|source| SessionError::Spawn {
                name: "fanout",
                source,
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// A publishing handle for the receive loop.
    pub fn publisher(&self) -> Option<Sender<Frame>> {
        self.tx.clone()
    }

    /// Queue a frame for delivery. Returns `false` once stopped.
    pub fn publish(&self, frame: Frame) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Stop accepting frames and wait for queued ones to be delivered.
    ///
    /// The dispatcher exits after every publisher handle is dropped. When
    /// called from a listener the dispatcher is left to finish on its own.
    pub fn stop(&mut self) {
        self.tx = None;
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("fanout dispatcher panicked");
            }
        }
    }
}

impl Drop for EventFanout {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_dispatcher(registry: &ListenerRegistry, rx: Receiver<Frame>) {
    for frame in rx {
        registry.dispatch(&frame);
    }
    debug!("fanout dispatcher exited");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use super::*;

    fn request(byte: u8) -> Frame {
        Frame::request(vec![0xBB, byte], false)
    }

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn add_remove_clear() {
        let registry = ListenerRegistry::new();
        let a = registry.add(|_| {});
        let b = registry.add(|_| {});
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert_eq!(registry.len(), 1);

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn delivers_in_arrival_order() {
        let registry = Arc::new(ListenerRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            registry.add(move |frame| seen.lock().unwrap().push(frame.data[1]));
        }

        let mut fanout = EventFanout::start(Arc::clone(&registry)).unwrap();
        for i in 0..50 {
            assert!(fanout.publish(request(i)));
        }
        fanout.stop();

        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<u8>>());
        assert!(!fanout.publish(request(0)));
    }

    #[test]
    fn panicking_listener_does_not_stop_delivery() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.add(|_| panic!("listener bug"));
        {
            let count = Arc::clone(&count);
            registry.add(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        registry.dispatch(&request(1));
        registry.dispatch(&request(2));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_removed_during_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let victim_calls = Arc::new(AtomicUsize::new(0));
        let remover_calls = Arc::new(AtomicUsize::new(0));
        let victim_id = Arc::new(Mutex::new(None::<ListenerId>));

        {
            let registry_handle = Arc::clone(&registry);
            let victim_id = Arc::clone(&victim_id);
            let remover_calls = Arc::clone(&remover_calls);
            registry.add(move |_| {
                remover_calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = victim_id.lock().unwrap().take() {
                    registry_handle.remove(id);
                }
            });
        }
        {
            let victim_calls = Arc::clone(&victim_calls);
            let id = registry.add(move |_| {
                victim_calls.fetch_add(1, Ordering::SeqCst);
            });
            *victim_id.lock().unwrap() = Some(id);
        }

        let fanout = EventFanout::start(Arc::clone(&registry)).unwrap();
        for i in 0..3 {
            fanout.publish(request(i));
        }

        assert!(wait_until(Duration::from_secs(2), || {
            remover_calls.load(Ordering::SeqCst) == 3
        }));
        assert!(victim_calls.load(Ordering::SeqCst) <= 1);
        assert_eq!(registry.len(), 1);
        drop(fanout);
    }
}
