use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::TransportPort;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct LinkState {
    open: bool,
    inbound: VecDeque<Bytes>,
    written: Vec<Bytes>,
    refuse_open: Option<String>,
    read_fault: Option<String>,
    responder: Option<Responder>,
    write_delay: Duration,
}

#[derive(Default)]
struct Link {
    state: Mutex<LinkState>,
    writing: AtomicBool,
    overlapped: AtomicBool,
    writes: AtomicUsize,
}

impl Link {
    fn lock(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-process transport whose far end is driven by a [`MemoryDevice`].
///
/// Every [`MemoryDevice::inject`] call is delivered by exactly one
/// [`read`](TransportPort::read), so tests control how the stream is split.
pub struct MemoryPort {
    link: Arc<Link>,
}

/// The device side of a [`MemoryPort`].
#[derive(Clone)]
pub struct MemoryDevice {
    link: Arc<Link>,
}

impl MemoryPort {
    /// Create a connected port/device pair. The port starts closed.
    pub fn pair() -> (MemoryPort, MemoryDevice) {
        let link = Arc::new(Link::default());
        (
            MemoryPort {
                link: Arc::clone(&link),
            },
            MemoryDevice { link },
        )
    }
}

impl TransportPort for MemoryPort {
    fn open(&self) -> Result<()> {
        let mut state = self.link.lock();
        if let Some(reason) = state.refuse_open.take() {
            return Err(TransportError::OpenRefused(reason));
        }
        state.open = true;
        Ok(())
    }

    fn close(&self) {
        self.link.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.link.lock().open
    }

    fn read(&self) -> Result<Option<Bytes>> {
        let mut state = self.link.lock();
        if !state.open {
            return Err(TransportError::NotOpen);
        }
        if let Some(reason) = state.read_fault.clone() {
            return Err(TransportError::Fault(reason));
        }
        Ok(state.inbound.pop_front())
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        if self.link.writing.swap(true, Ordering::SeqCst) {
            self.link.overlapped.store(true, Ordering::SeqCst);
            return Err(TransportError::Fault("overlapping write".to_string()));
        }
        let result = self.write_exclusive(data);
        self.link.writing.store(false, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "memory"
    }
}

impl MemoryPort {
    fn write_exclusive(&self, data: &[u8]) -> Result<()> {
        let delay = {
            let state = self.link.lock();
            if !state.open {
                return Err(TransportError::NotOpen);
            }
            state.write_delay
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut guard = self.link.lock();
        let state = &mut *guard;
        state.written.push(Bytes::copy_from_slice(data));
        self.link.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(responder) = state.responder.as_mut() {
            if let Some(reply) = responder(data) {
                debug!(len = reply.len(), "memory device auto-reply");
                state.inbound.push_back(Bytes::from(reply));
            }
        }
        Ok(())
    }
}

impl MemoryDevice {
    /// Queue bytes for the port to read. Each call becomes one read.
    pub fn inject(&self, data: &[u8]) {
        self.link
            .lock()
            .inbound
            .push_back(Bytes::copy_from_slice(data));
    }

    /// Everything the port has written so far.
    pub fn written(&self) -> Vec<Bytes> {
        self.link.lock().written.clone()
    }

    /// Number of completed writes.
    pub fn write_count(&self) -> usize {
        self.link.writes.load(Ordering::SeqCst)
    }

    /// Reply to every write with whatever `responder` returns.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.link.lock().responder = Some(Box::new(responder));
    }

    /// Stop auto-replying.
    pub fn clear_responder(&self) {
        self.link.lock().responder = None;
    }

    /// Make the next open attempt fail.
    pub fn refuse_next_open(&self, reason: impl Into<String>) {
        self.link.lock().refuse_open = Some(reason.into());
    }

    /// Make every subsequent read fail.
    pub fn fail_reads(&self, reason: impl Into<String>) {
        self.link.lock().read_fault = Some(reason.into());
    }

    /// Hold each write for `delay` before it completes.
    pub fn set_write_delay(&self, delay: Duration) {
        self.link.lock().write_delay = delay;
    }

    /// Whether two writes were ever in progress at the same time.
    pub fn overlap_detected(&self) -> bool {
        self.link.overlapped.load(Ordering::SeqCst)
    }

    /// Whether the port end is open.
    pub fn is_open(&self) -> bool {
        self.link.lock().open
    }

    /// Bytes injected but not yet read by the port.
    pub fn pending_inbound(&self) -> usize {
        self.link.lock().inbound.iter().map(Bytes::len).sum()
    }
}

impl std::fmt::Debug for MemoryPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPort")
            .field("open", &self.is_open())
            .finish()
    }
}

impl std::fmt::Debug for MemoryDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDevice")
            .field("writes", &self.write_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_then_read_preserves_chunks() {
        let (port, device) = MemoryPort::pair();
        port.open().unwrap();

        device.inject(&[1, 2]);
        device.inject(&[3]);

        assert_eq!(port.read().unwrap().unwrap().as_ref(), &[1, 2]);
        assert_eq!(port.read().unwrap().unwrap().as_ref(), &[3]);
        assert!(port.read().unwrap().is_none());
    }

    #[test]
    fn io_requires_open() {
        let (port, _device) = MemoryPort::pair();
        assert!(matches!(port.read(), Err(TransportError::NotOpen)));
        assert!(matches!(port.write(b"x"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn refused_open_applies_once() {
        let (port, device) = MemoryPort::pair();
        device.refuse_next_open("unplugged");

        assert!(matches!(port.open(), Err(TransportError::OpenRefused(_))));
        assert!(!device.is_open());
        port.open().unwrap();
        assert!(device.is_open());
    }

    #[test]
    fn responder_replies_to_writes() {
        let (port, device) = MemoryPort::pair();
        port.open().unwrap();
        device.set_responder(|sent| Some(sent.iter().rev().copied().collect()));

        port.write(&[1, 2, 3]).unwrap();

        assert_eq!(device.write_count(), 1);
        assert_eq!(device.written()[0].as_ref(), &[1, 2, 3]);
        assert_eq!(port.read().unwrap().unwrap().as_ref(), &[3, 2, 1]);
    }

    #[test]
    fn read_fault_is_reported() {
        let (port, device) = MemoryPort::pair();
        port.open().unwrap();
        device.fail_reads("cable pulled");
        assert!(matches!(port.read(), Err(TransportError::Fault(_))));
    }

    #[test]
    fn overlapping_writes_are_detected() {
        let (port, device) = MemoryPort::pair();
        port.open().unwrap();
        device.set_write_delay(Duration::from_millis(50));

        let port = Arc::new(port);
        let first = {
            let port = Arc::clone(&port);
            std::thread::spawn(move || port.write(b"first"))
        };
        std::thread::sleep(Duration::from_millis(10));
        let second = port.write(b"second");

        assert!(first.join().unwrap().is_ok());
        assert!(second.is_err());
        assert!(device.overlap_detected());
    }
}
