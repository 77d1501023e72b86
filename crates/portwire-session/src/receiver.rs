use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use portwire_frame::{Frame, FrameAssembler, FrameKind, ReplyKind};
use portwire_transport::TransportPort;
use tracing::{debug, error, trace};

use crate::cache::ReplyCache;
use crate::error::{Result, SessionError};
use crate::slots::ReplySlots;

/// Everything the receive thread owns or shares.
pub(crate) struct ReceiveContext {
    pub transport: Arc<dyn TransportPort>,
    pub assembler: FrameAssembler,
    pub slots: Arc<ReplySlots>,
    pub cache: Arc<ReplyCache>,
    pub requests: Sender<Frame>,
    pub record_responses: bool,
    pub poll_interval: Duration,
}

/// Background thread that polls the transport and routes complete frames.
///
/// Response frames land in the last-response slot (or the reply cache when
/// responses are recorded). Request frames go to the fan-out queue in
/// arrival order; interrupts are also stored in the last-interrupt slot.
/// A read fault stops the loop for good; the session must be reopened.
pub struct ReceiveLoop {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    pub(crate) fn spawn(ctx: ReceiveContext) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("portwire-receive".to_string())
            .spawn(move || run(ctx, &flag))
            .map_err(|source| SessionError::Spawn {
                name: "receive",
                source,
            })?;
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the loop is still polling.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the loop to stop and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                error!("receive loop panicked");
            }
        }
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(mut ctx: ReceiveContext, running: &AtomicBool) {
    debug!(transport = ctx.transport.name(), "receive loop started");
    while running.load(Ordering::SeqCst) {
        let chunk = match ctx.transport.read() {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                thread::sleep(ctx.poll_interval);
                continue;
            }
            Err(err) => {
                if running.load(Ordering::SeqCst) {
                    error!(error = %err, "read fault, receive loop stopped");
                }
                break;
            }
        };

        trace!(len = chunk.len(), "received bytes");
        let assembler = &mut ctx.assembler;
        match catch_unwind(AssertUnwindSafe(|| assembler.push(&chunk))) {
            Ok(Ok(frames)) => {
                for frame in frames {
                    route(&ctx, frame);
                }
            }
            Ok(Err(err)) => {
                error!(error = %err, "frame assembly failed, receive loop stopped");
                break;
            }
            Err(_) => {
                error!("framing callback panicked, receive loop stopped");
                break;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    debug!("receive loop exited");
}

fn route(ctx: &ReceiveContext, frame: Frame) {
    match frame.kind {
        FrameKind::Response => {
            debug!(frame = %frame.to_hex(), "response frame");
            if ctx.record_responses {
                ctx.cache.record(ReplyKind::Response, frame.data);
            } else {
                ctx.slots.store_response(frame.data);
            }
        }
        FrameKind::Request => {
            debug!(frame = %frame.to_hex(), interrupt = frame.interrupt, "request frame");
            if frame.interrupt {
                ctx.slots.store_interrupt(frame.data.clone());
            }
            if ctx.requests.send(frame).is_err() {
                debug!("fanout stopped, request frame dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::Instant;

    use portwire_frame::{LengthRule, PortConfig};
    use portwire_transport::{MemoryDevice, MemoryPort};

    use super::*;

    struct Harness {
        device: MemoryDevice,
        slots: Arc<ReplySlots>,
        cache: Arc<ReplyCache>,
        requests: mpsc::Receiver<Frame>,
        receiver: ReceiveLoop,
    }

    fn harness(record_responses: bool) -> Harness {
        let config = PortConfig::builder()
            .response_head(vec![0xAA, 0x55])
            .request_head(vec![0xBB, 0x66])
            .length_rule(LengthRule::Field {
                offset: 2,
                width: 1,
                big_endian: false,
                adjust: 3,
            })
            .interrupt_classifier(|frame| frame.get(3) == Some(&0xEE))
            .build()
            .unwrap();
        harness_with(config, record_responses)
    }

    fn harness_with(config: PortConfig, record_responses: bool) -> Harness {
        let (port, device) = MemoryPort::pair();
        port.open().unwrap();
        let slots = Arc::new(ReplySlots::new());
        let cache = Arc::new(ReplyCache::new());
        let (tx, rx) = mpsc::channel();
        let receiver = ReceiveLoop::spawn(ReceiveContext {
            transport: Arc::new(port),
            assembler: FrameAssembler::new(config),
            slots: Arc::clone(&slots),
            cache: Arc::clone(&cache),
            requests: tx,
            record_responses,
            poll_interval: Duration::from_millis(1),
        })
        .unwrap();
        Harness {
            device,
            slots,
            cache,
            requests: rx,
            receiver,
        }
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
    fn routes_responses_and_requests() {
        let mut h = harness(false);
        h.device.inject(&[0xAA, 0x55, 0x00]);
        h.device.inject(&[0xBB, 0x66, 0x01, 0x01]);
        h.device.inject(&[0xBB, 0x66, 0x01, 0xEE]);

        let first = h.requests.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = h.requests.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!first.interrupt);
        assert!(second.interrupt);

        assert_eq!(h.slots.last_response().unwrap().as_ref(), &[0xAA, 0x55, 0x00]);
        assert_eq!(
            h.slots.last_interrupt().unwrap().as_ref(),
            &[0xBB, 0x66, 0x01, 0xEE]
        );
        h.receiver.stop();
        assert!(!h.receiver.is_running());
    }

    #[test]
    fn recorded_responses_go_to_cache() {
        let h = harness(true);
        h.device.inject(&[0xAA, 0x55, 0x00]);

        assert!(wait_until(Duration::from_secs(2), || {
            h.cache.len(ReplyKind::Response) == 1
        }));
        assert!(h.slots.last_response().is_none());
    }

    #[test]
    fn panicking_length_resolver_stops_loop() {
        let config = PortConfig::builder()
            .response_head(vec![0xAA, 0x55])
            .length_resolver(|data| data[2] as usize + 3)
            .build()
            .unwrap();
        let h = harness_with(config, false);
        assert!(h.receiver.is_running());

        h.device.inject(&[0xAA, 0x55]);
        assert!(wait_until(Duration::from_secs(2), || !h.receiver.is_running()));
    }

    #[test]
    fn read_fault_stops_loop() {
        let h = harness(false);
        assert!(h.receiver.is_running());
        h.device.fail_reads("unplugged");
        assert!(wait_until(Duration::from_secs(2), || !h.receiver.is_running()));
    }
}
