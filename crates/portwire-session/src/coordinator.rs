use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use bytes::Bytes;
use portwire_frame::{PortConfig, ReplyKind};
use portwire_transport::TransportPort;
use tracing::{debug, warn};

use crate::cache::ReplyCache;
use crate::config::DEFAULT_SEND_TIMEOUT;
use crate::error::{Result, SessionError};
use crate::slots::{ReplySlots, SlotHit};

/// Caller-chosen identifier echoed back to an asynchronous callback.
pub type Tag = u64;

/// Completion handler for an asynchronous send. Runs on the send worker.
pub type SendCallback = Box<dyn FnOnce(Tag, SendOutcome) + Send>;

/// How a send resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// A matching reply arrived.
    Response(Bytes),
    /// An interrupt frame arrived before any reply.
    Interrupt(Bytes),
    /// Nothing matched within the window. Carries the sent payload.
    Timeout(Bytes),
}

impl SendOutcome {
    /// The reply bytes, if this is a response.
    pub fn into_response(self) -> Option<Bytes> {
        match self {
            SendOutcome::Response(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SendOutcome::Timeout(_))
    }

    /// Lower-case outcome name for logs and output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SendOutcome::Response(_) => "response",
            SendOutcome::Interrupt(_) => "interrupt",
            SendOutcome::Timeout(_) => "timeout",
        }
    }

    /// Bytes carried by the outcome.
    pub fn data(&self) -> &Bytes {
        match self {
            SendOutcome::Response(data)
            | SendOutcome::Interrupt(data)
            | SendOutcome::Timeout(data) => data,
        }
    }
}

/// Per-send options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Which reply class to wait for.
    pub kind: ReplyKind,
    /// Reply window. There is no retry.
    pub timeout: Duration,
}

impl SendOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            kind: ReplyKind::Response,
            timeout,
        }
    }

    pub fn with_kind(mut self, kind: ReplyKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::new(DEFAULT_SEND_TIMEOUT)
    }
}

enum Completion {
    Callback(Tag, SendCallback),
    Blocking(SyncSender<SendOutcome>),
}

impl Completion {
    fn complete(self, outcome: SendOutcome) {
        match self {
            Completion::Callback(tag, callback) => {
                if catch_unwind(AssertUnwindSafe(move || callback(tag, outcome))).is_err() {
                    warn!(tag, "send callback panicked");
                }
            }
            Completion::Blocking(tx) => {
                // The caller may have given up; nothing to do then.
                let _ = tx.send(outcome);
            }
        }
    }
}

struct SendJob {
    payload: Bytes,
    options: SendOptions,
    completion: Completion,
}

/// State shared by every worker generation.
pub(crate) struct WorkerContext {
    pub transport: Arc<dyn TransportPort>,
    pub config: PortConfig,
    pub slots: Arc<ReplySlots>,
    pub cache: Arc<ReplyCache>,
    pub reply_poll_interval: Duration,
}

struct Worker {
    tx: Sender<SendJob>,
    cancelled: Arc<AtomicBool>,
    thread: ThreadId,
}

impl Worker {
    fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Serializes sends through a single worker thread.
///
/// Jobs run one at a time in submission order: write the payload, then poll
/// the reply slots and cache until a reply, an interrupt or the deadline.
/// A synchronous send blocks only its caller. Once the worker is gone every
/// submission is rejected.
pub struct SendCoordinator {
    ctx: Arc<WorkerContext>,
    worker: Mutex<Option<Worker>>,
}

impl SendCoordinator {
    pub(crate) fn start(ctx: WorkerContext) -> Result<Self> {
        let ctx = Arc::new(ctx);
        let worker = spawn_worker(&ctx)?;
        Ok(Self {
            ctx,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a worker is accepting jobs.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn submit(&self, job: SendJob) -> bool {
        match self.lock().as_ref() {
            Some(worker) => worker.tx.send(job).is_ok(),
            None => false,
        }
    }

    fn on_worker_thread(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|worker| worker.thread == thread::current().id())
    }

    /// Send and wait for the outcome.
    ///
    /// Returns `None` when the worker is not running, when the job is
    /// discarded by [`clear_pending`](Self::clear_pending) or shutdown, or
    /// when called from a send callback (which would wait on itself).
    pub fn send_blocking(&self, payload: &[u8], options: SendOptions) -> Option<SendOutcome> {
        if self.on_worker_thread() {
            warn!("blocking send from a send callback rejected");
            return None;
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let job = SendJob {
            payload: Bytes::copy_from_slice(payload),
            options,
            completion: Completion::Blocking(tx),
        };
        if !self.submit(job) {
            debug!("send rejected, worker not running");
            return None;
        }
        rx.recv().ok()
    }

    /// Queue a send whose outcome is delivered to `callback` exactly once.
    ///
    /// Returns `false` if the worker is not running; the callback is then
    /// never invoked.
    pub fn send_async(
        &self,
        payload: &[u8],
        options: SendOptions,
        tag: Tag,
        callback: SendCallback,
    ) -> bool {
        let job = SendJob {
            payload: Bytes::copy_from_slice(payload),
            options,
            completion: Completion::Callback(tag, callback),
        };
        let accepted = self.submit(job);
        if !accepted {
            debug!(tag, "send rejected, worker not running");
        }
        accepted
    }

    /// Abandon the queued and in-flight jobs and install a fresh worker.
    ///
    /// Abandoned jobs never resolve: their callbacks are dropped uninvoked and
    /// blocked callers return `None`. Returns `false` if the coordinator was
    /// shut down or the new worker could not be started.
    pub fn clear_pending(&self) -> bool {
        let mut guard = self.lock();
        let Some(old) = guard.take() else {
            return false;
        };
        old.cancel();
        match spawn_worker(&self.ctx) {
            Ok(worker) => {
                debug!("send worker replaced");
                *guard = Some(worker);
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to restart send worker");
                false
            }
        }
    }

    /// Stop accepting jobs and abandon pending ones.
    ///
    /// An in-flight write is not interrupted; the worker exits at its next
    /// cancellation check.
    pub fn shutdown(&self) {
        if let Some(worker) = self.lock().take() {
            worker.cancel();
        }
    }
}

impl Drop for SendCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(ctx: &Arc<WorkerContext>) -> Result<Worker> {
    let (tx, rx) = mpsc::channel();
    let cancelled = Arc::new(AtomicBool::new(false));
    let handle = {
        let ctx = Arc::clone(ctx);
        let cancelled = Arc::clone(&cancelled);
        thread::Builder::new()
            .name("portwire-send".to_string())
            .spawn(move || run_worker(&ctx, rx, &cancelled))
            .map_err(|source| SessionError::Spawn {
                name: "send",
                source,
            })?
    };
    Ok(Worker {
        tx,
        cancelled,
        thread: handle.thread().id(),
    })
}

fn run_worker(ctx: &WorkerContext, rx: Receiver<SendJob>, cancelled: &AtomicBool) {
    for job in rx.iter() {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        let executed = catch_unwind(AssertUnwindSafe(|| {
            ctx.execute(&job.payload, job.options, cancelled)
        }));
        let outcome = match executed {
            Ok(Some(outcome)) => outcome,
            Ok(None) => break,
            Err(_) => {
                warn!("send job panicked, reporting timeout");
                SendOutcome::Timeout(job.payload.clone())
            }
        };
        // A reply taken after clear_pending belongs to the replacement worker's job.
        if cancelled.load(Ordering::SeqCst) {
            break;
        }
        debug!(outcome = outcome.as_str(), "send resolved");
        job.completion.complete(outcome);
    }
    debug!("send worker exited");
}

impl WorkerContext {
    /// Run one send. `None` means the job was abandoned.
    fn execute(
        &self,
        payload: &Bytes,
        options: SendOptions,
        cancelled: &AtomicBool,
    ) -> Option<SendOutcome> {
        self.slots.clear();
        if let Err(err) = self.transport.write(payload) {
            warn!(error = %err, "write failed, reporting timeout");
            return Some(SendOutcome::Timeout(payload.clone()));
        }

        let deadline = Instant::now() + options.timeout;
        loop {
            if cancelled.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(outcome) = self.poll_reply(payload, options.kind) {
                return Some(outcome);
            }
            if Instant::now() >= deadline {
                return Some(SendOutcome::Timeout(payload.clone()));
            }
            thread::sleep(self.reply_poll_interval);
        }
    }

    /// A cached reply for `kind` unless an interrupt arrived before it, then
    /// the slots: the response if it beat any interrupt, else the interrupt.
    fn poll_reply(&self, payload: &[u8], kind: ReplyKind) -> Option<SendOutcome> {
        let cached = self.cache.query(kind, payload, self.config.reply_filter());
        if let Some(entry) = cached {
            let precedes_interrupt = self
                .slots
                .interrupt_received()
                .is_none_or(|at| entry.received <= at);
            if precedes_interrupt && self.cache.consume(&entry) {
                return Some(SendOutcome::Response(entry.data));
            }
        }

        let accept = |data: &[u8]| {
            kind == ReplyKind::Response
                && self.config.accepts_reply(payload, data, ReplyKind::Response)
        };
        match self.slots.take_reply(accept)? {
            SlotHit::Response(data) => Some(SendOutcome::Response(data)),
            SlotHit::Interrupt(data) => Some(SendOutcome::Interrupt(data)),
        }
    }
}
