use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use portwire_frame::{Frame, FrameAssembler, PortConfig};
use portwire_transport::TransportPort;
use tracing::{info, warn};

use crate::cache::ReplyCache;
use crate::config::SessionConfig;
use crate::coordinator::{
    SendCallback, SendCoordinator, SendOptions, SendOutcome, Tag, WorkerContext,
};
use crate::error::{Result, SessionError};
use crate::fanout::{EventFanout, ListenerId, ListenerRegistry};
use crate::receiver::{ReceiveContext, ReceiveLoop};
use crate::slots::ReplySlots;

struct Engine {
    receiver: ReceiveLoop,
    fanout: EventFanout,
    coordinator: Arc<SendCoordinator>,
}

/// One attached device: transport, framing rules and the running engine.
///
/// Opening starts a receive loop, a fan-out dispatcher and a send worker.
/// Closing stops them and releases the transport. Sends on a closed session
/// are rejected without error. Request listeners and the reply cache belong
/// to the session itself and survive close/open cycles, although closing
/// empties the cache.
pub struct PortSession {
    transport: Arc<dyn TransportPort>,
    config: Option<PortConfig>,
    session_config: SessionConfig,
    cache: Arc<ReplyCache>,
    listeners: Arc<ListenerRegistry>,
    engine: Mutex<Option<Engine>>,
}

impl PortSession {
    /// Create a session with no port configuration bound yet.
    pub fn new(transport: impl TransportPort + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            config: None,
            session_config: SessionConfig::default(),
            cache: Arc::new(ReplyCache::new()),
            listeners: Arc::new(ListenerRegistry::new()),
            engine: Mutex::new(None),
        }
    }

    /// Create a session with its port configuration.
    pub fn with_parts(transport: impl TransportPort + 'static, config: PortConfig) -> Self {
        let mut session = Self::new(transport);
        session.bind(config);
        session
    }

    /// Bind the port configuration. Takes effect on the next open.
    pub fn bind(&mut self, config: PortConfig) {
        self.config = Some(config);
    }

    /// Use a shared reply cache instead of a private one.
    pub fn with_cache(mut self, cache: Arc<ReplyCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Override runtime behavior.
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Option<Engine>> {
        self.engine
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the transport and start the engine. Opening an open session is a no-op.
    pub fn try_open(&self) -> Result<()> {
        let mut engine = self.lock();
        if engine.is_some() {
            return Ok(());
        }
        let config = self
            .config
            .clone()
            .ok_or(SessionError::ConfigurationMissing)?;

        self.transport.open()?;
        match self.start_engine(config) {
            Ok(started) => {
                info!(transport = self.transport.name(), "session opened");
                *engine = Some(started);
                Ok(())
            }
            Err(err) => {
                self.transport.close();
                Err(err)
            }
        }
    }

    fn start_engine(&self, config: PortConfig) -> Result<Engine> {
        let slots = Arc::new(ReplySlots::new());
        let fanout = EventFanout::start(Arc::clone(&self.listeners))?;
        let requests = fanout.publisher().ok_or_else(|| SessionError::Spawn {
            name: "fanout",
            source: std::io::Error::other("dispatcher already stopped"),
        })?;

        let receiver = ReceiveLoop::spawn(ReceiveContext {
            transport: Arc::clone(&self.transport),
            assembler: FrameAssembler::new(config.clone()),
            slots: Arc::clone(&slots),
            cache: Arc::clone(&self.cache),
            requests,
            record_responses: self.session_config.record_responses,
            poll_interval: self.session_config.poll_interval,
        })?;

        let coordinator = SendCoordinator::start(WorkerContext {
            transport: Arc::clone(&self.transport),
            config,
            slots,
            cache: Arc::clone(&self.cache),
            reply_poll_interval: self.session_config.reply_poll_interval,
        })?;

        Ok(Engine {
            receiver,
            fanout,
            coordinator: Arc::new(coordinator),
        })
    }

    /// Open the session, logging the reason on failure.
    pub fn open(&self) -> bool {
        match self.try_open() {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to open session");
                false
            }
        }
    }

    /// Stop the engine, close the transport and empty the reply cache.
    ///
    /// An in-flight write completes; its job is abandoned. Always succeeds.
    pub fn close(&self) -> bool {
        let engine = self.lock().take();
        if let Some(mut engine) = engine {
            engine.coordinator.shutdown();
            engine.receiver.stop();
            self.transport.close();
            engine.fanout.stop();
            info!(transport = self.transport.name(), "session closed");
        }
        self.cache.clear_all();
        true
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether the receive loop is still running. It stops on a read fault.
    pub fn is_receiving(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|engine| engine.receiver.is_running())
    }

    fn coordinator(&self) -> Option<Arc<SendCoordinator>> {
        self.lock()
            .as_ref()
            .map(|engine| Arc::clone(&engine.coordinator))
    }

    /// Send and block until the reply, using the session's default timeout.
    ///
    /// Returns `None` on timeout, interrupt, or when the session is closed.
    pub fn send(&self, data: &[u8]) -> Option<Bytes> {
        self.send_with(data, SendOptions::new(self.session_config.send_timeout))?
            .into_response()
    }

    /// Send and block until the outcome.
    pub fn send_with(&self, data: &[u8], options: SendOptions) -> Option<SendOutcome> {
        self.coordinator()?.send_blocking(data, options)
    }

    /// Queue a send; `callback` receives `tag` and the outcome on the send worker.
    ///
    /// Returns `false` (and never calls back) when the session is closed.
    pub fn send_async<F>(&self, data: &[u8], tag: Tag, callback: F) -> bool
    where
        F: FnOnce(Tag, SendOutcome) + Send + 'static,
    {
        let options = SendOptions::new(self.session_config.send_timeout);
        self.send_async_with(data, options, tag, callback)
    }

    /// Queue a send with explicit options.
    pub fn send_async_with<F>(
        &self,
        data: &[u8],
        options: SendOptions,
        tag: Tag,
        callback: F,
    ) -> bool
    where
        F: FnOnce(Tag, SendOutcome) + Send + 'static,
    {
        let callback: SendCallback = Box::new(callback);
        self.coordinator()
            .is_some_and(|coordinator| coordinator.send_async(data, options, tag, callback))
    }

    /// Drop all queued and in-flight sends and start a fresh send worker.
    pub fn clear_pending(&self) -> bool {
        self.coordinator()
            .is_some_and(|coordinator| coordinator.clear_pending())
    }

    /// Register an observer of device-originated request frames.
    pub fn add_request_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.listeners.add(listener)
    }

    pub fn remove_request_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn clear_request_listeners(&self) {
        self.listeners.clear();
    }

    pub fn request_listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// The reply cache shared with collaborators.
    pub fn cache(&self) -> &Arc<ReplyCache> {
        &self.cache
    }

    /// The bound port configuration.
    pub fn config(&self) -> Option<&PortConfig> {
        self.config.as_ref()
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }
}

impl Drop for PortSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PortSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSession")
            .field("transport", &self.transport.name())
            .field("configured", &self.config.is_some())
            .field("open", &self.is_open())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
