use std::time::Duration;

/// Default window a send waits for its reply.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Runtime behavior of a [`PortSession`](crate::PortSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reply window used by [`send`](crate::PortSession::send) and
    /// [`send_async`](crate::PortSession::send_async).
    pub send_timeout: Duration,
    /// Sleep between transport reads while nothing is pending.
    pub poll_interval: Duration,
    /// Sleep between reply checks while a send is waiting.
    pub reply_poll_interval: Duration,
    /// Record response frames in the reply cache instead of the single
    /// last-response slot, so several outstanding sends can be told apart by
    /// the reply filter.
    pub record_responses: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
            poll_interval: Duration::from_millis(1),
            reply_poll_interval: Duration::from_millis(1),
            record_responses: false,
        }
    }
}
