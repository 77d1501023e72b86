//! Request/response correlation and event fan-out over framed device links.
//!
//! A [`PortSession`] owns one transport and runs three activities while open:
//! a receive loop that cuts frames out of the byte stream, a dispatcher that
//! hands device-originated requests to listeners in arrival order, and a
//! single send worker that writes commands one at a time and waits for their
//! replies, interrupts or timeouts.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod receiver;
pub mod session;
pub mod slots;

pub use cache::{CachedReply, ReplyCache};
pub use config::{SessionConfig, DEFAULT_SEND_TIMEOUT};
pub use coordinator::{SendCallback, SendCoordinator, SendOptions, SendOutcome, Tag};
pub use error::{Result, SessionError};
pub use fanout::{EventFanout, ListenerId, ListenerRegistry, RequestListener};
pub use receiver::ReceiveLoop;
pub use session::PortSession;
pub use slots::{ReplySlots, SlotHit};
