//! Framing, request/response correlation and event fan-out for serial and USB
//! device links.
//!
//! Peripherals attached over a raw byte link answer commands with response
//! frames and also emit unsolicited request frames of their own. portwire
//! resynchronizes on frame heads, cuts length-delimited frames out of the
//! stream, pairs replies with the commands that caused them and fans
//! device-originated requests out to listeners.
//!
//! # Crate Structure
//!
//! - [`transport`]: Non-blocking byte transport abstraction (character devices, in-memory link)
//! - [`frame`]: Frame-head resynchronization and length-delimited slicing
//! - [`session`]: Send coordination, reply correlation and request fan-out (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use portwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use portwire_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use portwire_session::*;
}
