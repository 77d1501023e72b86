//! Frame-head resynchronization and length-delimited slicing for raw byte streams.
//!
//! Peripherals on serial and USB links speak in frames that start with a
//! short head pattern and carry their own length. This crate finds those
//! heads in an unreliable byte stream, drops noise and garbled partials, and
//! cuts complete frames classified as responses or device-originated requests.

pub mod assembler;
pub mod config;
pub mod error;
pub mod frame;
pub mod head;

pub use assembler::FrameAssembler;
pub use config::{
    InterruptClassifier, LengthResolver, LengthRule, OverflowPolicy, PortConfig,
    PortConfigBuilder, ReplyFilter, DEFAULT_BUFFER_CAPACITY,
};
pub use error::{FrameError, Result};
pub use frame::{Frame, FrameKind, ReplyKind};
pub use head::{find_last_head, HeadSet};
