//! Non-blocking byte transport abstraction for point-to-point device links.
//!
//! A transport moves raw, unframed bytes. It never blocks on read: callers poll
//! and receive whatever happens to be available. Everything else in portwire
//! builds on the [`TransportPort`] trait provided here.
//!
//! Two implementations ship with the crate:
//! - [`DevicePort`] for character devices, ptys and FIFOs (Unix)
//! - [`MemoryPort`] for an in-process link driven by a [`MemoryDevice`]

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod device;

pub use error::{Result, TransportError};
pub use memory::{MemoryDevice, MemoryPort};
pub use traits::TransportPort;

#[cfg(unix)]
pub use device::DevicePort;
