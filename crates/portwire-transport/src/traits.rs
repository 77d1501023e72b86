use bytes::Bytes;

use crate::error::Result;

/// A raw byte link to a peripheral.
///
/// All methods take `&self`: one thread polls [`read`](TransportPort::read)
/// while another issues [`write`](TransportPort::write), so implementations
/// provide their own interior synchronization.
pub trait TransportPort: Send + Sync {
    /// Open the underlying link. Opening an already open port succeeds.
    fn open(&self) -> Result<()>;

    /// Close the underlying link. Closing a closed port is a no-op.
    fn close(&self);

    /// Whether the link is currently open.
    fn is_open(&self) -> bool;

    /// Return whatever bytes are currently available without blocking.
    ///
    /// `Ok(None)` means nothing is pending. An `Err` is a read fault.
    fn read(&self) -> Result<Option<Bytes>>;

    /// Write the whole buffer to the link.
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Transport name for diagnostics.
    fn name(&self) -> &str {
        "port"
    }
}

impl<T: TransportPort + ?Sized> TransportPort for std::sync::Arc<T> {
    fn open(&self) -> Result<()> {
        (**self).open()
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&self) -> Result<Option<Bytes>> {
        (**self).read()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: TransportPort + ?Sized> TransportPort for Box<T> {
    fn open(&self) -> Result<()> {
        (**self).open()
    }

    fn close(&self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read(&self) -> Result<Option<Bytes>> {
        (**self).read()
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
