use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use bytes::Bytes;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::TransportPort;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Character-device transport (tty, pty, FIFO).
///
/// The path is opened read/write with `O_NONBLOCK | O_NOCTTY`, so reads never
/// block and the device never becomes the controlling terminal. Line settings
/// such as baud rate and parity are expected to be configured out of band.
pub struct DevicePort {
    path: PathBuf,
    file: RwLock<Option<File>>,
}

impl DevicePort {
    /// Create a port for `path`. Nothing is opened until [`TransportPort::open`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: RwLock::new(None),
        }
    }

    /// Open `path` immediately.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let port = Self::new(path);
        port.open()?;
        Ok(port)
    }

    /// The device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_file<T>(&self, f: impl FnOnce(&File) -> Result<T>) -> Result<T> {
        let guard = self
            .file
            .read()
            .map_err(|_| TransportError::Fault("device lock poisoned".to_string()))?;
        match guard.as_ref() {
            Some(file) => f(file),
            None => Err(TransportError::NotOpen),
        }
    }
}

impl TransportPort for DevicePort {
    fn open(&self) -> Result<()> {
        let mut guard = self
            .file
            .write()
            .map_err(|_| TransportError::Fault("device lock poisoned".to_string()))?;
        if guard.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(&self.path)
            .map_err(|e| TransportError::Open {
                path: self.path.clone(),
                source: e,
            })?;

        info!(path = ?self.path, "opened device port");
        *guard = Some(file);
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut guard) = self.file.write() {
            if guard.take().is_some() {
                debug!(path = ?self.path, "closed device port");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.file.read().map(|g| g.is_some()).unwrap_or(false)
    }

    fn read(&self) -> Result<Option<Bytes>> {
        self.with_file(|file| {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            loop {
                let mut reader = file;
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        return Err(TransportError::Fault(
                            "device reported end of stream".to_string(),
                        ))
                    }
                    Ok(n) => return Ok(Some(Bytes::copy_from_slice(&chunk[..n]))),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
                    Err(err) => return Err(TransportError::Io(err)),
                }
            }
        })
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.with_file(|file| {
            let mut writer = file;
            let mut offset = 0usize;
            while offset < data.len() {
                match writer.write(&data[offset..]) {
                    Ok(0) => {
                        return Err(TransportError::Fault(
                            "device accepted no bytes".to_string(),
                        ))
                    }
                    Ok(n) => offset += n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        std::thread::yield_now();
                        continue;
                    }
                    Err(err) => return Err(TransportError::Io(err)),
                }
            }
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "device"
    }
}

impl std::fmt::Debug for DevicePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePort")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}
