use std::path::PathBuf;

/// Errors that can occur in port transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the device at the specified path.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The transport refused to open.
    #[error("port refused to open: {0}")]
    OpenRefused(String),

    /// An I/O error occurred on the port.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port is not open.
    #[error("port not open")]
    NotOpen,

    /// The port reported a fault that is not an I/O error.
    #[error("port fault: {0}")]
    Fault(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
