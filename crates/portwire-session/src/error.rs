/// Errors that can occur while opening or running a port session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No port configuration was bound before opening.
    #[error("no port configuration bound to the session")]
    ConfigurationMissing,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] portwire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] portwire_frame::FrameError),

    /// A session thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
