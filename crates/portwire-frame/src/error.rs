/// Errors that can occur while configuring or running frame assembly.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Accumulated bytes reached the receive buffer capacity under the fatal policy.
    #[error("receive buffer overflow ({capacity} bytes without a complete frame)")]
    BufferOverflow { capacity: usize },

    /// The port configuration is unusable.
    #[error("invalid port configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
