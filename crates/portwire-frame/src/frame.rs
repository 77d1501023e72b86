use bytes::Bytes;

/// How an inbound frame was classified by its frame head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Direct reply to a command sent from this side.
    Response,
    /// Unsolicited frame originated by the device.
    Request,
}

impl FrameKind {
    /// Lower-case name for logs and output.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Response => "response",
            FrameKind::Request => "request",
        }
    }
}

/// The reply class a sender waits for, and the matching cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReplyKind {
    /// Immediate acknowledgement of a command.
    #[default]
    Response,
    /// Final outcome of a long-running command, delivered later.
    Result,
}

impl ReplyKind {
    /// Lower-case name for logs and output.
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyKind::Response => "response",
            ReplyKind::Result => "result",
        }
    }
}

/// A complete, classified frame cut from the receive stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Classification by frame head.
    pub kind: FrameKind,
    /// Set on request frames the interrupt classifier flagged as urgent.
    pub interrupt: bool,
    /// The frame bytes, head included.
    pub data: Bytes,
}

impl Frame {
    /// Create a response frame.
    pub fn response(data: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Response,
            interrupt: false,
            data: data.into(),
        }
    }

    /// Create a request frame.
    pub fn request(data: impl Into<Bytes>, interrupt: bool) -> Self {
        Self {
            kind: FrameKind::Request,
            interrupt,
            data: data.into(),
        }
    }

    /// Frame length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Upper-case hex rendering of the frame bytes.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.data)
    }
}
