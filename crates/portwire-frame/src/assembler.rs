use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::config::{OverflowPolicy, PortConfig};
use crate::error::{FrameError, Result};
use crate::frame::{Frame, FrameKind};

/// Cuts complete frames out of a raw byte stream.
///
/// Bytes are fed in whatever chunks the transport delivers. The buffer is
/// scanned head by head: a frame anchored at a head is emitted once the
/// length resolver reports it complete and it ends before the next head.
/// A head whose frame is overrun by a later head is dropped as a garbled
/// partial, so the most recent head wins. Bytes after a complete frame stay
/// buffered and may start the next one.
pub struct FrameAssembler {
    config: PortConfig,
    buf: BytesMut,
    // Offset from which the next-head search resumes while a frame is incomplete.
    scan_from: usize,
}

impl FrameAssembler {
    pub fn new(config: PortConfig) -> Self {
        let buf = BytesMut::with_capacity(config.buffer_capacity());
        Self {
            config,
            buf,
            scan_from: 1,
        }
    }

    pub fn config(&self) -> &PortConfig {
        &self.config
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scan_from = 1;
    }

    /// Feed one chunk and return every frame it completes, in stream order.
    ///
    /// The chunk is appended in pieces that fit the free capacity. Only when
    /// the buffer is full and still holds no complete frame does the overflow
    /// policy apply.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut rest = chunk;
        while !rest.is_empty() {
            let free = self.config.buffer_capacity() - self.buf.len();
            if free == 0 {
                self.overflow()?;
                continue;
            }
            let take = free.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.config.heads().is_empty() {
                drain_unmarked(&self.config, &mut self.buf, &mut frames);
            } else {
                drain_marked(&self.config, &mut self.buf, &mut self.scan_from, &mut frames);
            }
        }
        Ok(frames)
    }

    fn overflow(&mut self) -> Result<()> {
        let capacity = self.config.buffer_capacity();
        match self.config.overflow_policy() {
            OverflowPolicy::Reset => {
                warn!(capacity, "receive buffer full without a complete frame, discarding");
                self.reset();
                Ok(())
            }
            OverflowPolicy::Fatal => Err(FrameError::BufferOverflow { capacity }),
        }
    }
}

fn drain_marked(
    config: &PortConfig,
    buf: &mut BytesMut,
    scan_from: &mut usize,
    frames: &mut Vec<Frame>,
) {
    let heads = config.heads();
    loop {
        let Some((start, kind)) = heads.next_marker(buf, 0) else {
            if buf.len() >= heads.shortest() {
                let dropped = buf.len() - heads.partial_suffix(buf);
                if dropped > 0 {
                    trace!(dropped, "no frame head buffered, resynchronizing");
                    buf.advance(dropped);
                }
            }
            *scan_from = 1;
            return;
        };
        if start > 0 {
            trace!(dropped = start, "discarding bytes before frame head");
            buf.advance(start);
            *scan_from = 1;
        }

        let len = config.resolve_length(buf);
        let complete = len > 0 && len <= buf.len();
        let next = heads
            .next_marker(buf, (*scan_from).max(1))
            .map(|(offset, _)| offset);
        match next {
            Some(next) if !complete || len > next => {
                debug!(dropped = next, "frame head overrun by a later head");
                buf.advance(next);
                *scan_from = 1;
            }
            _ if complete => {
                let data = buf.split_to(len).freeze();
                frames.push(classify(config, kind, data));
                *scan_from = 1;
            }
            _ => {
                // Offsets whose every head would fit in the buffer are settled.
                *scan_from = (buf.len() + 1).saturating_sub(heads.longest()).max(1);
                return;
            }
        }
    }
}

fn drain_unmarked(config: &PortConfig, buf: &mut BytesMut, frames: &mut Vec<Frame>) {
    while !buf.is_empty() {
        let len = config.resolve_length(buf);
        if len == 0 || len > buf.len() {
            return;
        }
        let data = buf.split_to(len).freeze();
        frames.push(classify(config, config.unmarked_kind(), data));
    }
}

fn classify(config: &PortConfig, kind: FrameKind, data: Bytes) -> Frame {
    let interrupt = kind == FrameKind::Request && config.is_interrupt(&data);
    Frame {
        kind,
        interrupt,
        data,
    }
}
