use std::sync::Arc;

use bytes::Bytes;

use crate::error::{FrameError, Result};
use crate::frame::{FrameKind, ReplyKind};
use crate::head::HeadSet;

/// Default receive buffer capacity: 16 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Returns the total frame length for a slice that begins at a frame head,
/// or 0 while the length cannot be determined yet.
pub type LengthResolver = Arc<dyn Fn(&[u8]) -> usize + Send + Sync>;

/// Decides whether a request frame is an interrupt.
pub type InterruptClassifier = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Decides whether `received` answers `sent` for the given reply kind.
pub type ReplyFilter = Arc<dyn Fn(&[u8], &[u8], ReplyKind) -> bool + Send + Sync>;

/// What the assembler does when the receive buffer fills up without a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Discard the buffered bytes, log a warning and keep receiving.
    #[default]
    Reset,
    /// Fail with [`FrameError::BufferOverflow`], stopping the receive loop.
    Fatal,
}

/// Declarative length resolvers for the common header layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    /// Every frame is exactly this many bytes.
    Fixed(usize),
    /// An unsigned length field inside the header.
    ///
    /// Total frame length is the field value plus `adjust`.
    Field {
        offset: usize,
        width: usize,
        big_endian: bool,
        adjust: i64,
    },
}

impl LengthRule {
    /// Length field of `width` bytes at `offset`, little-endian, no adjustment.
    pub fn field(offset: usize, width: usize) -> Self {
        LengthRule::Field {
            offset,
            width,
            big_endian: false,
            adjust: 0,
        }
    }

    /// Resolve the total frame length for `data`, or 0 if not yet known.
    pub fn resolve(&self, data: &[u8]) -> usize {
        match *self {
            LengthRule::Fixed(len) => len,
            LengthRule::Field {
                offset,
                width,
                big_endian,
                adjust,
            } => {
                if width == 0 || width > 8 {
                    return 0;
                }
                let Some(end) = offset.checked_add(width) else {
                    return 0;
                };
                let Some(field) = data.get(offset..end) else {
                    return 0;
                };
                let value = field.iter().enumerate().fold(0u64, |acc, (i, byte)| {
                    let shift = 8 * if big_endian { width - 1 - i } else { i };
                    acc | (u64::from(*byte) << shift)
                });
                i64::try_from(value)
                    .ok()
                    .and_then(|value| value.checked_add(adjust))
                    .filter(|total| *total > 0)
                    .and_then(|total| usize::try_from(total).ok())
                    .unwrap_or(0)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            LengthRule::Fixed(0) => Err(FrameError::InvalidConfig(
                "fixed frame length must be non-zero".to_string(),
            )),
            LengthRule::Field { width, .. } if !matches!(width, 1 | 2 | 4) => {
                Err(FrameError::InvalidConfig(format!(
                    "length field width must be 1, 2 or 4 bytes, got {width}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Framing rules for one attached device.
#[derive(Clone)]
pub struct PortConfig {
    heads: HeadSet,
    length_resolver: LengthResolver,
    interrupt_classifier: Option<InterruptClassifier>,
    reply_filter: Option<ReplyFilter>,
    buffer_capacity: usize,
    overflow_policy: OverflowPolicy,
    unmarked_kind: FrameKind,
}

impl PortConfig {
    /// Start building a configuration.
    pub fn builder() -> PortConfigBuilder {
        PortConfigBuilder::default()
    }

    /// Configured frame heads.
    pub fn heads(&self) -> &HeadSet {
        &self.heads
    }

    /// Total length of the frame starting at `data[0]`, or 0 if unknown.
    pub fn resolve_length(&self, data: &[u8]) -> usize {
        (self.length_resolver)(data)
    }

    /// Whether a request frame is an interrupt.
    pub fn is_interrupt(&self, frame: &[u8]) -> bool {
        self.interrupt_classifier
            .as_ref()
            .is_some_and(|classify| classify(frame))
    }

    /// Whether `received` answers `sent`. Without a filter every reply matches.
    pub fn accepts_reply(&self, sent: &[u8], received: &[u8], kind: ReplyKind) -> bool {
        self.reply_filter
            .as_ref()
            .is_none_or(|filter| filter(sent, received, kind))
    }

    /// The reply filter, if one is configured.
    pub fn reply_filter(&self) -> Option<&ReplyFilter> {
        self.reply_filter.as_ref()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    /// Kind assigned to frames when no heads are configured.
    pub fn unmarked_kind(&self) -> FrameKind {
        self.unmarked_kind
    }
}

impl std::fmt::Debug for PortConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex_list =
            |heads: &[Bytes]| heads.iter().map(hex::encode_upper).collect::<Vec<_>>();
        f.debug_struct("PortConfig")
            .field("response_heads", &hex_list(self.heads.response()))
            .field("request_heads", &hex_list(self.heads.request()))
            .field("interrupt_classifier", &self.interrupt_classifier.is_some())
            .field("reply_filter", &self.reply_filter.is_some())
            .field("buffer_capacity", &self.buffer_capacity)
            .field("overflow_policy", &self.overflow_policy)
            .field("unmarked_kind", &self.unmarked_kind)
            .finish()
    }
}

/// Builder for [`PortConfig`].
pub struct PortConfigBuilder {
    response_heads: Vec<Bytes>,
    request_heads: Vec<Bytes>,
    length_rule: Option<LengthRule>,
    length_resolver: Option<LengthResolver>,
    interrupt_classifier: Option<InterruptClassifier>,
    reply_filter: Option<ReplyFilter>,
    buffer_capacity: usize,
    overflow_policy: OverflowPolicy,
    unmarked_kind: FrameKind,
}

impl Default for PortConfigBuilder {
    fn default() -> Self {
        Self {
            response_heads: Vec::new(),
            request_heads: Vec::new(),
            length_rule: None,
            length_resolver: None,
            interrupt_classifier: None,
            reply_filter: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            unmarked_kind: FrameKind::Response,
        }
    }
}

impl PortConfigBuilder {
    /// Add a head pattern that marks a response frame.
    pub fn response_head(mut self, head: impl Into<Bytes>) -> Self {
        self.response_heads.push(head.into());
        self
    }

    /// Add a head pattern that marks a device-originated request frame.
    pub fn request_head(mut self, head: impl Into<Bytes>) -> Self {
        self.request_heads.push(head.into());
        self
    }

    /// Resolve frame lengths with a declarative rule.
    pub fn length_rule(mut self, rule: LengthRule) -> Self {
        self.length_rule = Some(rule);
        self.length_resolver = None;
        self
    }

    /// Resolve frame lengths with a custom function.
    pub fn length_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&[u8]) -> usize + Send + Sync + 'static,
    {
        self.length_resolver = Some(Arc::new(resolver));
        self.length_rule = None;
        self
    }

    /// Classify request frames as interrupts with a custom function.
    pub fn interrupt_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.interrupt_classifier = Some(Arc::new(classifier));
        self
    }

    /// Treat request frames beginning with `prefix` as interrupts.
    pub fn interrupt_prefix(self, prefix: impl Into<Bytes>) -> Self {
        let prefix = prefix.into();
        self.interrupt_classifier(move |frame| frame.starts_with(&prefix))
    }

    /// Only accept replies for which `filter(sent, received, kind)` holds.
    pub fn reply_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&[u8], &[u8], ReplyKind) -> bool + Send + Sync + 'static,
    {
        self.reply_filter = Some(Arc::new(filter));
        self
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Kind assigned to frames when no heads are configured.
    pub fn unmarked_kind(mut self, kind: FrameKind) -> Self {
        self.unmarked_kind = kind;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<PortConfig> {
        if self.buffer_capacity == 0 {
            return Err(FrameError::InvalidConfig(
                "buffer capacity must be non-zero".to_string(),
            ));
        }
        for head in self.response_heads.iter().chain(self.request_heads.iter()) {
            if head.is_empty() {
                return Err(FrameError::InvalidConfig(
                    "frame head patterns must be non-empty".to_string(),
                ));
            }
            if head.len() > self.buffer_capacity {
                return Err(FrameError::InvalidConfig(format!(
                    "frame head {} is longer than the buffer capacity",
                    hex::encode_upper(head)
                )));
            }
        }

        let length_resolver: LengthResolver = match (self.length_resolver, self.length_rule) {
            (Some(resolver), _) => resolver,
            (None, Some(rule)) => {
                rule.validate()?;
                Arc::new(move |data: &[u8]| rule.resolve(data))
            }
            (None, None) => {
                return Err(FrameError::InvalidConfig(
                    "no length resolver configured".to_string(),
                ))
            }
        };

        Ok(PortConfig {
            heads: HeadSet::new(self.response_heads, self.request_heads),
            length_resolver,
            interrupt_classifier: self.interrupt_classifier,
            reply_filter: self.reply_filter,
            buffer_capacity: self.buffer_capacity,
            overflow_policy: self.overflow_policy,
            unmarked_kind: self.unmarked_kind,
        })
    }
}
