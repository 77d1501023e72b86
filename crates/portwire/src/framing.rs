use clap::Args;
use portwire_frame::{LengthRule, OverflowPolicy, PortConfig, DEFAULT_BUFFER_CAPACITY};

use crate::exit::{frame_error, CliError, CliResult};

/// Frame layout options shared by every command that cuts frames.
#[derive(Args, Debug, Clone)]
pub struct FramingArgs {
    /// Head of response frames, in hex (e.g. AA55). Repeatable.
    #[arg(long = "response-head", value_name = "HEX")]
    pub response_heads: Vec<String>,
    /// Head of device-originated request frames, in hex. Repeatable.
    #[arg(long = "request-head", value_name = "HEX")]
    pub request_heads: Vec<String>,
    /// Every frame has this total length.
    #[arg(long, value_name = "BYTES", conflicts_with = "length_offset")]
    pub fixed_length: Option<usize>,
    /// Offset of the length field, counted from the start of the frame.
    #[arg(long, value_name = "OFFSET")]
    pub length_offset: Option<usize>,
    /// Width of the length field in bytes (1, 2 or 4).
    #[arg(long, value_name = "BYTES", default_value = "1")]
    pub length_width: usize,
    /// Decode the length field as big-endian.
    #[arg(long)]
    pub big_endian: bool,
    /// Added to the field value to get the total frame length.
    #[arg(long, value_name = "N", default_value = "0", allow_hyphen_values = true)]
    pub length_adjust: i64,
    /// Request frames starting with this hex prefix are interrupts.
    #[arg(long, value_name = "HEX")]
    pub interrupt_prefix: Option<String>,
    /// Receive buffer capacity in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    /// Fail instead of discarding the buffer when it overflows.
    #[arg(long)]
    pub fatal_overflow: bool,
}

impl FramingArgs {
    pub fn to_config(&self) -> CliResult<PortConfig> {
        let rule = match (self.fixed_length, self.length_offset) {
            (Some(len), _) => LengthRule::Fixed(len),
            (None, Some(offset)) => LengthRule::Field {
                offset,
                width: self.length_width,
                big_endian: self.big_endian,
                adjust: self.length_adjust,
            },
            (None, None) => {
                return Err(CliError::usage(
                    "one of --fixed-length or --length-offset is required",
                ))
            }
        };

        let mut builder = PortConfig::builder()
            .length_rule(rule)
            .buffer_capacity(self.buffer_capacity);
        for head in &self.response_heads {
            builder = builder.response_head(parse_hex("--response-head", head)?);
        }
        for head in &self.request_heads {
            builder = builder.request_head(parse_hex("--request-head", head)?);
        }
        if let Some(prefix) = &self.interrupt_prefix {
            builder = builder.interrupt_prefix(parse_hex("--interrupt-prefix", prefix)?);
        }
        if self.fatal_overflow {
            builder = builder.overflow_policy(OverflowPolicy::Fatal);
        }

        builder
            .build()
            .map_err(|err| frame_error("invalid framing", err))
    }
}

/// Parse hex text, tolerating whitespace and an optional `0x` prefix.
pub fn parse_hex(what: &str, input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.split_whitespace().collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits).map_err(|err| CliError::usage(format!("{what} is not valid hex: {err}")))
}
