use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use portwire_frame::Frame;
use portwire_session::SendOutcome;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'a str,
    interrupt: bool,
    length: usize,
    hex: String,
    timestamp: String,
}

impl<'a> FrameOutput<'a> {
    fn new(kind: &'a str, interrupt: bool, data: &[u8]) -> Self {
        Self {
            kind,
            interrupt,
            length: data.len(),
            hex: hex::encode_upper(data),
            timestamp: now_unix_millis(),
        }
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    let out = FrameOutput::new(frame.kind.as_str(), frame.interrupt, frame.data.as_ref());
    print_output(&out, frame.data.as_ref(), format);
}

/// Print the settled outcome of a blocking send.
pub fn print_outcome(outcome: &SendOutcome, format: OutputFormat) {
    let interrupt = matches!(outcome, SendOutcome::Interrupt(_));
    let out = FrameOutput::new(outcome.as_str(), interrupt, outcome.data().as_ref());
    print_output(&out, outcome.data().as_ref(), format);
}

fn print_output(out: &FrameOutput<'_>, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "INTERRUPT", "LENGTH", "DATA"])
                .add_row(vec![
                    out.kind.to_string(),
                    out.interrupt.to_string(),
                    out.length.to_string(),
                    spaced_hex(data),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "kind={} interrupt={} length={} data={}",
                out.kind,
                out.interrupt,
                out.length,
                spaced_hex(data)
            );
        }
        OutputFormat::Raw => print_raw(data),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn spaced_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn now_unix_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_output_serializes_upper_hex() {
        let out = FrameOutput::new("response", false, &[0xAA, 0x55, 0x03]);
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["kind"], "response");
        assert_eq!(value["length"], 3);
        assert_eq!(value["hex"], "AA5503");
    }

    #[test]
    fn spaced_hex_separates_bytes() {
        assert_eq!(spaced_hex(&[0x0A, 0xFF]), "0A FF");
        assert_eq!(spaced_hex(&[]), "");
    }
}
