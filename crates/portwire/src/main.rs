mod cmd;
mod exit;
mod framing;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "portwire",
    version,
    about = "Frame, send and listen on serial and USB device links"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "PORTWIRE_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "portwire",
            "send",
            "/dev/ttyUSB0",
            "--hex",
            "AA5500",
            "--response-head",
            "AA55",
            "--length-offset",
            "2",
            "--timeout",
            "500ms",
            "--kind",
            "result",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn rejects_conflicting_length_rules() {
        let err = Cli::try_parse_from([
            "portwire",
            "decode",
            "--hex",
            "AA55",
            "--fixed-length",
            "4",
            "--length-offset",
            "2",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn decode_requires_input() {
        let err = Cli::try_parse_from(["portwire", "decode", "--fixed-length", "4"])
            .expect_err("missing input should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn global_format_after_subcommand() {
        let cli = Cli::try_parse_from([
            "portwire",
            "listen",
            "/dev/ttyACM0",
            "--request-head",
            "BB66",
            "--fixed-length",
            "4",
            "--format",
            "json",
            "--count",
            "2",
        ])
        .expect("listen args should parse");
        assert!(matches!(cli.format, Some(OutputFormat::Json)));
    }
}
