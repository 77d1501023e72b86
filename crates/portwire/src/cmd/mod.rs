use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use portwire_frame::ReplyKind;

use crate::exit::CliResult;
use crate::framing::FramingArgs;
use crate::output::OutputFormat;

pub mod decode;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send one command frame and wait for its reply.
    Send(SendArgs),
    /// Print frames read from a device until interrupted.
    Listen(ListenArgs),
    /// Cut frames out of captured bytes.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Reply class to wait for.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReplyArg {
    Response,
    Result,
}

impl From<ReplyArg> for ReplyKind {
    fn from(arg: ReplyArg) -> Self {
        match arg {
            ReplyArg::Response => ReplyKind::Response,
            ReplyArg::Result => ReplyKind::Result,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device path (tty, pty or FIFO).
    pub path: PathBuf,
    /// Command bytes in hex.
    #[arg(long, value_name = "HEX")]
    pub hex: String,
    /// Maximum time to wait for a reply (e.g. 3s, 500ms).
    #[arg(long, default_value = "3s")]
    pub timeout: String,
    /// Reply class to wait for.
    #[arg(long, value_enum, default_value = "response")]
    pub kind: ReplyArg,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Device path (tty, pty or FIFO).
    pub path: PathBuf,
    /// Exit after receiving N request frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Captured bytes in hex.
    #[arg(long, value_name = "HEX", conflicts_with = "file", required_unless_present = "file")]
    pub hex: Option<String>,
    /// Read captured bytes from a file.
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,
    /// Feed the input in chunks of this many bytes.
    #[arg(long, value_name = "BYTES")]
    pub chunk: Option<usize>,
    #[command(flatten)]
    pub framing: FramingArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
