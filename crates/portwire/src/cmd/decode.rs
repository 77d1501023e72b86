use std::fs;

use portwire_frame::{Frame, FrameAssembler};
use tracing::info;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS};
use crate::framing::parse_hex;
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let input = resolve_input(&args)?;
    let mut assembler = FrameAssembler::new(args.framing.to_config()?);
    let frames = decode(&mut assembler, &input, args.chunk)?;

    for frame in &frames {
        print_frame(frame, format);
    }
    if assembler.buffered() > 0 {
        info!(bytes = assembler.buffered(), "trailing bytes left undecoded");
    }
    Ok(SUCCESS)
}

fn resolve_input(args: &DecodeArgs) -> CliResult<Vec<u8>> {
    if let Some(text) = &args.hex {
        return parse_hex("--hex", text);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Err(CliError::usage("one of --hex or --file is required"))
}

fn decode(
    assembler: &mut FrameAssembler,
    input: &[u8],
    chunk: Option<usize>,
) -> CliResult<Vec<Frame>> {
    let size = match chunk {
        Some(0) => return Err(CliError::usage("--chunk must be greater than zero")),
        Some(size) => size,
        None => input.len().max(1),
    };

    let mut frames = Vec::new();
    for piece in input.chunks(size) {
        let cut = assembler
            .push(piece)
            .map_err(|err| frame_error("decode failed", err))?;
        frames.extend(cut);
    }
    Ok(frames)
}
