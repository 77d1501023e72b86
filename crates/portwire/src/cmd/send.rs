use std::time::Duration;

use portwire_session::{PortSession, SendOptions, SendOutcome};
use portwire_transport::DevicePort;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{session_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::framing::parse_hex;
use crate::output::{print_outcome, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = parse_hex("--hex", &args.hex)?;
    if payload.is_empty() {
        return Err(CliError::usage("--hex must contain at least one byte"));
    }
    let config = args.framing.to_config()?;

    let session = PortSession::with_parts(DevicePort::new(&args.path), config);
    session
        .try_open()
        .map_err(|err| session_error("open failed", err))?;

    let options = SendOptions::new(timeout).with_kind(args.kind.into());
    let outcome = session
        .send_with(&payload, options)
        .ok_or_else(|| CliError::new(crate::exit::INTERNAL, "send was not accepted"))?;
    session.close();

    debug!(outcome = outcome.as_str(), "send settled");
    match outcome {
        SendOutcome::Response(_) => {
            print_outcome(&outcome, format);
            Ok(SUCCESS)
        }
        SendOutcome::Interrupt(_) => {
            print_outcome(&outcome, format);
            Ok(FAILURE)
        }
        SendOutcome::Timeout(_) => Err(CliError::new(
            TIMEOUT,
            format!("no reply within {}ms", timeout.as_millis()),
        )),
    }
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
