// Command-line surface for the dde-bridge binary. Exactly one JSON line is
// written to stdout per invocation; everything else goes to the log.

use crate::command::{ArgumentError, CommandRequest, CommandResult, Dispatcher};
use crate::config::BridgeSettings;
use crate::dde::DdeHost;
use crate::timing::Clock;
use clap::Parser;
use log::{debug, error};
use std::io::{self, Write};
use std::num::NonZeroU32;
use std::time::Duration;

pub const EXIT_OK: u8 = 0;
pub const EXIT_ARGUMENT_ERROR: u8 = 1;

#[derive(Debug, Parser)]
#[command(
    name = "dde-bridge",
    version,
    about = "Bridge JSON commands to an RSLinx DDE server"
)]
pub struct Args {
    /// Request object, e.g. '{"action":"read","item":"Tag"}'
    pub request: String,

    /// Total connect attempts before giving up
    #[arg(long, value_name = "N")]
    pub max_retries: Option<NonZeroU32>,

    /// Pause between connect attempts
    #[arg(long, value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Availability probe budget
    #[arg(long, value_name = "MS")]
    pub probe_timeout_ms: Option<u64>,

    /// Pause between probe attempts
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    pub probe_interval_ms: Option<u64>,

    /// Log filter for stderr (e.g. "debug" or "dde_bridge=trace")
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

impl Args {
    /// Layer command-line flags over `settings`.
    pub fn apply_overrides(&self, mut settings: BridgeSettings) -> BridgeSettings {
        if let Some(n) = self.max_retries {
            settings.retry.max_retries = n;
        }
        if let Some(ms) = self.retry_delay_ms {
            settings.retry.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.probe_timeout_ms {
            settings.probe.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.probe_interval_ms {
            settings.probe.interval = Duration::from_millis(ms);
        }
        settings
    }
}

/// Parse the process arguments. `--help`/`--version` come back as errors
/// too; see [`is_informational`].
pub fn parse_args<I, T>(args: I) -> Result<Args, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Args::try_parse_from(args)
}

/// True for clap "errors" that are really help or version output.
pub fn is_informational(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        clap::error::ErrorKind::DisplayHelp
            | clap::error::ErrorKind::DisplayVersion
            | clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

/// Reduce a clap error to its one-line summary.
pub fn usage_error(err: &clap::Error) -> ArgumentError {
    let rendered = err.to_string();
    let first = rendered.lines().next().unwrap_or_default();
    let summary = first.strip_prefix("error: ").unwrap_or(first).trim();
    ArgumentError::Usage(summary.to_string())
}

/// Write `result` as a single JSON line.
pub fn emit<W: Write>(out: &mut W, result: &CommandResult) -> io::Result<()> {
    let json = result.to_json().map_err(io::Error::other)?;
    writeln!(out, "{}", json)?;
    out.flush()
}

/// Parse the request, run it and print the result. Returns the exit code.
pub fn execute<H, C, W>(
    args: &Args,
    settings: &BridgeSettings,
    host: &H,
    clock: &C,
    out: &mut W,
) -> io::Result<u8>
where
    H: DdeHost,
    C: Clock,
    W: Write,
{
    let request = match CommandRequest::from_json(&args.request, settings) {
        Ok(request) => request,
        Err(e) => {
            error!("[CLI] Rejected request: {}", e);
            emit(out, &CommandResult::error(e.to_string()))?;
            return Ok(EXIT_ARGUMENT_ERROR);
        }
    };

    debug!("[CLI] Dispatching {:?}", request);
    let result = Dispatcher::new(host, clock, settings).dispatch(&request);
    emit(out, &result)?;
    Ok(EXIT_OK)
}
