// Availability probe: a throwaway conversation that only tests ConnectTo.

use super::handles::HandleGuard;
use crate::dde::{DdeError, DdeHost, ServerTopic};
use crate::timing::Clock;
use log::{debug, info};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Server name used for the disposable probe instance.
pub const PROBE_SERVER_NAME: &str = "DDETest";

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(500);

const AVAILABLE_MESSAGE: &str = "Connection successful";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Wall-clock budget for repeated connect attempts.
    pub timeout: Duration,
    /// Pause between attempts.
    pub interval: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

/// Structured report of a probe that ran out of time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticInfo {
    pub attempted_server: String,
    pub attempted_topic: String,
    pub last_error: Option<String>,
    #[serde(rename = "timeout", serialize_with = "whole_or_fractional")]
    pub timeout_seconds: f64,
}

/// Whole-second timeouts render as integers (`5`, not `5.0`).
fn whole_or_fractional<S: Serializer>(seconds: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if seconds.fract() == 0.0 && *seconds >= 0.0 && *seconds <= u64::MAX as f64 {
        serializer.serialize_u64(*seconds as u64)
    } else {
        serializer.serialize_f64(*seconds)
    }
}

/// Why a probe did not reach the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeFailure {
    /// Every attempt failed with a DDE connection error until the deadline.
    Timeout(DiagnosticInfo),
    /// A non-DDE error stopped the probe early.
    Aborted(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::Timeout(info) => {
                let json = serde_json::to_string(info).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
            ProbeFailure::Aborted(message) => write!(f, "Server check failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    Available,
    Unavailable(ProbeFailure),
}

impl ProbeResult {
    pub fn is_available(&self) -> bool {
        matches!(self, ProbeResult::Available)
    }

    /// Human-readable message: the success text, diagnostic JSON, or failure text.
    pub fn message(&self) -> String {
        match self {
            ProbeResult::Available => AVAILABLE_MESSAGE.to_string(),
            ProbeResult::Unavailable(failure) => failure.to_string(),
        }
    }

    pub fn diagnostic(&self) -> Option<&DiagnosticInfo> {
        match self {
            ProbeResult::Unavailable(ProbeFailure::Timeout(info)) => Some(info),
            _ => None,
        }
    }
}

/// Check whether `endpoint` currently accepts DDE connections.
///
/// At least one attempt is always made. The disposable handles are released
/// before returning, whatever the outcome.
pub fn probe<H, C>(
    host: &H,
    clock: &C,
    endpoint: &ServerTopic,
    settings: &ProbeSettings,
) -> ProbeResult
where
    H: DdeHost,
    C: Clock,
{
    debug!(
        "[PROBE] Checking {} (timeout {:?}, interval {:?})",
        endpoint, settings.timeout, settings.interval
    );

    let mut guard = HandleGuard::new(host, "probe");
    let result = match run_probe(&mut guard, clock, endpoint, settings) {
        Ok(result) => result,
        Err(e) => ProbeResult::Unavailable(ProbeFailure::Aborted(e.message)),
    };
    guard.release();

    match &result {
        ProbeResult::Available => debug!("[PROBE] {} is available", endpoint),
        ProbeResult::Unavailable(failure) => info!("[PROBE] {} unavailable: {}", endpoint, failure),
    }
    result
}

fn run_probe<H, C>(
    guard: &mut HandleGuard<'_, H>,
    clock: &C,
    endpoint: &ServerTopic,
    settings: &ProbeSettings,
) -> Result<ProbeResult, DdeError>
where
    H: DdeHost,
    C: Clock,
{
    let host = guard.host();
    host.init_message_loop()?;

    let server = host.create_server(PROBE_SERVER_NAME)?;
    guard.set_server(server);
    let conversation = host.create_conversation(server)?;
    guard.set_conversation(conversation);

    let started = clock.now();

    let last_error = loop {
        let message = match host.connect(conversation, endpoint) {
            Ok(()) => return Ok(ProbeResult::Available),
            Err(e) if e.is_connection() => {
                debug!("[PROBE] Attempt failed: {}", e);
                e.message
            }
            Err(e) => return Err(e),
        };

        let elapsed = clock.now().saturating_sub(started);
        if elapsed >= settings.timeout {
            break message;
        }
        clock.sleep(settings.interval.min(settings.timeout - elapsed));
        if clock.now().saturating_sub(started) >= settings.timeout {
            break message;
        }
    };

    Ok(ProbeResult::Unavailable(ProbeFailure::Timeout(DiagnosticInfo {
        attempted_server: endpoint.server().to_string(),
        attempted_topic: endpoint.topic().to_string(),
        last_error: Some(last_error),
        timeout_seconds: settings.timeout.as_secs_f64(),
    })))
}
