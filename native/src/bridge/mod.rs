// Connection lifecycle and request core: probe, connect with retries,
// request/poke, and guaranteed handle release.

pub mod connection;
pub mod error;
pub mod executor;
mod handles;
pub mod probe;

pub use connection::{
    ConnectionManager, Conversation, RetryPolicy, CLIENT_SERVER_NAME, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY,
};
pub use error::{BridgeError, ConnectionError, RequestError};
pub use probe::{
    probe, DiagnosticInfo, ProbeFailure, ProbeResult, ProbeSettings, DEFAULT_PROBE_INTERVAL,
    DEFAULT_PROBE_TIMEOUT, PROBE_SERVER_NAME,
};
