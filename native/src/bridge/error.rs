use super::probe::ProbeFailure;
use thiserror::Error;

/// Failure to establish a working conversation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    /// The availability probe did not reach the server; no real connect was tried.
    #[error("DDE Server not available: {0}")]
    ServerUnavailable(ProbeFailure),

    #[error("Failed to connect after {attempts} attempts. Last error: {last_error}")]
    RetriesExhausted { last_error: String, attempts: u32 },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Failure of a single request or poke on an established conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("DDE Error: {message}\nServer: {server}\nTopic: {topic}\nItem: {item}")]
    Protocol {
        message: String,
        server: String,
        topic: String,
        item: String,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Either half of a connect-use-close cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Request(#[from] RequestError),
}
