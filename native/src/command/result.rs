// Outbound result shapes, one per action.

use crate::dde::DdeValue;
use serde::Serialize;

/// Result printed to the caller. Serialized without a tag: the field set
/// identifies the shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    Check {
        available: bool,
        message: String,
    },
    Read {
        value: Option<DdeValue>,
        error: Option<String>,
    },
    Write {
        success: bool,
        error: Option<String>,
    },
    Validate {
        valid: bool,
        error: Option<String>,
    },
    Error {
        error: String,
    },
}

impl CommandResult {
    pub fn error(message: impl Into<String>) -> Self {
        CommandResult::Error {
            error: message.into(),
        }
    }

    /// Error text carried by the result, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            CommandResult::Check { .. } => None,
            CommandResult::Read { error, .. }
            | CommandResult::Write { error, .. }
            | CommandResult::Validate { error, .. } => error.as_deref(),
            CommandResult::Error { error } => Some(error),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
