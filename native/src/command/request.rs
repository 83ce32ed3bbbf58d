// Inbound command parsing and validation.

use crate::config::BridgeSettings;
use crate::dde::{DdeLink, Item, LinkParseError, ServerTopic};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Malformed or incomplete input, caught before any connection attempt.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("Expected exactly one JSON argument: {0}")]
    Usage(String),

    #[error("Invalid request JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error(transparent)]
    InvalidLink(#[from] LinkParseError),
}

/// What a request asks the bridge to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Availability probe only.
    Check,
    Read { item: Item },
    Write { item: Item, value: String },
    /// Read a test item and discard it; `None` uses the configured item.
    Validate { item: Option<Item> },
    /// Anything else; answered with an error, no resources touched.
    Unknown(String),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Check => "check",
            Action::Read { .. } => "read",
            Action::Write { .. } => "write",
            Action::Validate { .. } => "validate",
            Action::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub endpoint: ServerTopic,
    pub action: Action,
}

// Unknown fields (Excel row/column, caller bookkeeping) are ignored.
#[derive(Debug, Deserialize)]
struct RawCommand {
    action: Option<String>,
    application: Option<String>,
    // Older callers name the application `server`; `application` wins.
    server: Option<String>,
    topic: Option<String>,
    item: Option<String>,
    value: Option<Value>,
    link: Option<String>,
}

impl CommandRequest {
    /// Parse a request object, filling server/topic from `defaults`.
    ///
    /// # Errors
    ///
    /// Returns an [`ArgumentError`] for malformed JSON, a bad `link`, or a
    /// field the action requires (`item` for read/write, `value` for write).
    pub fn from_json(json: &str, defaults: &BridgeSettings) -> Result<Self, ArgumentError> {
        let raw: RawCommand = serde_json::from_str(json)?;
        Self::from_raw(raw, defaults)
    }

    fn from_raw(raw: RawCommand, defaults: &BridgeSettings) -> Result<Self, ArgumentError> {
        let link = raw.link.as_deref().map(str::parse::<DdeLink>).transpose()?;

        let server = raw
            .application
            .or(raw.server)
            .unwrap_or_else(|| defaults.application.clone());
        let topic = raw
            .topic
            .or_else(|| link.as_ref().map(|l| l.topic.clone()))
            .unwrap_or_else(|| defaults.topic.clone());
        let item = raw
            .item
            .or_else(|| link.map(|l| l.item))
            .filter(|name| !name.is_empty())
            .map(Item::new);

        let action_name = raw.action.ok_or(ArgumentError::MissingField("action"))?;
        let action = match action_name.as_str() {
            "check" => Action::Check,
            "read" => Action::Read {
                item: item.ok_or(ArgumentError::MissingField("item"))?,
            },
            "write" => {
                let item = item.ok_or(ArgumentError::MissingField("item"))?;
                let value = raw.value.ok_or(ArgumentError::MissingField("value"))?;
                Action::Write {
                    item,
                    value: value_to_text(value)?,
                }
            }
            "validate" => Action::Validate { item },
            _ => Action::Unknown(action_name),
        };

        Ok(Self {
            endpoint: ServerTopic::new(server, topic),
            action,
        })
    }
}

/// Textual form poked to the server: strings verbatim, numbers as written,
/// booleans as PLC-style `1`/`0`.
fn value_to_text(value: Value) -> Result<String, ArgumentError> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(if flag { "1" } else { "0" }.to_string()),
        Value::Null => Err(ArgumentError::MissingField("value")),
        Value::Array(_) | Value::Object(_) => Err(ArgumentError::InvalidField {
            field: "value",
            reason: "must be a string, number or boolean".to_string(),
        }),
    }
}
