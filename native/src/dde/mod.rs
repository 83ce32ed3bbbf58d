// Host DDE capability: endpoint types, the backend trait and its implementations.
// Every backend reports failures as a typed DdeError so callers can tell
// "server not answering yet" apart from everything else.

pub mod link;
pub mod memory;

#[cfg(windows)]
pub mod ddeml;
#[cfg(not(windows))]
pub mod unsupported;

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use link::{DdeLink, LinkParseError};
pub use memory::MemoryHost;

#[cfg(windows)]
pub use ddeml::DdemlHost as PlatformHost;
#[cfg(not(windows))]
pub use unsupported::UnsupportedHost as PlatformHost;

/// Build the host for the current platform.
#[cfg(windows)]
pub fn platform_host(transaction_timeout: Duration) -> PlatformHost {
    ddeml::DdemlHost::new(transaction_timeout)
}

/// Build the host for the current platform.
#[cfg(not(windows))]
pub fn platform_host(_transaction_timeout: Duration) -> PlatformHost {
    unsupported::UnsupportedHost::new()
}

/// Logical DDE endpoint: a server (application) name plus a topic.
///
/// Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerTopic {
    server: String,
    topic: String,
}

impl ServerTopic {
    pub fn new(server: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            topic: topic.into(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for ServerTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.server, self.topic)
    }
}

/// Opaque tag name exposed by a DDE server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Item(String);

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side instance created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(pub u64);

/// Conversation slot created by a backend; connected separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(pub u64);

/// Raw value returned by a request, passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl DdeValue {
    /// Build a value from raw bytes, keeping text when it is valid UTF-8.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => DdeValue::Text(text),
            Err(e) => DdeValue::Binary(e.into_bytes()),
        }
    }
}

impl Serialize for DdeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DdeValue::Text(text) => serializer.serialize_str(text),
            DdeValue::Binary(bytes) => bytes.serialize(serializer),
        }
    }
}

/// Error class reported by a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdeErrorKind {
    /// Raised by the DDE library itself (no server, refused, timed out...).
    Connection,
    /// Anything outside the DDE library error class.
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DdeError {
    pub kind: DdeErrorKind,
    pub message: String,
}

impl DdeError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            kind: DdeErrorKind::Connection,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: DdeErrorKind::Other,
            message: message.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind == DdeErrorKind::Connection
    }
}

/// Platform DDE messaging capability.
///
/// Methods take `&self`: a host is used from a single thread and keeps its
/// bookkeeping behind interior mutability.
pub trait DdeHost {
    /// Make sure the calling thread can pump DDE messages. Safe to repeat.
    fn init_message_loop(&self) -> Result<(), DdeError>;

    fn create_server(&self, name: &str) -> Result<ServerId, DdeError>;

    fn destroy_server(&self, server: ServerId) -> Result<(), DdeError>;

    fn create_conversation(&self, server: ServerId) -> Result<ConversationId, DdeError>;

    fn destroy_conversation(&self, conversation: ConversationId) -> Result<(), DdeError>;

    fn connect(&self, conversation: ConversationId, endpoint: &ServerTopic)
        -> Result<(), DdeError>;

    fn request(&self, conversation: ConversationId, item: &Item) -> Result<DdeValue, DdeError>;

    fn poke(&self, conversation: ConversationId, item: &Item, value: &str)
        -> Result<(), DdeError>;
}

impl<H: DdeHost + ?Sized> DdeHost for &H {
    fn init_message_loop(&self) -> Result<(), DdeError> {
        (**self).init_message_loop()
    }

    fn create_server(&self, name: &str) -> Result<ServerId, DdeError> {
        (**self).create_server(name)
    }

    fn destroy_server(&self, server: ServerId) -> Result<(), DdeError> {
        (**self).destroy_server(server)
    }

    fn create_conversation(&self, server: ServerId) -> Result<ConversationId, DdeError> {
        (**self).create_conversation(server)
    }

    fn destroy_conversation(&self, conversation: ConversationId) -> Result<(), DdeError> {
        (**self).destroy_conversation(conversation)
    }

    fn connect(
        &self,
        conversation: ConversationId,
        endpoint: &ServerTopic,
    ) -> Result<(), DdeError> {
        (**self).connect(conversation, endpoint)
    }

    fn request(&self, conversation: ConversationId, item: &Item) -> Result<DdeValue, DdeError> {
        (**self).request(conversation, item)
    }

    fn poke(
        &self,
        conversation: ConversationId,
        item: &Item,
        value: &str,
    ) -> Result<(), DdeError> {
        (**self).poke(conversation, item, value)
    }
}
