// Fallback host for platforms without DDE.

use super::{ConversationId, DdeError, DdeHost, DdeValue, Item, ServerId, ServerTopic};

const UNSUPPORTED: &str = "DDE is only available on Windows hosts";

/// Host that refuses every server creation.
///
/// Checks report a generic failure and reads/writes report the server as
/// unavailable, the same shape a Windows box without the tag server produces.
#[derive(Debug, Default)]
pub struct UnsupportedHost;

impl UnsupportedHost {
    pub fn new() -> Self {
        Self
    }
}

impl DdeHost for UnsupportedHost {
    fn init_message_loop(&self) -> Result<(), DdeError> {
        Ok(())
    }

    fn create_server(&self, _name: &str) -> Result<ServerId, DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }

    fn destroy_server(&self, _server: ServerId) -> Result<(), DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }

    fn create_conversation(&self, _server: ServerId) -> Result<ConversationId, DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }

    fn destroy_conversation(&self, _conversation: ConversationId) -> Result<(), DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }

    fn connect(
        &self,
        _conversation: ConversationId,
        _endpoint: &ServerTopic,
    ) -> Result<(), DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }

    fn request(&self, _conversation: ConversationId, _item: &Item) -> Result<DdeValue, DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }

    fn poke(
        &self,
        _conversation: ConversationId,
        _item: &Item,
        _value: &str,
    ) -> Result<(), DdeError> {
        Err(DdeError::other(UNSUPPORTED))
    }
}
