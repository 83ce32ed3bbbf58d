// Scoped ownership of a server + conversation pair.

use crate::dde::{ConversationId, DdeHost, ServerId};
use log::{debug, warn};

/// Owns whatever part of a server/conversation pair has been created so far
/// and destroys it exactly once, on `release` or on drop.
///
/// Destruction errors are logged and swallowed.
pub(crate) struct HandleGuard<'h, H: DdeHost> {
    host: &'h H,
    label: &'static str,
    server: Option<ServerId>,
    conversation: Option<ConversationId>,
}

impl<'h, H: DdeHost> HandleGuard<'h, H> {
    pub(crate) fn new(host: &'h H, label: &'static str) -> Self {
        Self {
            host,
            label,
            server: None,
            conversation: None,
        }
    }

    pub(crate) fn host(&self) -> &'h H {
        self.host
    }

    pub(crate) fn set_server(&mut self, server: ServerId) {
        self.server = Some(server);
    }

    pub(crate) fn set_conversation(&mut self, conversation: ConversationId) {
        self.conversation = Some(conversation);
    }

    /// Destroy the conversation, then the server. Safe to call repeatedly.
    pub(crate) fn release(&mut self) {
        if let Some(conversation) = self.conversation.take() {
            if let Err(e) = self.host.destroy_conversation(conversation) {
                warn!(
                    "[DDE] {} conversation cleanup failed (ignored): {}",
                    self.label, e
                );
            }
        }

        if let Some(server) = self.server.take() {
            if let Err(e) = self.host.destroy_server(server) {
                warn!("[DDE] {} server cleanup failed (ignored): {}", self.label, e);
            } else {
                debug!("[DDE] {} handles released", self.label);
            }
        }
    }
}

impl<H: DdeHost> Drop for HandleGuard<'_, H> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dde::{DdeError, MemoryHost};

    #[test]
    fn drop_releases_partial_pair() {
        let host = MemoryHost::new();
        {
            let mut guard = HandleGuard::new(&host, "test");
            guard.set_server(host.create_server("DDETest").unwrap());
            assert_eq!(host.open_servers(), 1);
        }
        assert_eq!(host.open_servers(), 0);
    }

    #[test]
    fn release_twice_is_absorbed() {
        let host = MemoryHost::new();
        let mut guard = HandleGuard::new(&host, "test");
        let server = host.create_server("DDEClient").unwrap();
        guard.set_server(server);
        guard.set_conversation(host.create_conversation(server).unwrap());

        guard.release();
        guard.release();
        assert_eq!(host.open_servers(), 0);
        assert_eq!(host.open_conversations(), 0);
    }

    #[test]
    fn destroy_errors_are_swallowed() {
        let host = MemoryHost::new();
        host.fail_destroys(DdeError::connection("server died"));

        let mut guard = HandleGuard::new(&host, "test");
        let server = host.create_server("DDEClient").unwrap();
        guard.set_server(server);
        guard.set_conversation(host.create_conversation(server).unwrap());
        guard.release();

        assert_eq!(host.open_servers(), 0);
        assert_eq!(host.open_conversations(), 0);
    }
}
