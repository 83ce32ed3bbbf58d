// Single request/poke operations on an already-connected conversation.
// No reconnects or retries happen here.

use super::connection::Conversation;
use super::error::RequestError;
use crate::dde::{DdeError, DdeHost, DdeValue, Item};
use log::debug;

/// Request `item` and return the server's value untouched.
///
/// # Errors
///
/// `Protocol` for DDE errors (with endpoint and item context), `Unexpected`
/// for anything else.
pub fn read<H: DdeHost>(
    conversation: &Conversation<'_, H>,
    item: &Item,
) -> Result<DdeValue, RequestError> {
    debug!("[BRIDGE] Request {} from {}", item, conversation.endpoint());
    conversation
        .host()
        .request(conversation.id(), item)
        .map_err(|e| classify(e, conversation, item))
}

/// Poke `value` (as text) into `item`.
///
/// # Errors
///
/// Same taxonomy as [`read`].
pub fn write<H: DdeHost>(
    conversation: &Conversation<'_, H>,
    item: &Item,
    value: &str,
) -> Result<(), RequestError> {
    debug!("[BRIDGE] Poke {} = {:?} on {}", item, value, conversation.endpoint());
    conversation
        .host()
        .poke(conversation.id(), item, value)
        .map_err(|e| classify(e, conversation, item))
}

/// Confirm the conversation answers requests by reading `test_item`.
///
/// The value read is discarded.
pub fn validate<H: DdeHost>(
    conversation: &Conversation<'_, H>,
    test_item: &Item,
) -> Result<(), RequestError> {
    read(conversation, test_item).map(|_| ())
}

fn classify<H: DdeHost>(
    error: DdeError,
    conversation: &Conversation<'_, H>,
    item: &Item,
) -> RequestError {
    if error.is_connection() {
        let endpoint = conversation.endpoint();
        RequestError::Protocol {
            message: error.message,
            server: endpoint.server().to_string(),
            topic: endpoint.topic().to_string(),
            item: item.name().to_string(),
        }
    } else {
        RequestError::Unexpected(error.message)
    }
}
