// In-process DDE simulator.
//
// Behaves like a stateful tag server reachable through the DdeHost trait:
// pokes are stored and returned by later requests. Faults can be scripted per
// server name so the probe ("DDETest") and the working connection
// ("DDEClient") can be driven independently.

use super::{ConversationId, DdeError, DdeHost, DdeValue, Item, ServerId, ServerTopic};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

#[derive(Debug)]
struct MemoryConversation {
    server: u64,
    connected: Option<ServerTopic>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    message_loop_ready: bool,
    message_loop_inits: u32,
    servers: HashMap<u64, String>,
    servers_created: Vec<String>,
    conversations: HashMap<u64, MemoryConversation>,
    endpoints: HashMap<ServerTopic, HashMap<String, DdeValue>>,
    connect_attempts: HashMap<String, u32>,
    scripted_connect_faults: HashMap<String, VecDeque<DdeError>>,
    connect_faults: HashMap<String, DdeError>,
    server_fault: Option<DdeError>,
    request_fault: Option<DdeError>,
    poke_fault: Option<DdeError>,
    destroy_fault: Option<DdeError>,
    requests: u32,
    pokes: u32,
}

impl MemoryState {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn connected_endpoint(&self, conversation: ConversationId) -> Result<ServerTopic, DdeError> {
        let entry = self
            .conversations
            .get(&conversation.0)
            .ok_or_else(|| DdeError::other(format!("Unknown conversation {}", conversation.0)))?;

        entry
            .connected
            .clone()
            .ok_or_else(|| DdeError::other("Conversation is not connected"))
    }
}

/// Stateful in-memory DDE server and client.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: RefCell<MemoryState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint that accepts connections, seeded with items.
    pub fn with_endpoint<I, K>(self, endpoint: ServerTopic, items: I) -> Self
    where
        I: IntoIterator<Item = (K, DdeValue)>,
        K: Into<String>,
    {
        let items = items.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.state.borrow_mut().endpoints.insert(endpoint, items);
        self
    }

    /// Change an item as the server side would, e.g. a PLC scan updating a tag.
    pub fn set_item(&self, endpoint: &ServerTopic, item: &str, value: DdeValue) {
        self.state
            .borrow_mut()
            .endpoints
            .entry(endpoint.clone())
            .or_default()
            .insert(item.to_string(), value);
    }

    pub fn item(&self, endpoint: &ServerTopic, item: &str) -> Option<DdeValue> {
        self.state
            .borrow()
            .endpoints
            .get(endpoint)
            .and_then(|items| items.get(item).cloned())
    }

    /// Fail the next `count` connects issued under `server_name` with `error`.
    pub fn fail_next_connects(&self, server_name: &str, count: usize, error: DdeError) {
        self.state
            .borrow_mut()
            .scripted_connect_faults
            .entry(server_name.to_string())
            .or_default()
            .extend(std::iter::repeat(error).take(count));
    }

    /// Fail every connect issued under `server_name` with `error`.
    pub fn fail_connects(&self, server_name: &str, error: DdeError) {
        self.state
            .borrow_mut()
            .connect_faults
            .insert(server_name.to_string(), error);
    }

    pub fn fail_server_creation(&self, error: DdeError) {
        self.state.borrow_mut().server_fault = Some(error);
    }

    pub fn fail_requests(&self, error: DdeError) {
        self.state.borrow_mut().request_fault = Some(error);
    }

    pub fn fail_pokes(&self, error: DdeError) {
        self.state.borrow_mut().poke_fault = Some(error);
    }

    /// Make destroy calls report `error` (the handle is still released).
    pub fn fail_destroys(&self, error: DdeError) {
        self.state.borrow_mut().destroy_fault = Some(error);
    }

    pub fn open_servers(&self) -> usize {
        self.state.borrow().servers.len()
    }

    pub fn open_conversations(&self) -> usize {
        self.state.borrow().conversations.len()
    }

    /// Total connect calls issued under `server_name`.
    pub fn connect_attempts(&self, server_name: &str) -> u32 {
        self.state
            .borrow()
            .connect_attempts
            .get(server_name)
            .copied()
            .unwrap_or(0)
    }

    /// Names of every server created so far, in creation order.
    pub fn servers_created(&self) -> Vec<String> {
        self.state.borrow().servers_created.clone()
    }

    pub fn message_loop_inits(&self) -> u32 {
        self.state.borrow().message_loop_inits
    }

    pub fn requests(&self) -> u32 {
        self.state.borrow().requests
    }

    pub fn pokes(&self) -> u32 {
        self.state.borrow().pokes
    }
}

impl DdeHost for MemoryHost {
    fn init_message_loop(&self) -> Result<(), DdeError> {
        let mut state = self.state.borrow_mut();
        state.message_loop_inits += 1;
        state.message_loop_ready = true;
        Ok(())
    }

    fn create_server(&self, name: &str) -> Result<ServerId, DdeError> {
        let mut state = self.state.borrow_mut();
        if let Some(error) = state.server_fault.clone() {
            return Err(error);
        }

        let id = state.allocate_id();
        state.servers.insert(id, name.to_string());
        state.servers_created.push(name.to_string());
        Ok(ServerId(id))
    }

    fn destroy_server(&self, server: ServerId) -> Result<(), DdeError> {
        let mut state = self.state.borrow_mut();
        if state.servers.remove(&server.0).is_none() {
            return Err(DdeError::other(format!("Unknown server {}", server.0)));
        }

        // Tearing down an instance drops whatever conversations it still owns.
        state.conversations.retain(|_, c| c.server != server.0);

        match state.destroy_fault.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn create_conversation(&self, server: ServerId) -> Result<ConversationId, DdeError> {
        let mut state = self.state.borrow_mut();
        if !state.servers.contains_key(&server.0) {
            return Err(DdeError::other(format!("Unknown server {}", server.0)));
        }

        let id = state.allocate_id();
        state.conversations.insert(
            id,
            MemoryConversation {
                server: server.0,
                connected: None,
            },
        );
        Ok(ConversationId(id))
    }

    fn destroy_conversation(&self, conversation: ConversationId) -> Result<(), DdeError> {
        let mut state = self.state.borrow_mut();
        if state.conversations.remove(&conversation.0).is_none() {
            return Err(DdeError::other(format!(
                "Unknown conversation {}",
                conversation.0
            )));
        }

        match state.destroy_fault.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn connect(
        &self,
        conversation: ConversationId,
        endpoint: &ServerTopic,
    ) -> Result<(), DdeError> {
        let mut state = self.state.borrow_mut();
        if !state.message_loop_ready {
            return Err(DdeError::other("Message loop not initialized"));
        }

        let server_name = {
            let entry = state.conversations.get(&conversation.0).ok_or_else(|| {
                DdeError::other(format!("Unknown conversation {}", conversation.0))
            })?;
            state
                .servers
                .get(&entry.server)
                .cloned()
                .unwrap_or_default()
        };

        *state
            .connect_attempts
            .entry(server_name.clone())
            .or_insert(0) += 1;

        if let Some(error) = state
            .scripted_connect_faults
            .get_mut(&server_name)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if let Some(error) = state.connect_faults.get(&server_name).cloned() {
            return Err(error);
        }
        if !state.endpoints.contains_key(endpoint) {
            return Err(DdeError::connection(format!(
                "ConnectTo failed: no server answered for {}",
                endpoint
            )));
        }

        if let Some(entry) = state.conversations.get_mut(&conversation.0) {
            entry.connected = Some(endpoint.clone());
        }
        Ok(())
    }

    fn request(&self, conversation: ConversationId, item: &Item) -> Result<DdeValue, DdeError> {
        let mut state = self.state.borrow_mut();
        let endpoint = state.connected_endpoint(conversation)?;
        state.requests += 1;

        if let Some(error) = state.request_fault.clone() {
            return Err(error);
        }

        state
            .endpoints
            .get(&endpoint)
            .and_then(|items| items.get(item.name()).cloned())
            .ok_or_else(|| DdeError::connection(format!("Request failed for item {}", item)))
    }

    fn poke(
        &self,
        conversation: ConversationId,
        item: &Item,
        value: &str,
    ) -> Result<(), DdeError> {
        let mut state = self.state.borrow_mut();
        let endpoint = state.connected_endpoint(conversation)?;
        state.pokes += 1;

        if let Some(error) = state.poke_fault.clone() {
            return Err(error);
        }

        state
            .endpoints
            .entry(endpoint)
            .or_default()
            .insert(item.name().to_string(), DdeValue::Text(value.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> ServerTopic {
        ServerTopic::new("RSLinx", "ExcelLink")
    }

    #[test]
    fn poke_then_request_returns_written_text() {
        let host = MemoryHost::new().with_endpoint(endpoint(), Vec::<(&str, DdeValue)>::new());
        host.init_message_loop().unwrap();
        let server = host.create_server("DDEClient").unwrap();
        let conv = host.create_conversation(server).unwrap();
        host.connect(conv, &endpoint()).unwrap();

        host.poke(conv, &Item::new("StepNumber"), "7").unwrap();
        assert_eq!(
            host.request(conv, &Item::new("StepNumber")).unwrap(),
            DdeValue::Text("7".to_string())
        );
    }

    #[test]
    fn scripted_faults_apply_per_server_name() {
        let host = MemoryHost::new().with_endpoint(endpoint(), Vec::<(&str, DdeValue)>::new());
        host.init_message_loop().unwrap();
        host.fail_next_connects("DDEClient", 1, DdeError::connection("busy"));

        let probe = host.create_server("DDETest").unwrap();
        let probe_conv = host.create_conversation(probe).unwrap();
        assert!(host.connect(probe_conv, &endpoint()).is_ok());

        let real = host.create_server("DDEClient").unwrap();
        let real_conv = host.create_conversation(real).unwrap();
        assert!(host.connect(real_conv, &endpoint()).is_err());
        assert!(host.connect(real_conv, &endpoint()).is_ok());
        assert_eq!(host.connect_attempts("DDEClient"), 2);
    }

    #[test]
    fn destroying_server_releases_its_conversations() {
        let host = MemoryHost::new();
        let server = host.create_server("DDEClient").unwrap();
        host.create_conversation(server).unwrap();
        assert_eq!(host.open_conversations(), 1);

        host.destroy_server(server).unwrap();
        assert_eq!(host.open_servers(), 0);
        assert_eq!(host.open_conversations(), 0);
        assert!(host.destroy_server(server).is_err());
    }

    #[test]
    fn connect_requires_message_loop() {
        let host = MemoryHost::new().with_endpoint(endpoint(), Vec::<(&str, DdeValue)>::new());
        let server = host.create_server("DDEClient").unwrap();
        let conv = host.create_conversation(server).unwrap();

        let err = host.connect(conv, &endpoint()).unwrap_err();
        assert!(!err.is_connection());
    }
}
