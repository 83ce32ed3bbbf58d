// Connection manager: probe, then connect with bounded retries, handing out
// a scoped Conversation that releases its handles when closed or dropped.

use super::error::{BridgeError, ConnectionError, RequestError};
use super::handles::HandleGuard;
use super::probe::{probe, ProbeResult, ProbeSettings};
use crate::dde::{ConversationId, DdeError, DdeHost, ServerTopic};
use crate::timing::Clock;
use log::{debug, info, warn};
use std::num::NonZeroU32;
use std::time::Duration;

/// Server name used for the working instance, distinct from the probe's.
pub const CLIENT_SERVER_NAME: &str = "DDEClient";

pub const DEFAULT_MAX_RETRIES: NonZeroU32 = match NonZeroU32::new(3) {
    Some(n) => n,
    None => unreachable!(),
};
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connect attempts, including the first.
    pub max_retries: NonZeroU32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Live conversation with a DDE endpoint.
///
/// Only obtainable from [`ConnectionManager::connect`]; `close` consumes it,
/// and dropping it closes it as well.
pub struct Conversation<'h, H: DdeHost> {
    handles: HandleGuard<'h, H>,
    id: ConversationId,
    endpoint: ServerTopic,
}

impl<'h, H: DdeHost> Conversation<'h, H> {
    pub fn endpoint(&self) -> &ServerTopic {
        &self.endpoint
    }

    pub(crate) fn id(&self) -> ConversationId {
        self.id
    }

    pub(crate) fn host(&self) -> &'h H {
        self.handles.host()
    }

    /// Destroy the conversation, then its server. Cleanup errors are swallowed.
    pub fn close(mut self) {
        debug!("[BRIDGE] Closing conversation with {}", self.endpoint);
        self.handles.release();
    }
}

pub struct ConnectionManager<'h, H: DdeHost, C: Clock> {
    host: &'h H,
    clock: &'h C,
    probe: ProbeSettings,
    retry: RetryPolicy,
}

impl<'h, H: DdeHost, C: Clock> ConnectionManager<'h, H, C> {
    pub fn new(host: &'h H, clock: &'h C, probe: ProbeSettings, retry: RetryPolicy) -> Self {
        Self {
            host,
            clock,
            probe,
            retry,
        }
    }

    /// Run the availability probe alone.
    pub fn check(&self, endpoint: &ServerTopic) -> ProbeResult {
        probe(self.host, self.clock, endpoint, &self.probe)
    }

    /// Establish a conversation with `endpoint`.
    ///
    /// # Errors
    ///
    /// * `ServerUnavailable` when the probe fails; no real connect is attempted.
    /// * `RetriesExhausted` when every attempt failed with a DDE error.
    /// * `Unexpected` for any other failure, without further retries.
    ///
    /// Partially created handles are destroyed before an error is returned.
    pub fn connect(
        &self,
        endpoint: &ServerTopic,
    ) -> Result<Conversation<'h, H>, ConnectionError> {
        if let ProbeResult::Unavailable(failure) = self.check(endpoint) {
            warn!("[BRIDGE] {} failed availability check", endpoint);
            return Err(ConnectionError::ServerUnavailable(failure));
        }

        let mut handles = HandleGuard::new(self.host, "client");
        let id = self
            .open(&mut handles, endpoint)
            .map_err(|e| ConnectionError::Unexpected(e.message))?;

        self.connect_with_retries(id, endpoint)?;
        info!("[BRIDGE] Connected to {}", endpoint);

        Ok(Conversation {
            handles,
            id,
            endpoint: endpoint.clone(),
        })
    }

    /// Connect, run `work` on the conversation, and always close it afterwards.
    pub fn with_conversation<T, F>(
        &self,
        endpoint: &ServerTopic,
        work: F,
    ) -> Result<T, BridgeError>
    where
        F: FnOnce(&Conversation<'h, H>) -> Result<T, RequestError>,
    {
        let conversation = self.connect(endpoint)?;
        let result = work(&conversation);
        conversation.close();
        Ok(result?)
    }

    fn open(
        &self,
        handles: &mut HandleGuard<'h, H>,
        endpoint: &ServerTopic,
    ) -> Result<ConversationId, DdeError> {
        self.host.init_message_loop()?;

        let server = self.host.create_server(CLIENT_SERVER_NAME)?;
        handles.set_server(server);
        let id = self.host.create_conversation(server)?;
        handles.set_conversation(id);

        debug!("[BRIDGE] Client handles ready for {}", endpoint);
        Ok(id)
    }

    fn connect_with_retries(
        &self,
        id: ConversationId,
        endpoint: &ServerTopic,
    ) -> Result<(), ConnectionError> {
        let attempts = self.retry.max_retries.get();
        let mut attempt = 1;

        loop {
            let err = match self.host.connect(id, endpoint) {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_connection() => {
                    return Err(ConnectionError::Unexpected(e.message));
                }
                Err(e) => e,
            };

            if attempt == attempts {
                return Err(ConnectionError::RetriesExhausted {
                    last_error: err.message,
                    attempts,
                });
            }

            debug!(
                "[BRIDGE] Connect attempt {}/{} failed: {}",
                attempt, attempts, err
            );
            self.clock.sleep(self.retry.retry_delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::probe::PROBE_SERVER_NAME;
    use crate::dde::{DdeValue, MemoryHost};
    use crate::timing::ManualClock;

    fn endpoint() -> ServerTopic {
        ServerTopic::new("RSLinx", "ExcelLink")
    }

    fn host() -> MemoryHost {
        MemoryHost::new().with_endpoint(endpoint(), [("Tag", DdeValue::Text("5".into()))])
    }

    fn retry(n: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries: NonZeroU32::new(n).unwrap(),
            retry_delay: Duration::from_secs(1),
        }
    }

    #[test]
    fn connect_and_close_leaves_no_handles() {
        let host = host();
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(3));

        let conversation = manager.connect(&endpoint()).unwrap();
        assert_eq!(conversation.endpoint(), &endpoint());
        assert_eq!(host.open_conversations(), 1);

        conversation.close();
        assert_eq!(host.open_servers(), 0);
        assert_eq!(host.open_conversations(), 0);
        assert_eq!(
            host.servers_created(),
            vec![PROBE_SERVER_NAME.to_string(), CLIENT_SERVER_NAME.to_string()]
        );
    }

    #[test]
    fn dropping_conversation_closes_it() {
        let host = host();
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(3));

        drop(manager.connect(&endpoint()).unwrap());
        assert_eq!(host.open_servers(), 0);
    }

    #[test]
    fn exhausts_retries_with_n_attempts_and_n_minus_one_sleeps() {
        let host = host();
        host.fail_connects(CLIENT_SERVER_NAME, DdeError::connection("busy"));
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(4));

        let err = manager.connect(&endpoint()).err().unwrap();

        assert_eq!(
            err,
            ConnectionError::RetriesExhausted {
                last_error: "busy".to_string(),
                attempts: 4
            }
        );
        assert_eq!(host.connect_attempts(CLIENT_SERVER_NAME), 4);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 3]);
        assert_eq!(host.open_servers(), 0);
        assert_eq!(host.open_conversations(), 0);
    }

    #[test]
    fn recovers_within_retry_budget() {
        let host = host();
        host.fail_next_connects(CLIENT_SERVER_NAME, 2, DdeError::connection("busy"));
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(3));

        let conversation = manager.connect(&endpoint()).unwrap();
        assert_eq!(host.connect_attempts(CLIENT_SERVER_NAME), 3);
        conversation.close();
    }

    #[test]
    fn unexpected_error_stops_retrying() {
        let host = host();
        host.fail_connects(CLIENT_SERVER_NAME, DdeError::other("bad handle"));
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(3));

        let err = manager.connect(&endpoint()).err().unwrap();

        assert_eq!(err, ConnectionError::Unexpected("bad handle".to_string()));
        assert_eq!(host.connect_attempts(CLIENT_SERVER_NAME), 1);
        assert!(clock.sleeps().is_empty());
        assert_eq!(host.open_servers(), 0);
    }

    #[test]
    fn unavailable_server_skips_real_connect() {
        let host = MemoryHost::new();
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(3));

        let err = manager.connect(&endpoint()).err().unwrap();

        assert!(matches!(err, ConnectionError::ServerUnavailable(_)));
        assert!(err.to_string().starts_with("DDE Server not available: {"));
        assert_eq!(host.connect_attempts(CLIENT_SERVER_NAME), 0);
        assert_eq!(host.servers_created(), vec![PROBE_SERVER_NAME.to_string()]);
    }

    #[test]
    fn message_loop_init_is_repeatable() {
        let host = host();
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(1));

        manager.connect(&endpoint()).unwrap().close();
        manager.connect(&endpoint()).unwrap().close();
        assert_eq!(host.message_loop_inits(), 4);
        assert_eq!(host.open_servers(), 0);
    }

    #[test]
    fn with_conversation_closes_after_request_error() {
        let host = host();
        let clock = ManualClock::new();
        let manager = ConnectionManager::new(&host, &clock, ProbeSettings::default(), retry(3));

        let result: Result<(), BridgeError> = manager.with_conversation(&endpoint(), |_| {
            Err(RequestError::Unexpected("boom".to_string()))
        });

        assert_eq!(
            result,
            Err(BridgeError::Request(RequestError::Unexpected("boom".to_string())))
        );
        assert_eq!(host.open_servers(), 0);
        assert_eq!(host.open_conversations(), 0);
    }
}
