// Maps a parsed request onto the bridge and folds every outcome into a
// CommandResult. Nothing here fails: bridge errors become result payloads.

use super::request::{Action, CommandRequest};
use super::result::CommandResult;
use crate::bridge::{executor, ConnectionManager};
use crate::config::BridgeSettings;
use crate::dde::{DdeHost, Item};
use crate::timing::Clock;
use log::{debug, warn};

pub struct Dispatcher<'h, H: DdeHost, C: Clock> {
    manager: ConnectionManager<'h, H, C>,
    validation_item: Item,
}

impl<'h, H: DdeHost, C: Clock> Dispatcher<'h, H, C> {
    pub fn new(host: &'h H, clock: &'h C, settings: &BridgeSettings) -> Self {
        Self {
            manager: ConnectionManager::new(host, clock, settings.probe, settings.retry),
            validation_item: Item::new(settings.validation_item.clone()),
        }
    }

    pub fn dispatch(&self, request: &CommandRequest) -> CommandResult {
        let endpoint = &request.endpoint;
        debug!("[BRIDGE] {} on {}", request.action.name(), endpoint);

        match &request.action {
            Action::Check => {
                let result = self.manager.check(endpoint);
                CommandResult::Check {
                    available: result.is_available(),
                    message: result.message(),
                }
            }
            Action::Read { item } => {
                match self
                    .manager
                    .with_conversation(endpoint, |conv| executor::read(conv, item))
                {
                    Ok(value) => CommandResult::Read {
                        value: Some(value),
                        error: None,
                    },
                    Err(e) => {
                        warn!("[BRIDGE] Read of {} failed: {}", item, e);
                        CommandResult::Read {
                            value: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            Action::Write { item, value } => {
                match self
                    .manager
                    .with_conversation(endpoint, |conv| executor::write(conv, item, value))
                {
                    Ok(()) => CommandResult::Write {
                        success: true,
                        error: None,
                    },
                    Err(e) => {
                        warn!("[BRIDGE] Write of {} failed: {}", item, e);
                        CommandResult::Write {
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            Action::Validate { item } => {
                let item = item.as_ref().unwrap_or(&self.validation_item);
                match self
                    .manager
                    .with_conversation(endpoint, |conv| executor::validate(conv, item))
                {
                    Ok(()) => CommandResult::Validate {
                        valid: true,
                        error: None,
                    },
                    Err(e) => CommandResult::Validate {
                        valid: false,
                        error: Some(e.to_string()),
                    },
                }
            }
            Action::Unknown(name) => CommandResult::error(format!("Unknown action: {name}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::CLIENT_SERVER_NAME;
    use crate::dde::{DdeError, DdeValue, MemoryHost, ServerTopic};
    use crate::timing::ManualClock;
    use serde_json::json;

    fn endpoint() -> ServerTopic {
        ServerTopic::new("RSLinx", "ExcelLink")
    }

    fn host() -> MemoryHost {
        MemoryHost::new().with_endpoint(
            endpoint(),
            [
                ("_200_GLB.DintData[2]", DdeValue::Text("42".into())),
                ("DDETest", DdeValue::Text("1".into())),
            ],
        )
    }

    fn run(host: &MemoryHost, json: &str) -> serde_json::Value {
        let clock = ManualClock::new();
        let settings = BridgeSettings::default();
        let request = CommandRequest::from_json(json, &settings).unwrap();
        let result = Dispatcher::new(host, &clock, &settings).dispatch(&request);
        serde_json::from_str(&result.to_json().unwrap()).unwrap()
    }

    #[test]
    fn check_reports_availability() {
        let host = host();
        assert_eq!(
            run(&host, r#"{"action":"check"}"#),
            json!({"available": true, "message": "Connection successful"})
        );
        assert_eq!(host.open_servers(), 0);
    }

    #[test]
    fn check_against_unreachable_endpoint() {
        let host = host();
        let out = run(&host, r#"{"action":"check","application":"X","topic":"Y"}"#);
        assert_eq!(out["available"], json!(false));

        let diagnostic: serde_json::Value =
            serde_json::from_str(out["message"].as_str().unwrap()).unwrap();
        assert_eq!(diagnostic["attempted_server"], "X");
        assert_eq!(diagnostic["attempted_topic"], "Y");
        assert!(!diagnostic["last_error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn read_returns_value() {
        let host = host();
        assert_eq!(
            run(&host, r#"{"action":"read","item":"_200_GLB.DintData[2]"}"#),
            json!({"value": "42", "error": null})
        );
        assert_eq!(host.open_conversations(), 0);
    }

    #[test]
    fn read_error_carries_protocol_context() {
        let host = host();
        let out = run(&host, r#"{"action":"read","item":"Nope"}"#);
        assert_eq!(out["value"], json!(null));
        let error = out["error"].as_str().unwrap();
        assert!(error.starts_with("DDE Error: "));
        assert!(error.ends_with("Item: Nope"));
        assert_eq!(host.open_servers(), 0);
    }

    #[test]
    fn write_reports_success_and_stores_value() {
        let host = host();
        assert_eq!(
            run(&host, r#"{"action":"write","item":"Setpoint","value":12.5}"#),
            json!({"success": true, "error": null})
        );
        assert_eq!(host.item(&endpoint(), "Setpoint"), Some(DdeValue::Text("12.5".into())));
    }

    #[test]
    fn write_after_exhausted_retries() {
        let host = host();
        host.fail_connects(CLIENT_SERVER_NAME, DdeError::connection("busy"));
        assert_eq!(
            run(&host, r#"{"action":"write","item":"Tag","value":"x"}"#),
            json!({
                "success": false,
                "error": "Failed to connect after 3 attempts. Last error: busy"
            })
        );
        assert_eq!(host.pokes(), 0);
    }

    #[test]
    fn validate_uses_configured_item() {
        let host = host();
        assert_eq!(
            run(&host, r#"{"action":"validate"}"#),
            json!({"valid": true, "error": null})
        );
        assert_eq!(
            run(&host, r#"{"action":"validate","item":"Missing"}"#)["valid"],
            json!(false)
        );
    }

    #[test]
    fn unknown_action_touches_nothing() {
        let host = host();
        assert_eq!(
            run(&host, r#"{"action":"subscribe"}"#),
            json!({"error": "Unknown action: subscribe"})
        );
        assert!(host.servers_created().is_empty());
        assert_eq!(host.message_loop_inits(), 0);
    }
}
