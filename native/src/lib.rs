pub mod bridge;
pub mod cli;
pub mod command;
pub mod config;
pub mod dde;
pub mod logging;
pub mod timing;

// Re-export the types a caller needs to drive the bridge directly.
pub use bridge::{
    BridgeError, ConnectionError, ConnectionManager, Conversation, DiagnosticInfo, ProbeResult,
    ProbeSettings, RequestError, RetryPolicy,
};
pub use command::{Action, ArgumentError, CommandRequest, CommandResult, Dispatcher};
pub use config::{BridgeSettings, ConfigError};
pub use dde::{DdeError, DdeErrorKind, DdeHost, DdeValue, Item, MemoryHost, ServerTopic};
pub use timing::{Clock, ManualClock, SystemClock};

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
