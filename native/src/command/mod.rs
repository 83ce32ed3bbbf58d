// Command surface: JSON request in, JSON result out.

pub mod dispatcher;
pub mod request;
pub mod result;

pub use dispatcher::Dispatcher;
pub use request::{Action, ArgumentError, CommandRequest};
pub use result::CommandResult;
