//! One participant's view of a call, driven by a single actor task.

mod call_session;
mod session_command;
mod session_event;
mod session_handle;

pub use call_session::*;
pub use session_command::*;
pub use session_event::*;
pub use session_handle::*;
