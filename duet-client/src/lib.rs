//! Client side of a two-person call: device capture, perfect-negotiation
//! signaling over a WebSocket relay, and chunked recording uploads.
//!
//! Start with [`session::CallSession::join`]; the returned
//! [`session::SessionHandle`] drives the call from any task.

pub mod api;
pub mod capture;
pub mod config;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod recording;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::ClientConfig;
pub use error::{SessionError, SessionResult};
pub use session::{CallEndReason, CallSession, SessionContext, SessionEvent, SessionHandle};
