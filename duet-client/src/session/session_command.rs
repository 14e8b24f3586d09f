use crate::error::SessionResult;
use crate::session::session_event::SessionSnapshot;
use duet_core::{MediaKind, TakeId};
use tokio::sync::oneshot;

/// Requests from a [`SessionHandle`](crate::session::SessionHandle) to the
/// session loop.
#[derive(Debug)]
pub enum SessionCommand {
    Toggle {
        kind: MediaKind,
        reply: oneshot::Sender<bool>,
    },

    StartScreenShare {
        reply: oneshot::Sender<SessionResult<()>>,
    },

    StopScreenShare {
        reply: oneshot::Sender<SessionResult<bool>>,
    },

    StartRecording {
        reply: oneshot::Sender<SessionResult<TakeId>>,
    },

    StopRecording {
        reply: oneshot::Sender<SessionResult<TakeId>>,
    },

    /// Acquires a camera or microphone the call started without.
    AddTrack {
        kind: MediaKind,
        device_id: Option<String>,
        reply: oneshot::Sender<SessionResult<()>>,
    },

    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },

    Leave {
        reply: oneshot::Sender<()>,
    },

    /// Ends the call for both participants.
    EndCall {
        reply: oneshot::Sender<()>,
    },
}
