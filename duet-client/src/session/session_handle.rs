use crate::error::{SessionError, SessionResult};
use crate::negotiation::ConnectionState;
use crate::recording::UploadQueue;
use crate::session::session_command::SessionCommand;
use crate::session::session_event::{SessionEvent, SessionSnapshot};
use duet_core::{MediaKind, ParticipantId, RoomId, TakeId};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Cheap, cloneable front of a running [`CallSession`](crate::session::CallSession).
#[derive(Clone)]
pub struct SessionHandle {
    room_id: RoomId,
    local_id: ParticipantId,
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
    state: watch::Receiver<ConnectionState>,
    uploads: UploadQueue,
}

impl SessionHandle {
    pub(crate) fn new(
        room_id: RoomId,
        local_id: ParticipantId,
        commands: mpsc::Sender<SessionCommand>,
        events: broadcast::Sender<SessionEvent>,
        state: watch::Receiver<ConnectionState>,
        uploads: UploadQueue,
    ) -> Self {
        Self {
            room_id,
            local_id,
            commands,
            events,
            state,
            uploads,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Uploads keep draining after the session ends.
    pub fn uploads(&self) -> &UploadQueue {
        &self.uploads
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Waits until the session loop has exited.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }

    pub async fn toggle(&self, kind: MediaKind) -> SessionResult<bool> {
        self.request(|reply| SessionCommand::Toggle { kind, reply })
            .await
    }

    pub async fn toggle_audio(&self) -> SessionResult<bool> {
        self.toggle(MediaKind::Audio).await
    }

    pub async fn toggle_video(&self) -> SessionResult<bool> {
        self.toggle(MediaKind::Video).await
    }

    pub async fn start_screen_share(&self) -> SessionResult<()> {
        self.request(|reply| SessionCommand::StartScreenShare { reply })
            .await?
    }

    pub async fn stop_screen_share(&self) -> SessionResult<bool> {
        self.request(|reply| SessionCommand::StopScreenShare { reply })
            .await?
    }

    pub async fn start_recording(&self) -> SessionResult<TakeId> {
        self.request(|reply| SessionCommand::StartRecording { reply })
            .await?
    }

    pub async fn stop_recording(&self) -> SessionResult<TakeId> {
        self.request(|reply| SessionCommand::StopRecording { reply })
            .await?
    }

    pub async fn add_track(&self, kind: MediaKind, device_id: Option<String>) -> SessionResult<()> {
        self.request(|reply| SessionCommand::AddTrack {
            kind,
            device_id,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    /// Leaves the room. Tracks are stopped and the link is closed when this
    /// returns. Leaving a finished session is a no-op.
    pub async fn leave(&self) {
        let _ = self.request(|reply| SessionCommand::Leave { reply }).await;
    }

    pub async fn end_call(&self) {
        let _ = self
            .request(|reply| SessionCommand::EndCall { reply })
            .await;
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}
