use crate::media::RemoteMediaState;
use crate::negotiation::{ConnectionState, NegotiationRole};
use crate::recording::RecordingOrigin;
use duet_core::{MediaAnnouncement, MediaKind, ParticipantId, RoomId, TakeId};

/// Why a session finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEndReason {
    /// The local participant left.
    Left,
    /// The local participant ended the call for everyone.
    Ended,
    /// The relay reported that the call was ended.
    EndedRemotely,
    /// The relay refused the join.
    JoinRejected(String),
    /// The peer link went `disconnected` or `failed`.
    LinkLost(ConnectionState),
    /// The relay could not be reached again.
    SignalingLost,
}

/// What the session reports to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RemoteJoined {
        participant_id: ParticipantId,
        role: NegotiationRole,
    },
    RemoteLeft {
        participant_id: ParticipantId,
    },
    Connected,
    RemoteTrack {
        kind: MediaKind,
    },
    LocalMedia(MediaAnnouncement),
    RemoteMedia(RemoteMediaState),
    /// The display source ended by itself and the camera is back.
    ScreenShareEnded,
    RecordingStarted {
        take_id: TakeId,
        origin: RecordingOrigin,
    },
    RecordingStopped {
        take_id: TakeId,
    },
    SignalingDisconnected,
    SignalingReconnected,
    CallEnded(CallEndReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub room_id: RoomId,
    pub local_id: ParticipantId,
    pub remote_id: Option<ParticipantId>,
    pub participants: Vec<ParticipantId>,
    pub connection_state: ConnectionState,
    pub role: Option<NegotiationRole>,
    pub local_media: MediaAnnouncement,
    pub remote_media: RemoteMediaState,
    pub has_remote_stream: bool,
    pub sender_track_ids: Vec<(MediaKind, String)>,
    pub recording: Option<TakeId>,
}
