use crate::model::media::MediaAnnouncement;
use crate::model::peer::ParticipantId;
use crate::model::room::{RoomId, TakeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// `{type, sdp}` pair, the same shape a browser produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Every message exchanged with the relay server.
///
/// Frames look like `{"event": "offer", "data": {"roomId": "R1", ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum SignalEvent {
    JoinRoom {
        room_id: RoomId,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    UserJoined {
        users: Vec<ParticipantId>,
        user_id: ParticipantId,
    },
    UserLeft {
        user_id: ParticipantId,
    },
    JoinError {
        error: String,
    },
    Offer {
        room_id: RoomId,
        sdp: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_user_id: Option<ParticipantId>,
    },
    Answer {
        room_id: RoomId,
        sdp: SessionDescription,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_user_id: Option<ParticipantId>,
    },
    IceCandidate {
        room_id: RoomId,
        candidate: IceCandidate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<ParticipantId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_user_id: Option<ParticipantId>,
    },
    MediaStateChange {
        room_id: RoomId,
        media_state: MediaAnnouncement,
        user_id: ParticipantId,
    },
    StartRecording {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        take_id: Option<TakeId>,
    },
    StopRecording {
        room_id: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        take_id: Option<TakeId>,
    },
    EndCall {
        room_id: RoomId,
    },
    CallEnded {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },
}

impl SignalEvent {
    /// Wire name of the event, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            SignalEvent::JoinRoom { .. } => "join-room",
            SignalEvent::LeaveRoom { .. } => "leave-room",
            SignalEvent::UserJoined { .. } => "user-joined",
            SignalEvent::UserLeft { .. } => "user-left",
            SignalEvent::JoinError { .. } => "join-error",
            SignalEvent::Offer { .. } => "offer",
            SignalEvent::Answer { .. } => "answer",
            SignalEvent::IceCandidate { .. } => "ice-candidate",
            SignalEvent::MediaStateChange { .. } => "media-state-change",
            SignalEvent::StartRecording { .. } => "start-recording",
            SignalEvent::StopRecording { .. } => "stop-recording",
            SignalEvent::EndCall { .. } => "end-call",
            SignalEvent::CallEnded { .. } => "call-ended",
        }
    }
}
