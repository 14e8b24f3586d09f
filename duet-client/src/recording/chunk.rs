use bytes::Bytes;
use duet_core::{MediaKind, ParticipantId, RoomId, TakeId};

/// One recorded slice waiting for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkTask {
    pub payload: Bytes,
    pub kind: MediaKind,
    pub take_id: TakeId,
    /// Position within the recorder of `kind`, starting at zero.
    pub sequence_index: u32,
    pub retry_count: u32,
}

impl ChunkTask {
    pub fn new(payload: Bytes, kind: MediaKind, take_id: TakeId, sequence_index: u32) -> Self {
        Self {
            payload,
            kind,
            take_id,
            sequence_index,
            retry_count: 0,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.webm", self.kind, self.sequence_index)
    }

    pub fn content_type(&self) -> &'static str {
        match self.kind {
            MediaKind::Video => "video/webm",
            MediaKind::Audio => "audio/webm",
        }
    }
}

/// Where a chunk ends up: `(room, take, participant, file name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDestination {
    pub room_id: RoomId,
    pub take_id: TakeId,
    pub participant_id: ParticipantId,
    pub file_name: String,
}

impl ChunkDestination {
    pub fn for_task(room_id: &RoomId, participant_id: &ParticipantId, task: &ChunkTask) -> Self {
        Self {
            room_id: room_id.clone(),
            take_id: task.take_id.clone(),
            participant_id: participant_id.clone(),
            file_name: task.file_name(),
        }
    }

    pub fn upload_path(&self) -> String {
        format!(
            "/api/upload/{}/{}/{}/{}",
            self.room_id, self.take_id, self.participant_id, self.file_name
        )
    }
}
