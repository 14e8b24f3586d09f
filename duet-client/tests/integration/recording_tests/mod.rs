
use std::sync::Arc;

use bytes::Bytes;
use duet_client::config::RecordingConfig;
use duet_client::recording::{ChunkTask, UploadQueue};
use duet_core::{MediaKind, ParticipantId, TakeId};

use crate::integration::room;
use crate::utils::ScriptedStorage;

/// Upload queue for alice in ROOM1 backed by `storage`.
pub fn queue_for(storage: &Arc<ScriptedStorage>) -> UploadQueue {
    UploadQueue::new(
        room(),
        ParticipantId::from("alice"),
        storage.clone(),
        &RecordingConfig::default(),
    )
}

pub fn chunk(kind: MediaKind, take: &str, index: u32) -> ChunkTask {
    ChunkTask::new(
        Bytes::from(vec![index as u8; 64]),
        kind,
        TakeId::from(take),
        index,
    )
}
