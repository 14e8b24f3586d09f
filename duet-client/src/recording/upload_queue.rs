//! Single-flight FIFO upload of recorded chunks.
//!
//! Chunks of both kinds share one queue and go out strictly in the order they
//! were appended. At most one upload runs at a time. A chunk that fails
//! `max_attempts` times is dropped and reported; it is never retried later.

use crate::api::ChunkStorage;
use crate::config::{MAX_RETRY_BACKOFF, RecordingConfig};
use crate::error::UploadError;
use crate::recording::chunk::{ChunkDestination, ChunkTask};
use duet_core::{MediaKind, ParticipantId, RoomId, TakeId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    Uploaded {
        take_id: TakeId,
        kind: MediaKind,
        sequence_index: u32,
        attempts: u32,
    },
    Dropped {
        take_id: TakeId,
        kind: MediaKind,
        sequence_index: u32,
        error: String,
    },
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<ChunkTask>,
    uploading: bool,
}

struct Shared {
    room_id: RoomId,
    participant_id: ParticipantId,
    storage: Arc<dyn ChunkStorage>,
    max_attempts: u32,
    retry_backoff: Duration,
    // The FIFO and the single-flight flag change together under one lock.
    state: Mutex<QueueState>,
    idle: watch::Sender<bool>,
    events: broadcast::Sender<UploadEvent>,
    uploaded: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Clone)]
pub struct UploadQueue {
    shared: Arc<Shared>,
}

impl UploadQueue {
    pub fn new(
        room_id: RoomId,
        participant_id: ParticipantId,
        storage: Arc<dyn ChunkStorage>,
        config: &RecordingConfig,
    ) -> Self {
        let (idle, _) = watch::channel(true);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                room_id,
                participant_id,
                storage,
                max_attempts: config.max_upload_attempts.max(1),
                retry_backoff: config.retry_backoff,
                state: Mutex::new(QueueState::default()),
                idle,
                events,
                uploaded: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueues a chunk and starts the worker unless one is already running.
    pub fn append(&self, task: ChunkTask) {
        let start_worker = {
            let mut state = self.shared.state.lock();
            state.tasks.push_back(task);
            if state.uploading {
                false
            } else {
                state.uploading = true;
                self.shared.idle.send_replace(false);
                true
            }
        };

        if start_worker {
            tokio::spawn(Self::worker(self.shared.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_uploading(&self) -> bool {
        self.shared.state.lock().uploading
    }

    pub fn uploaded(&self) -> u64 {
        self.shared.uploaded.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.shared.events.subscribe()
    }

    /// Resolves once the queue is empty and no upload is in flight.
    pub async fn drained(&self) {
        let mut idle = self.shared.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    async fn worker(shared: Arc<Shared>) {
        loop {
            let task = {
                let mut state = shared.state.lock();
                match state.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        // Idle flips with `uploading` so a concurrent append
                        // cannot be overwritten by a stale `true`.
                        state.uploading = false;
                        shared.idle.send_replace(true);
                        break;
                    }
                }
            };
            Self::deliver(&shared, task).await;
        }

        debug!("Upload worker idle");
    }

    async fn deliver(shared: &Shared, mut task: ChunkTask) {
        let destination =
            ChunkDestination::for_task(&shared.room_id, &shared.participant_id, &task);
        let mut last_error = None;

        while task.retry_count < shared.max_attempts {
            let attempt = task.retry_count;
            task.retry_count += 1;

            match Self::upload_once(shared, &destination, &task).await {
                Ok(()) => {
                    info!(
                        "Chunk {} of take {} uploaded (attempt {})",
                        destination.file_name, task.take_id, task.retry_count
                    );
                    shared.uploaded.fetch_add(1, Ordering::SeqCst);
                    let _ = shared.events.send(UploadEvent::Uploaded {
                        take_id: task.take_id,
                        kind: task.kind,
                        sequence_index: task.sequence_index,
                        attempts: task.retry_count,
                    });
                    return;
                }
                Err(e) => {
                    warn!(
                        "Uploading chunk {} failed (attempt {}/{}): {}",
                        destination.file_name, task.retry_count, shared.max_attempts, e
                    );
                    last_error = Some(e);
                }
            }

            if task.retry_count < shared.max_attempts && !shared.retry_backoff.is_zero() {
                tokio::time::sleep(backoff(shared.retry_backoff, attempt)).await;
            }
        }

        warn!(
            "Dropping chunk {} of take {} after {} attempts",
            destination.file_name, task.take_id, shared.max_attempts
        );
        shared.dropped.fetch_add(1, Ordering::SeqCst);
        let _ = shared.events.send(UploadEvent::Dropped {
            take_id: task.take_id,
            kind: task.kind,
            sequence_index: task.sequence_index,
            error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        });
    }

    async fn upload_once(
        shared: &Shared,
        destination: &ChunkDestination,
        task: &ChunkTask,
    ) -> Result<(), UploadError> {
        let url = shared
            .storage
            .upload_target(destination)
            .await
            .map_err(UploadError::Target)?;
        shared
            .storage
            .put_chunk(&url, task.content_type(), task.payload.clone())
            .await
            .map_err(UploadError::Transfer)
    }
}

/// `base * 2^attempt`, capped.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
        .min(MAX_RETRY_BACKOFF)
}
