use crate::api::TakeProvider;
use crate::config::RecordingConfig;
use crate::error::RecordingError;
use crate::media::MediaStream;
use crate::recording::recorder::ChunkRecorder;
use crate::recording::upload_queue::UploadQueue;
use crate::signaling::SignalingOutput;
use duet_core::{MediaKind, RoomId, SignalEvent, TakeId};
use std::sync::Arc;
use tracing::{info, warn};

/// Who started the recording in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingOrigin {
    Local,
    /// Started because the remote participant began recording the same take.
    Remote,
}

struct ActiveRecording {
    take_id: TakeId,
    origin: RecordingOrigin,
    recorders: Vec<ChunkRecorder>,
}

pub struct RecordingPipeline {
    room_id: RoomId,
    takes: Arc<dyn TakeProvider>,
    signaling: Arc<dyn SignalingOutput>,
    queue: UploadQueue,
    config: RecordingConfig,
    active: Option<ActiveRecording>,
}

impl RecordingPipeline {
    pub fn new(
        room_id: RoomId,
        takes: Arc<dyn TakeProvider>,
        signaling: Arc<dyn SignalingOutput>,
        queue: UploadQueue,
        config: RecordingConfig,
    ) -> Self {
        Self {
            room_id,
            takes,
            signaling,
            queue,
            config,
            active: None,
        }
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_take(&self) -> Option<&TakeId> {
        self.active.as_ref().map(|a| &a.take_id)
    }

    pub fn origin(&self) -> Option<RecordingOrigin> {
        self.active.as_ref().map(|a| a.origin)
    }

    pub fn follows_remote(&self) -> bool {
        self.config.follow_remote_recording
    }

    /// Creates a take, tells the remote side about it and starts recording
    /// both local tracks into it.
    pub async fn start(&mut self, stream: &MediaStream) -> Result<TakeId, RecordingError> {
        if let Some(active) = &self.active {
            return Err(RecordingError::AlreadyRecording(active.take_id.clone()));
        }
        Self::check_tracks(stream)?;

        let take_id = self
            .takes
            .create_take(&self.room_id)
            .await
            .map_err(RecordingError::Take)?;
        info!("Created take {} for room {}", take_id, self.room_id);

        self.announce(SignalEvent::StartRecording {
            room_id: self.room_id.clone(),
            take_id: Some(take_id.clone()),
        })
        .await;

        self.begin(stream, take_id.clone(), RecordingOrigin::Local);
        Ok(take_id)
    }

    /// Records into a take the remote participant created. Nothing is
    /// announced back.
    pub fn join_take(&mut self, stream: &MediaStream, take_id: TakeId) -> Result<(), RecordingError> {
        if let Some(active) = &self.active {
            return Err(RecordingError::AlreadyRecording(active.take_id.clone()));
        }
        Self::check_tracks(stream)?;

        info!("Following remote recording into take {}", take_id);
        self.begin(stream, take_id, RecordingOrigin::Remote);
        Ok(())
    }

    /// Stops both recorders; their final chunks are queued before this returns.
    /// Only a locally started recording announces `stop-recording`.
    pub async fn stop(&mut self) -> Result<TakeId, RecordingError> {
        let mut active = self.active.take().ok_or(RecordingError::NotRecording)?;

        let mut chunks = 0;
        for recorder in &mut active.recorders {
            chunks += recorder.stop().await;
        }
        info!(
            "Recording of take {} stopped, {} chunk(s) captured",
            active.take_id, chunks
        );

        if active.origin == RecordingOrigin::Local {
            self.announce(SignalEvent::StopRecording {
                room_id: self.room_id.clone(),
                take_id: Some(active.take_id.clone()),
            })
            .await;
        }
        Ok(active.take_id)
    }

    fn check_tracks(stream: &MediaStream) -> Result<(), RecordingError> {
        for kind in [MediaKind::Video, MediaKind::Audio] {
            if !stream.has(kind) {
                return Err(RecordingError::NoTrack(kind));
            }
        }
        Ok(())
    }

    fn begin(&mut self, stream: &MediaStream, take_id: TakeId, origin: RecordingOrigin) {
        let recorders = [MediaKind::Video, MediaKind::Audio]
            .into_iter()
            .filter_map(|kind| stream.first(kind))
            .map(|track| {
                ChunkRecorder::start(
                    track,
                    take_id.clone(),
                    self.config.timeslice,
                    self.queue.clone(),
                )
            })
            .collect();

        self.active = Some(ActiveRecording {
            take_id,
            origin,
            recorders,
        });
    }

    async fn announce(&self, event: SignalEvent) {
        let name = event.name();
        if let Err(e) = self.signaling.send(event).await {
            warn!("Could not announce {}: {}", name, e);
        }
    }
}
