use crate::media::{LocalTrack, TrackState};
use crate::recording::chunk::ChunkTask;
use crate::recording::upload_queue::UploadQueue;
use bytes::{Bytes, BytesMut};
use duet_core::{MediaKind, TakeId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Slices one local track into timed chunks and appends them to the upload
/// queue.
///
/// A chunk is emitted every `timeslice`; empty slices are skipped. Stopping
/// flushes what has been captured since the last slice.
pub struct ChunkRecorder {
    kind: MediaKind,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<u32>>,
}

impl ChunkRecorder {
    pub fn start(
        track: Arc<LocalTrack>,
        take_id: TakeId,
        timeslice: Duration,
        queue: UploadQueue,
    ) -> Self {
        let kind = track.kind();
        let (stop_tx, stop_rx) = oneshot::channel();
        // Subscribe before spawning so no sample written after `start` is missed.
        let samples = track.subscribe_samples();
        let handle = tokio::spawn(Self::run(track, samples, take_id, timeslice, queue, stop_rx));
        Self {
            kind,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Stops recording and waits until the final chunk is queued. Returns how
    /// many chunks were produced.
    pub async fn stop(&mut self) -> u32 {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                warn!("{} recorder task failed: {}", self.kind, e);
                0
            }),
            None => 0,
        }
    }

    async fn run(
        track: Arc<LocalTrack>,
        mut samples: broadcast::Receiver<Bytes>,
        take_id: TakeId,
        timeslice: Duration,
        queue: UploadQueue,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> u32 {
        let kind = track.kind();
        let mut buffer = BytesMut::new();
        let mut next_index: u32 = 0;

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut flush = |buffer: &mut BytesMut| {
            if buffer.is_empty() {
                return;
            }
            let payload = buffer.split().freeze();
            debug!("{} chunk {} ready ({} bytes)", kind, next_index, payload.len());
            queue.append(ChunkTask::new(payload, kind, take_id.clone(), next_index));
            next_index += 1;
        };

        info!("Recording {} track {} into take {}", kind, track.id(), take_id);
        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => flush(&mut buffer),
                sample = samples.recv() => match sample {
                    Ok(data) => buffer.extend_from_slice(&data),
                    Err(RecvError::Lagged(n)) => {
                        warn!("{} recorder fell behind, {} sample(s) lost", kind, n);
                    }
                    Err(RecvError::Closed) => break,
                },
                state = track.finished() => {
                    if state == TrackState::Ended {
                        warn!("{} track ended while recording", kind);
                    }
                    break;
                }
            }
        }

        // Whatever is already buffered in the tap still belongs to this take.
        while let Ok(data) = samples.try_recv() {
            buffer.extend_from_slice(&data);
        }
        flush(&mut buffer);
        drop(flush);

        info!("Stopped {} recorder after {} chunk(s)", kind, next_index);
        next_index
    }
}
