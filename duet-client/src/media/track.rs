use anyhow::Result;
use bytes::Bytes;
use duet_core::MediaKind;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Stream id shared by every outgoing track, so the remote side sees one stream.
pub const LOCAL_STREAM_ID: &str = "duet-local";

const SAMPLE_TAP_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Camera,
    Microphone,
    Display,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    /// Stopped by this process.
    Stopped,
    /// The source went away on its own (device unplugged, sharing stopped from the system UI).
    Ended,
}

/// A locally captured track.
///
/// `enabled` is a soft mute: the hardware keeps running, samples are simply
/// not forwarded. Stopping is final.
pub struct LocalTrack {
    id: String,
    kind: MediaKind,
    source: TrackSource,
    label: String,
    device_id: Option<String>,
    enabled: AtomicBool,
    state: watch::Sender<TrackState>,
    taps: broadcast::Sender<Bytes>,
    rtp: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    pub fn new(
        kind: MediaKind,
        source: TrackSource,
        label: impl Into<String>,
        device_id: Option<String>,
    ) -> Arc<Self> {
        let id = Uuid::new_v4().to_string();
        let codec = match kind {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };
        let rtp = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            LOCAL_STREAM_ID.to_owned(),
        ));
        let (state, _) = watch::channel(TrackState::Live);
        let (taps, _) = broadcast::channel(SAMPLE_TAP_CAPACITY);

        Arc::new(Self {
            id,
            kind,
            source,
            label: label.into(),
            device_id,
            enabled: AtomicBool::new(true),
            state,
            taps,
            rtp,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn source(&self) -> TrackSource {
        self.source
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn state(&self) -> TrackState {
        *self.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Releases the underlying capture. Does not count as the source ending.
    pub fn stop(&self) {
        self.finish(TrackState::Stopped);
    }

    /// Called by capture backends when the source disappears.
    pub fn end(&self) {
        self.finish(TrackState::Ended);
    }

    fn finish(&self, next: TrackState) {
        self.state.send_if_modified(|state| {
            if *state != TrackState::Live {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Resolves once the track is no longer live and reports how it finished.
    pub async fn finished(&self) -> TrackState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| *state != TrackState::Live).await {
            Ok(state) => *state,
            Err(_) => TrackState::Stopped,
        }
    }

    /// Pushes one encoded sample to the peer link and to any recorder taps.
    ///
    /// Disabled or finished tracks drop the sample.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<()> {
        if !self.is_live() || !self.is_enabled() {
            return Ok(());
        }

        let _ = self.taps.send(data.clone());

        self.rtp
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<Bytes> {
        self.taps.subscribe()
    }

    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        self.rtp.clone()
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("state", &self.state())
            .finish()
    }
}

/// An ordered set of local tracks.
#[derive(Debug, Clone, Default)]
pub struct MediaStream {
    tracks: Vec<Arc<LocalTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn tracks_of(&self, kind: MediaKind) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.tracks.iter().filter(move |t| t.kind() == kind)
    }

    pub fn first(&self, kind: MediaKind) -> Option<Arc<LocalTrack>> {
        self.tracks_of(kind).next().cloned()
    }

    pub fn has(&self, kind: MediaKind) -> bool {
        self.tracks_of(kind).next().is_some()
    }

    pub fn push(&mut self, track: Arc<LocalTrack>) {
        self.tracks.push(track);
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}
