use crate::capture::CaptureBackend;
use crate::error::{NegotiationError, SessionResult};
use crate::media::{LocalTrack, MediaStream};
use crate::transport::PeerTransport;
use duet_core::{MediaAnnouncement, MediaKind, ParticipantId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Last media state announced by the remote participant. Display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMediaState {
    pub is_remote_camera_on: bool,
    pub is_remote_screen_sharing: bool,
}

impl Default for RemoteMediaState {
    fn default() -> Self {
        Self {
            is_remote_camera_on: true,
            is_remote_screen_sharing: false,
        }
    }
}

/// Mute, camera and screen share handling on top of an established link.
///
/// Nothing here renegotiates: toggles only flip `enabled`, screen share swaps
/// what the existing video sender transmits.
pub struct MediaController {
    backend: Arc<dyn CaptureBackend>,
    audio_enabled: bool,
    video_enabled: bool,
    display: Option<Arc<LocalTrack>>,
    remote: RemoteMediaState,
}

impl MediaController {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            audio_enabled: true,
            video_enabled: true,
            display: None,
            remote: RemoteMediaState::default(),
        }
    }

    /// Picks up the enabled flags the stream was opened with.
    pub fn sync_with(&mut self, stream: &MediaStream) {
        if let Some(track) = stream.first(MediaKind::Audio) {
            self.audio_enabled = track.is_enabled();
        }
        if let Some(track) = stream.first(MediaKind::Video) {
            self.video_enabled = track.is_enabled();
        }
    }

    pub fn announcement(&self) -> MediaAnnouncement {
        MediaAnnouncement {
            audio_enabled: self.audio_enabled,
            video_enabled: self.video_enabled,
            is_screen_sharing: self.is_screen_sharing(),
        }
    }

    pub fn is_enabled(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.audio_enabled,
            MediaKind::Video => self.video_enabled,
        }
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.display.is_some()
    }

    pub fn display_track(&self) -> Option<&Arc<LocalTrack>> {
        self.display.as_ref()
    }

    pub fn remote_state(&self) -> RemoteMediaState {
        self.remote
    }

    /// Flips `enabled` on every local track of `kind` and returns the new state.
    pub fn toggle(&mut self, stream: &MediaStream, kind: MediaKind) -> bool {
        let flag = match kind {
            MediaKind::Audio => &mut self.audio_enabled,
            MediaKind::Video => &mut self.video_enabled,
        };
        *flag = !*flag;
        let enabled = *flag;

        for track in stream.tracks_of(kind) {
            track.set_enabled(enabled);
        }
        info!("Local {} {}", kind, if enabled { "enabled" } else { "disabled" });
        enabled
    }

    /// Captures the display and puts it on the video sender in place of the
    /// camera. On failure nothing changes.
    pub async fn start_screen_share(
        &mut self,
        transport: Option<&dyn PeerTransport>,
    ) -> SessionResult<Arc<LocalTrack>> {
        if let Some(shared) = &self.display {
            return Ok(shared.clone());
        }
        let transport = transport.ok_or(NegotiationError::NoLink)?;

        let shared = self.backend.open_display().await?;
        if let Err(e) = transport
            .replace_track(MediaKind::Video, Some(shared.clone()))
            .await
        {
            shared.stop();
            return Err(NegotiationError::Transport(e).into());
        }

        info!("Screen share started with track {}", shared.id());
        self.display = Some(shared.clone());
        Ok(shared)
    }

    /// Puts the camera back on the video sender. Returns `false` when no share
    /// was active.
    pub async fn stop_screen_share(
        &mut self,
        stream: &MediaStream,
        transport: Option<&dyn PeerTransport>,
    ) -> SessionResult<bool> {
        let Some(shared) = self.display.take() else {
            return Ok(false);
        };
        shared.stop();

        if let Some(transport) = transport {
            let camera = stream.first(MediaKind::Video);
            transport
                .replace_track(MediaKind::Video, camera)
                .await
                .map_err(NegotiationError::Transport)?;
        }
        info!("Screen share stopped");
        Ok(true)
    }

    /// The display source ended outside our control (e.g. the system's
    /// "stop sharing" button). Reverts to the camera if that track is still
    /// the active share.
    pub async fn on_display_ended(
        &mut self,
        track_id: &str,
        stream: &MediaStream,
        transport: Option<&dyn PeerTransport>,
    ) -> SessionResult<bool> {
        let current = self.display.as_ref().is_some_and(|d| d.id() == track_id);
        if !current {
            return Ok(false);
        }
        debug!("Display track {} ended, reverting to camera", track_id);
        self.stop_screen_share(stream, transport).await
    }

    /// Mirrors a remote announcement. Echoes of our own id are ignored.
    pub fn on_remote_announcement(
        &mut self,
        local_id: &ParticipantId,
        from: &ParticipantId,
        announcement: MediaAnnouncement,
    ) -> bool {
        if from == local_id {
            return false;
        }
        self.remote = RemoteMediaState {
            is_remote_camera_on: announcement.video_enabled,
            is_remote_screen_sharing: announcement.is_screen_sharing,
        };
        debug!("Remote media state from {}: {:?}", from, self.remote);
        true
    }

    pub fn reset_remote(&mut self) {
        self.remote = RemoteMediaState::default();
    }

    /// Stops an active display capture without touching the link.
    pub fn release(&mut self) {
        if let Some(shared) = self.display.take() {
            warn!("Releasing display track {} on teardown", shared.id());
            shared.stop();
        }
    }
}
