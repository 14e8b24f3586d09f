use crate::capture::backend::{CaptureBackend, DeviceInfo};
use crate::error::DeviceError;
use crate::media::{LocalTrack, MediaStream};
use duet_core::MediaKind;
use std::sync::Arc;
use tracing::{info, warn};

/// What the lobby hands over to the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingConfig {
    pub camera_device_id: Option<String>,
    pub microphone_device_id: Option<String>,
    pub camera_enabled: bool,
    pub microphone_enabled: bool,
}

impl Default for MeetingConfig {
    fn default() -> Self {
        Self {
            camera_device_id: None,
            microphone_device_id: None,
            camera_enabled: true,
            microphone_enabled: true,
        }
    }
}

/// Opens a device, falling back to the default device when the requested id
/// no longer exists.
pub async fn open_with_fallback(
    backend: &dyn CaptureBackend,
    kind: MediaKind,
    device_id: Option<&str>,
) -> Result<Arc<LocalTrack>, DeviceError> {
    match backend.open(kind, device_id).await {
        Err(DeviceError::NotFound { device_id, .. }) => {
            warn!("{} device {} is gone, using the default device", kind, device_id);
            backend.open(kind, None).await
        }
        other => other,
    }
}

/// Acquires the in-call stream described by the lobby selection.
///
/// Enabled flags are applied before the stream is returned, so nothing is
/// ever sent from a track the user switched off in the lobby.
pub async fn open_call_stream(
    backend: &dyn CaptureBackend,
    config: &MeetingConfig,
) -> Result<MediaStream, DeviceError> {
    let video =
        open_with_fallback(backend, MediaKind::Video, config.camera_device_id.as_deref()).await?;
    let audio = match open_with_fallback(
        backend,
        MediaKind::Audio,
        config.microphone_device_id.as_deref(),
    )
    .await
    {
        Ok(track) => track,
        Err(e) => {
            video.stop();
            return Err(e);
        }
    };

    video.set_enabled(config.camera_enabled);
    audio.set_enabled(config.microphone_enabled);
    Ok(MediaStream::new(vec![video, audio]))
}

/// Lobby-side device selection and preview.
pub struct DeviceManager {
    backend: Arc<dyn CaptureBackend>,
    cameras: Vec<DeviceInfo>,
    microphones: Vec<DeviceInfo>,
    selected_camera: Option<String>,
    selected_microphone: Option<String>,
    camera_enabled: bool,
    microphone_enabled: bool,
    camera: Option<Arc<LocalTrack>>,
    microphone: Option<Arc<LocalTrack>>,
}

impl DeviceManager {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            cameras: Vec::new(),
            microphones: Vec::new(),
            selected_camera: None,
            selected_microphone: None,
            camera_enabled: true,
            microphone_enabled: true,
            camera: None,
            microphone: None,
        }
    }

    /// Probes permissions, lists devices, selects the first of each kind and
    /// opens the preview.
    pub async fn initialize(&mut self) -> Result<(), DeviceError> {
        self.backend.request_permission().await?;

        let devices = self.backend.enumerate_devices().await?;
        let (cameras, microphones): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .partition(|d| d.kind == MediaKind::Video);
        self.cameras = cameras;
        self.microphones = microphones;
        info!(
            "Found {} camera(s) and {} microphone(s)",
            self.cameras.len(),
            self.microphones.len()
        );

        self.selected_camera = self.cameras.first().map(|d| d.device_id.clone());
        self.selected_microphone = self.microphones.first().map(|d| d.device_id.clone());

        if self.selected_camera.is_some() {
            self.restart(MediaKind::Video).await?;
        }
        if self.selected_microphone.is_some() {
            self.restart(MediaKind::Audio).await?;
        }
        Ok(())
    }

    pub fn cameras(&self) -> &[DeviceInfo] {
        &self.cameras
    }

    pub fn microphones(&self) -> &[DeviceInfo] {
        &self.microphones
    }

    pub fn selected_camera(&self) -> Option<&str> {
        self.selected_camera.as_deref()
    }

    pub fn selected_microphone(&self) -> Option<&str> {
        self.selected_microphone.as_deref()
    }

    pub async fn select_camera(&mut self, device_id: &str) -> Result<(), DeviceError> {
        if self.selected_camera.as_deref() == Some(device_id) && self.camera.is_some() {
            return Ok(());
        }
        self.selected_camera = Some(device_id.to_owned());
        self.restart(MediaKind::Video).await
    }

    pub async fn select_microphone(&mut self, device_id: &str) -> Result<(), DeviceError> {
        if self.selected_microphone.as_deref() == Some(device_id) && self.microphone.is_some() {
            return Ok(());
        }
        self.selected_microphone = Some(device_id.to_owned());
        self.restart(MediaKind::Audio).await
    }

    /// Flips the camera without touching the capture itself.
    pub fn toggle_camera(&mut self) -> bool {
        self.camera_enabled = !self.camera_enabled;
        if let Some(track) = &self.camera {
            track.set_enabled(self.camera_enabled);
        }
        self.camera_enabled
    }

    pub fn toggle_microphone(&mut self) -> bool {
        self.microphone_enabled = !self.microphone_enabled;
        if let Some(track) = &self.microphone {
            track.set_enabled(self.microphone_enabled);
        }
        self.microphone_enabled
    }

    pub fn is_camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn is_microphone_enabled(&self) -> bool {
        self.microphone_enabled
    }

    pub fn preview_stream(&self) -> MediaStream {
        MediaStream::new(
            self.camera
                .iter()
                .chain(self.microphone.iter())
                .cloned()
                .collect(),
        )
    }

    pub fn meeting_config(&self) -> MeetingConfig {
        MeetingConfig {
            camera_device_id: self.selected_camera.clone(),
            microphone_device_id: self.selected_microphone.clone(),
            camera_enabled: self.camera_enabled,
            microphone_enabled: self.microphone_enabled,
        }
    }

    /// Stops the preview. Selection and toggle state survive.
    pub fn release(&mut self) {
        for track in self.camera.take().into_iter().chain(self.microphone.take()) {
            track.stop();
        }
    }

    async fn restart(&mut self, kind: MediaKind) -> Result<(), DeviceError> {
        let (slot, selected, enabled) = match kind {
            MediaKind::Video => (&mut self.camera, &self.selected_camera, self.camera_enabled),
            MediaKind::Audio => (
                &mut self.microphone,
                &self.selected_microphone,
                self.microphone_enabled,
            ),
        };

        // The old capture must be released first or the device stays locked.
        if let Some(old) = slot.take() {
            old.stop();
        }

        let track = open_with_fallback(self.backend.as_ref(), kind, selected.as_deref()).await?;
        track.set_enabled(enabled);
        info!("Preview {} track bound to {:?}", kind, track.device_id());
        *slot = Some(track);
        Ok(())
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.release();
    }
}
