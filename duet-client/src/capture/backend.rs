use crate::error::DeviceError;
use crate::media::LocalTrack;
use async_trait::async_trait;
use duet_core::MediaKind;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub kind: MediaKind,
    pub label: String,
}

/// Source of camera, microphone and display tracks.
///
/// Implementations hold the actual hardware; everything above this trait only
/// deals in [`LocalTrack`] handles.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Opens and immediately releases one track of each kind so that device
    /// labels become visible to [`CaptureBackend::enumerate_devices`].
    async fn request_permission(&self) -> Result<(), DeviceError>;

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// `None` selects the backend's default device for the kind.
    async fn open(
        &self,
        kind: MediaKind,
        device_id: Option<&str>,
    ) -> Result<Arc<LocalTrack>, DeviceError>;

    async fn open_display(&self) -> Result<Arc<LocalTrack>, DeviceError>;
}
