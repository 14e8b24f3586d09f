//! Software capture backend.
//!
//! Generates fake devices and a steady stream of placeholder samples, so the
//! whole call stack can run headless. A device can only be held by one live
//! track at a time, like real hardware.

use crate::capture::backend::{CaptureBackend, DeviceInfo};
use crate::error::DeviceError;
use crate::media::{LocalTrack, TrackSource};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use duet_core::MediaKind;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

const VIDEO_FRAME_BYTES: usize = 1200;
const AUDIO_FRAME_BYTES: usize = 160;

pub struct SyntheticCapture {
    devices: Vec<DeviceInfo>,
    denied: HashSet<MediaKind>,
    display_supported: bool,
    frame_interval: Duration,
    held: Mutex<HashMap<String, Weak<LocalTrack>>>,
    displays: Mutex<Vec<Weak<LocalTrack>>>,
    opened: Mutex<Vec<String>>,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self {
            devices: vec![
                DeviceInfo {
                    device_id: "synthetic-camera-0".to_owned(),
                    kind: MediaKind::Video,
                    label: "Synthetic Camera".to_owned(),
                },
                DeviceInfo {
                    device_id: "synthetic-camera-1".to_owned(),
                    kind: MediaKind::Video,
                    label: "Synthetic Camera (rear)".to_owned(),
                },
                DeviceInfo {
                    device_id: "synthetic-mic-0".to_owned(),
                    kind: MediaKind::Audio,
                    label: "Synthetic Microphone".to_owned(),
                },
            ],
            denied: HashSet::new(),
            display_supported: true,
            frame_interval: Duration::from_millis(33),
            held: Mutex::new(HashMap::new()),
            displays: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn with_devices(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.devices = devices;
        self
    }

    pub fn deny(mut self, kind: MediaKind) -> Self {
        self.denied.insert(kind);
        self
    }

    pub fn without_display(mut self) -> Self {
        self.display_supported = false;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Device ids in the order they were opened, display capture included.
    pub fn open_log(&self) -> Vec<String> {
        self.opened.lock().clone()
    }

    /// Ends every live display capture as if sharing was stopped from the
    /// system UI. Returns how many tracks ended.
    pub fn end_display(&self) -> usize {
        let mut ended = 0;
        self.displays.lock().retain(|weak| {
            let Some(track) = weak.upgrade() else {
                return false;
            };
            if track.is_live() {
                track.end();
                ended += 1;
            }
            false
        });
        ended
    }

    fn default_device(&self, kind: MediaKind) -> Option<&DeviceInfo> {
        self.devices.iter().find(|d| d.kind == kind)
    }

    fn claim(&self, device_id: &str, track: &Arc<LocalTrack>) -> Result<(), DeviceError> {
        let mut held = self.held.lock();
        if let Some(current) = held.get(device_id).and_then(Weak::upgrade) {
            if current.is_live() {
                return Err(DeviceError::Busy(device_id.to_owned()));
            }
        }
        held.insert(device_id.to_owned(), Arc::downgrade(track));
        self.opened.lock().push(device_id.to_owned());
        Ok(())
    }

    fn spawn_generator(&self, track: &Arc<LocalTrack>) {
        let weak = Arc::downgrade(track);
        let interval = self.frame_interval;
        let frame_len = match track.kind() {
            MediaKind::Video => VIDEO_FRAME_BYTES,
            MediaKind::Audio => AUDIO_FRAME_BYTES,
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut frame: u32 = 0;
            loop {
                ticker.tick().await;
                let Some(track) = weak.upgrade() else { break };
                if !track.is_live() {
                    break;
                }

                let mut buf = BytesMut::with_capacity(frame_len);
                buf.put_u32(frame);
                buf.resize(frame_len, (frame % 251) as u8);
                if let Err(e) = track.write_sample(buf.freeze(), interval).await {
                    warn!("Synthetic sample dropped on track {}: {:#}", track.id(), e);
                }
                frame = frame.wrapping_add(1);
            }
            debug!("Synthetic generator finished");
        });
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for SyntheticCapture {
    async fn request_permission(&self) -> Result<(), DeviceError> {
        for kind in [MediaKind::Video, MediaKind::Audio] {
            if self.denied.contains(&kind) {
                return Err(DeviceError::PermissionDenied(kind));
            }
        }
        Ok(())
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.clone())
    }

    async fn open(
        &self,
        kind: MediaKind,
        device_id: Option<&str>,
    ) -> Result<Arc<LocalTrack>, DeviceError> {
        if self.denied.contains(&kind) {
            return Err(DeviceError::PermissionDenied(kind));
        }

        let device = match device_id {
            Some(id) => self
                .devices
                .iter()
                .find(|d| d.kind == kind && d.device_id == id)
                .ok_or_else(|| DeviceError::NotFound {
                    kind,
                    device_id: id.to_owned(),
                })?,
            None => self
                .default_device(kind)
                .ok_or(DeviceError::NoDevice(kind))?,
        };

        let source = match kind {
            MediaKind::Video => TrackSource::Camera,
            MediaKind::Audio => TrackSource::Microphone,
        };
        let track = LocalTrack::new(
            kind,
            source,
            device.label.clone(),
            Some(device.device_id.clone()),
        );
        self.claim(&device.device_id, &track)?;
        self.spawn_generator(&track);
        Ok(track)
    }

    async fn open_display(&self) -> Result<Arc<LocalTrack>, DeviceError> {
        if !self.display_supported {
            return Err(DeviceError::DisplayUnsupported);
        }
        let track = LocalTrack::new(MediaKind::Video, TrackSource::Display, "screen:0", None);
        self.opened.lock().push("screen:0".to_owned());
        self.displays.lock().push(Arc::downgrade(&track));
        self.spawn_generator(&track);
        Ok(track)
    }
}
