//! Local camera, microphone and display capture.

mod backend;
mod device_manager;
mod synthetic;

pub use backend::{CaptureBackend, DeviceInfo};
pub use device_manager::{DeviceManager, MeetingConfig, open_call_stream, open_with_fallback};
pub use synthetic::SyntheticCapture;
