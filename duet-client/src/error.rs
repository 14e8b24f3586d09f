//! Error taxonomy of the client engine.
//!
//! Each component owns one enum; [`SessionError`] wraps them at the session
//! boundary so callers can match on the class of failure.

use duet_core::{MediaKind, TakeId};
use thiserror::Error;

/// Camera, microphone and display capture failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission denied for {0}")]
    PermissionDenied(MediaKind),

    #[error("no {kind} device matches id {device_id:?}")]
    NotFound { kind: MediaKind, device_id: String },

    #[error("no {0} device available")]
    NoDevice(MediaKind),

    #[error("device {0} is busy")]
    Busy(String),

    #[error("screen capture is not supported by this backend")]
    DisplayUnsupported,

    #[error("capture failed: {0}")]
    Capture(String),
}

#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("could not connect to {url} within {timeout_ms} ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    #[error("signaling channel is not connected")]
    NotConnected,

    #[error("signaling channel closed")]
    Closed,

    #[error("join rejected: {0}")]
    JoinRejected(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("no peer link exists")]
    NoLink,

    #[error("no remote participant to negotiate with")]
    NoRemote,

    #[error("stale answer received in signaling state {0}")]
    StaleAnswer(String),

    #[error("malformed session description: {0}")]
    MalformedDescription(String),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("peer transport error: {0:#}")]
    Transport(#[from] anyhow::Error),
}

/// Meeting and take collaborator failures.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("unexpected response from {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("could not obtain upload target: {0}")]
    Target(#[source] ApiError),

    #[error("chunk transfer failed: {0}")]
    Transfer(#[source] ApiError),
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("no {0} track available for recording")]
    NoTrack(MediaKind),

    #[error("recording already in progress for take {0}")]
    AlreadyRecording(TakeId),

    #[error("no recording in progress")]
    NotRecording,

    #[error("could not create take: {0}")]
    Take(#[source] ApiError),

    #[error("recorder failed: {0}")]
    Recorder(String),
}

/// Everything that can go wrong at the session boundary.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Recording(#[from] RecordingError),

    #[error("a {0} track is already part of the call")]
    TrackExists(MediaKind),

    #[error("session is closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;
