use crate::media::LocalTrack;
use crate::transport::transport_event::{SignalingState, TransportEvent};
use anyhow::Result;
use async_trait::async_trait;
use duet_core::{IceCandidate, MediaKind, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

/// The peer-connection seam.
///
/// Everything the negotiator needs from a WebRTC peer connection, nothing
/// more. The production implementation wraps `webrtc-rs`; tests plug in an
/// in-memory pair.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Drops a pending local offer and returns to `stable`.
    async fn rollback(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    fn signaling_state(&self) -> SignalingState;

    /// Attaches a new outgoing track. Requires a new offer to take effect.
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<()>;

    /// Swaps what the sender of `kind` transmits, without renegotiation.
    async fn replace_track(&self, kind: MediaKind, track: Option<Arc<LocalTrack>>) -> Result<()>;

    /// Id of the track the sender of `kind` currently transmits.
    fn sender_track_id(&self, kind: MediaKind) -> Option<String>;

    async fn close(&self) -> Result<()>;
}

/// Creates one transport per peer link.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, events: mpsc::Sender<TransportEvent>) -> Result<Arc<dyn PeerTransport>>;
}
