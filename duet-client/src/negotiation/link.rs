use crate::transport::{PeerTransport, TransportEvent};
use duet_core::{IceCandidate, MediaKind};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle of a session's connection to the remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    GatheringMedia,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_active(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::GatheringMedia => "gathering-media",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which side yields when both offer at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    /// First to arrive; rolls back its own offer on a collision.
    Polite,
    /// Second to arrive and initiator of the link; ignores colliding offers.
    Impolite,
}

impl NegotiationRole {
    pub fn is_polite(&self) -> bool {
        *self == NegotiationRole::Polite
    }
}

/// Remote candidates that arrived before a remote description existed.
#[derive(Debug, Default)]
pub struct PendingCandidateQueue {
    candidates: Vec<IceCandidate>,
}

impl PendingCandidateQueue {
    pub fn push(&mut self, candidate: IceCandidate) {
        self.candidates.push(candidate);
    }

    /// Hands out every queued candidate in arrival order and empties the queue.
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.candidates)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    pub kind: MediaKind,
    pub track_id: String,
}

/// What the remote participant is sending. Empty until the first track lands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStream {
    pub tracks: Vec<RemoteTrackInfo>,
}

impl RemoteStream {
    pub fn has(&self, kind: MediaKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }
}

/// One peer connection and everything tied to its lifetime.
pub struct PeerLink {
    pub(crate) transport: Arc<dyn PeerTransport>,
    pub(crate) events: mpsc::Receiver<TransportEvent>,
    pub(crate) remote_stream: Option<RemoteStream>,
    pub(crate) has_remote_description: bool,
}

impl PeerLink {
    pub fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.transport
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    pub fn has_remote_description(&self) -> bool {
        self.has_remote_description
    }
}
