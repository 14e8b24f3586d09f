use async_trait::async_trait;
use duet_client::error::SignalingError;
use duet_client::signaling::SignalingOutput;
use duet_core::SignalEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

/// Mock SignalingOutput that captures all outgoing events.
#[derive(Clone)]
pub struct MockSignalingOutput {
    /// Channel to forward captured events.
    tx: mpsc::UnboundedSender<SignalEvent>,
    /// All captured events (for verification).
    signals: Arc<Mutex<Vec<SignalEvent>>>,
    /// When set, every send fails with `NotConnected`.
    offline: Arc<AtomicBool>,
}

impl MockSignalingOutput {
    /// Create a new MockSignalingOutput and its receiver channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SignalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let signaling = Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
            offline: Arc::new(AtomicBool::new(false)),
        };
        (signaling, rx)
    }

    /// Create a MockSignalingOutput without a receiver (events are only stored).
    pub fn new_stored_only() -> Self {
        let (signaling, _rx) = Self::new();
        signaling
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every event sent so far, in order.
    pub async fn sent(&self) -> Vec<SignalEvent> {
        self.signals.lock().await.clone()
    }

    /// Wire names of every event sent so far, in order.
    pub async fn sent_names(&self) -> Vec<&'static str> {
        self.signals.lock().await.iter().map(|s| s.name()).collect()
    }

    pub async fn count(&self, name: &str) -> usize {
        self.signals
            .lock()
            .await
            .iter()
            .filter(|s| s.name() == name)
            .count()
    }

    /// The most recent offer or answer SDP.
    pub async fn last_description(&self, name: &str) -> Option<duet_core::SessionDescription> {
        self.signals.lock().await.iter().rev().find_map(|s| match s {
            SignalEvent::Offer { sdp, .. } if name == "offer" => Some(sdp.clone()),
            SignalEvent::Answer { sdp, .. } if name == "answer" => Some(sdp.clone()),
            _ => None,
        })
    }
}

impl Default for MockSignalingOutput {
    fn default() -> Self {
        Self::new_stored_only()
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn send(&self, event: SignalEvent) -> Result<(), SignalingError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SignalingError::NotConnected);
        }
        tracing::debug!("[MockSignaling] send {}", event.name());

        self.signals.lock().await.push(event.clone());
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_core::RoomId;

    #[tokio::test]
    async fn test_mock_signaling_captures_events() {
        let (signaling, mut rx) = MockSignalingOutput::new();
        let room_id = RoomId("ROOM1".to_owned());

        signaling
            .send(SignalEvent::JoinRoom {
                room_id: room_id.clone(),
            })
            .await
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, SignalEvent::JoinRoom { .. }));
        assert_eq!(signaling.sent_names().await, vec!["join-room"]);
    }

    #[tokio::test]
    async fn test_mock_signaling_offline() {
        let signaling = MockSignalingOutput::new_stored_only();
        signaling.set_offline(true);

        let err = signaling
            .send(SignalEvent::LeaveRoom {
                room_id: RoomId("ROOM1".to_owned()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SignalingError::NotConnected));
        assert!(signaling.sent().await.is_empty());
    }
}
