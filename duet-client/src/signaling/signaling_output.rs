use crate::error::SignalingError;
use async_trait::async_trait;
use duet_core::SignalEvent;

/// Outbound half of the relay connection.
///
/// The negotiator and the session only ever talk to the relay through this
/// trait, so they can be driven by a mock in tests.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn send(&self, event: SignalEvent) -> Result<(), SignalingError>;
}
