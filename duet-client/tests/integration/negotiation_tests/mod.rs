pub mod test_glare;

use std::sync::Arc;

use duet_client::config::NegotiationConfig;
use duet_client::media::{LocalTrack, MediaStream, TrackSource};
use duet_client::negotiation::Negotiator;
use duet_core::{IceCandidate, MediaKind, ParticipantId, SessionDescription};

use crate::integration::room;
use crate::utils::{MockSignalingOutput, MockTransportFactory};

/// A negotiator wired to mocks, with a camera and microphone attached.
pub struct TestNegotiator {
    pub id: ParticipantId,
    pub negotiator: Negotiator,
    pub signaling: MockSignalingOutput,
    pub transports: MockTransportFactory,
}

impl TestNegotiator {
    pub fn new(local: &str) -> Self {
        Self::with_config(local, NegotiationConfig::default())
    }

    pub fn with_config(local: &str, config: NegotiationConfig) -> Self {
        let id = ParticipantId::from(local);
        let signaling = MockSignalingOutput::new_stored_only();
        let transports = MockTransportFactory::new();

        let mut negotiator = Negotiator::new(
            id.clone(),
            room(),
            Arc::new(transports.clone()),
            Arc::new(signaling.clone()),
            config,
        );
        negotiator.attach_local_stream(MediaStream::new(vec![
            LocalTrack::new(MediaKind::Video, TrackSource::Camera, "camera", None),
            LocalTrack::new(MediaKind::Audio, TrackSource::Microphone, "mic", None),
        ]));

        Self {
            id,
            negotiator,
            signaling,
            transports,
        }
    }

    pub async fn last_offer(&self) -> SessionDescription {
        self.signaling
            .last_description("offer")
            .await
            .expect("No offer was sent")
    }

    pub async fn last_answer(&self) -> SessionDescription {
        self.signaling
            .last_description("answer")
            .await
            .expect("No answer was sent")
    }
}

/// `users` as broadcast by the relay once both have joined, `first` first.
pub fn both(first: &TestNegotiator, second: &TestNegotiator) -> Vec<ParticipantId> {
    vec![first.id.clone(), second.id.clone()]
}

pub fn candidate(n: u16) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2130706431 192.168.1.{n} 5000 typ host"),
        sdp_mid: Some("0".to_owned()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}
