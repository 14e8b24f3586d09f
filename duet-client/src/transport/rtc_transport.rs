use crate::config::TransportConfig;
use crate::media::LocalTrack;
use crate::transport::peer_transport::{PeerTransport, TransportFactory};
use crate::transport::transport_event::{LinkConnectionState, SignalingState, TransportEvent};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use duet_core::{IceCandidate, MediaKind, SdpType, SessionDescription};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

struct SenderSlot {
    sender: Arc<RTCRtpSender>,
    track_id: Option<String>,
}

/// [`PeerTransport`] backed by a `webrtc-rs` peer connection.
pub struct RtcTransport {
    peer_connection: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<MediaKind, SenderSlot>>,
}

impl RtcTransport {
    /// Builds the peer connection and wires its callbacks into `event_tx`.
    pub async fn new(config: &TransportConfig, event_tx: mpsc::Sender<TransportEvent>) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    info!("Peer connection state changed: {}", s);
                    let state = match s {
                        RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                            LinkConnectionState::New
                        }
                        RTCPeerConnectionState::Connecting => LinkConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => LinkConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected => LinkConnectionState::Disconnected,
                        RTCPeerConnectionState::Failed => LinkConnectionState::Failed,
                        RTCPeerConnectionState::Closed => LinkConnectionState::Closed,
                    };
                    let _ = tx.send(TransportEvent::ConnectionState(state)).await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                };
                let _ = tx.send(TransportEvent::LocalCandidate(candidate)).await;
            })
        }));

        let track_tx = event_tx;
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        RTPCodecType::Video => MediaKind::Video,
                        RTPCodecType::Unspecified => return,
                    };
                    debug!("Remote {} track {} arrived", kind, track.id());
                    let _ = tx
                        .send(TransportEvent::RemoteTrack {
                            kind,
                            track_id: track.id(),
                        })
                        .await;
                })
            },
        ));

        Ok(Self {
            peer_connection,
            senders: Mutex::new(HashMap::new()),
        })
    }

    fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
        let rtc = match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        Ok(rtc)
    }

    fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
        match desc.sdp_type {
            RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
            RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
            other => Err(anyhow!("unexpected description type {}", other)),
        }
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        Self::from_rtc(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        Self::from_rtc(answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(Self::to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(Self::to_rtc(desc)?)
            .await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        // webrtc-rs only back-fills an empty SDP for offers and answers, so
        // the rollback carries the pending offer's text.
        let pending = self
            .peer_connection
            .pending_local_description()
            .await
            .ok_or_else(|| anyhow!("no pending local description to roll back"))?;
        // No public constructor exists for a rollback description; it
        // deserializes from the JSEP form instead.
        let rollback: RTCSessionDescription =
            serde_json::from_value(serde_json::json!({ "type": "rollback", "sdp": pending.sdp }))
                .context("Failed to build rollback description")?;
        self.peer_connection.set_local_description(rollback).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::Unspecified | RTCSignalingState::Stable => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
        }
    }

    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        if self.senders.lock().contains_key(&track.kind()) {
            return Err(anyhow!("a {} sender already exists", track.kind()));
        }

        let rtp: Arc<dyn TrackLocal + Send + Sync> = track.rtp_track();
        let sender = self.peer_connection.add_track(rtp).await?;

        // RTCP has to be drained for the interceptors to work.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });

        self.senders.lock().insert(
            track.kind(),
            SenderSlot {
                sender,
                track_id: Some(track.id().to_owned()),
            },
        );
        Ok(())
    }

    async fn replace_track(&self, kind: MediaKind, track: Option<Arc<LocalTrack>>) -> Result<()> {
        let sender = self
            .senders
            .lock()
            .get(&kind)
            .map(|slot| slot.sender.clone())
            .ok_or_else(|| anyhow!("no {} sender on this link", kind))?;

        let rtp = track
            .as_ref()
            .map(|t| t.rtp_track() as Arc<dyn TrackLocal + Send + Sync>);
        sender.replace_track(rtp).await?;

        if let Some(slot) = self.senders.lock().get_mut(&kind) {
            slot.track_id = track.map(|t| t.id().to_owned());
        }
        Ok(())
    }

    fn sender_track_id(&self, kind: MediaKind) -> Option<String> {
        self.senders
            .lock()
            .get(&kind)
            .and_then(|slot| slot.track_id.clone())
    }

    async fn close(&self) -> Result<()> {
        self.senders.lock().clear();
        if let Err(e) = self.peer_connection.close().await {
            warn!("Closing peer connection failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Creates [`RtcTransport`]s from a shared ICE configuration.
#[derive(Clone, Default)]
pub struct RtcTransportFactory {
    config: TransportConfig,
}

impl RtcTransportFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(&self, events: mpsc::Sender<TransportEvent>) -> Result<Arc<dyn PeerTransport>> {
        let transport = RtcTransport::new(&self.config, events).await?;
        Ok(Arc::new(transport))
    }
}
