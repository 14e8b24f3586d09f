//! Perfect negotiation between exactly two participants.
//!
//! The second participant to join initiates the link and plays the impolite
//! role; the first one is polite. On an offer collision the impolite side
//! keeps its own offer and drops the incoming one, the polite side rolls back
//! and answers. Only the connection-state callback of the link decides
//! whether the call is up.

use crate::config::NegotiationConfig;
use crate::error::NegotiationError;
use crate::media::{LocalTrack, MediaStream};
use crate::negotiation::link::{
    ConnectionState, NegotiationRole, PeerLink, PendingCandidateQueue, RemoteStream,
    RemoteTrackInfo,
};
use crate::signaling::SignalingOutput;
use crate::transport::{
    LinkConnectionState, PeerTransport, SignalingState, TransportEvent, TransportFactory,
};
use duet_core::{IceCandidate, ParticipantId, RoomId, SessionDescription, SignalEvent};
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

const TRANSPORT_EVENT_CAPACITY: usize = 64;

/// Something the negotiator needs to react to.
#[derive(Debug)]
pub enum NegotiatorEvent {
    Transport(TransportEvent),
    /// The initiation delay elapsed; time to send the first offer.
    InitiationDue,
    /// No answer arrived within the negotiation timeout.
    AnswerOverdue,
}

/// Changes the session has to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkUpdate {
    Connected,
    /// The link went `disconnected` or `failed` and has been torn down.
    Lost(ConnectionState),
    RemoteTrack(RemoteTrackInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Answered,
    /// Impolite side, colliding offer.
    Ignored,
}

pub struct Negotiator {
    local_id: ParticipantId,
    room_id: RoomId,
    remote_id: Option<ParticipantId>,
    role: Option<NegotiationRole>,
    making_offer: bool,
    link: Option<PeerLink>,
    pending: PendingCandidateQueue,
    local_stream: MediaStream,
    factory: Arc<dyn TransportFactory>,
    signaling: Arc<dyn SignalingOutput>,
    config: NegotiationConfig,
    state: watch::Sender<ConnectionState>,
    initiate_at: Option<Instant>,
    answer_deadline: Option<Instant>,
}

impl Negotiator {
    pub fn new(
        local_id: ParticipantId,
        room_id: RoomId,
        factory: Arc<dyn TransportFactory>,
        signaling: Arc<dyn SignalingOutput>,
        config: NegotiationConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::New);
        Self {
            local_id,
            room_id,
            remote_id: None,
            role: None,
            making_offer: false,
            link: None,
            pending: PendingCandidateQueue::default(),
            local_stream: MediaStream::default(),
            factory,
            signaling,
            config,
            state,
            initiate_at: None,
            answer_deadline: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn role(&self) -> Option<NegotiationRole> {
        self.role
    }

    pub fn remote_id(&self) -> Option<&ParticipantId> {
        self.remote_id.as_ref()
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn link(&self) -> Option<&PeerLink> {
        self.link.as_ref()
    }

    pub fn transport(&self) -> Option<&dyn PeerTransport> {
        self.link.as_ref().map(|l| l.transport.as_ref())
    }

    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.link.as_ref().and_then(|l| l.remote_stream.as_ref())
    }

    pub fn local_stream(&self) -> &MediaStream {
        &self.local_stream
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    /// The initiator is the side that must announce its departure when the
    /// link fails.
    pub fn is_initiator(&self) -> bool {
        self.role == Some(NegotiationRole::Impolite)
    }

    pub fn begin_gathering(&mut self) {
        self.set_state(ConnectionState::GatheringMedia);
    }

    /// Tracks attached here are added to every link created afterwards.
    pub fn attach_local_stream(&mut self, stream: MediaStream) {
        self.local_stream = stream;
    }

    /// Applies a `user-joined` broadcast and returns the remote participant
    /// if it just became known.
    pub fn on_user_joined(
        &mut self,
        users: &[ParticipantId],
        joined: &ParticipantId,
    ) -> Option<ParticipantId> {
        let remote = users.iter().find(|u| **u != self.local_id).cloned()?;
        if self.remote_id.as_ref() == Some(&remote) {
            return None;
        }
        if self.remote_id.is_some() {
            warn!(
                "Replacing remote participant {:?} with {} in room {}",
                self.remote_id, remote, self.room_id
            );
            self.drop_link();
        }

        self.remote_id = Some(remote.clone());
        if *joined == self.local_id {
            // We arrived second: we own the first offer.
            self.role = Some(NegotiationRole::Impolite);
            self.initiate_at = Some(Instant::now() + self.config.initiation_delay);
            info!(
                "Joined room {} after {}; initiating in {:?}",
                self.room_id, remote, self.config.initiation_delay
            );
        } else {
            self.role = Some(NegotiationRole::Polite);
            info!("{} joined room {}; waiting for their offer", remote, self.room_id);
        }
        Some(remote)
    }

    /// Forgets the remote participant. The local stream stays attached.
    pub async fn on_user_left(&mut self, user: &ParticipantId) -> bool {
        if self.remote_id.as_ref() != Some(user) {
            return false;
        }
        info!("{} left room {}", user, self.room_id);
        self.close_link().await;
        self.remote_id = None;
        self.role = None;
        self.set_state(ConnectionState::New);
        true
    }

    /// Waits for the next transport event or timer. Pending forever while
    /// there is nothing to wait for.
    pub async fn next_event(&mut self) -> NegotiatorEvent {
        let initiate_at = self.initiate_at;
        let answer_deadline = self.answer_deadline;
        let events = self.link.as_mut().map(|l| &mut l.events);

        tokio::select! {
            event = recv_or_pending(events) => NegotiatorEvent::Transport(event),
            _ = sleep_or_pending(initiate_at) => NegotiatorEvent::InitiationDue,
            _ = sleep_or_pending(answer_deadline) => NegotiatorEvent::AnswerOverdue,
        }
    }

    pub async fn handle_event(
        &mut self,
        event: NegotiatorEvent,
    ) -> Result<Option<LinkUpdate>, NegotiationError> {
        match event {
            NegotiatorEvent::InitiationDue => {
                self.initiate_at = None;
                self.make_offer().await?;
                Ok(None)
            }
            NegotiatorEvent::AnswerOverdue => {
                self.answer_deadline = None;
                warn!("No answer from {:?}, offering again", self.remote_id);
                self.make_offer().await?;
                Ok(None)
            }
            NegotiatorEvent::Transport(TransportEvent::LocalCandidate(candidate)) => {
                self.signaling
                    .send(SignalEvent::IceCandidate {
                        room_id: self.room_id.clone(),
                        candidate,
                        target_user_id: self.remote_id.clone(),
                        from_user_id: Some(self.local_id.clone()),
                    })
                    .await?;
                Ok(None)
            }
            NegotiatorEvent::Transport(TransportEvent::ConnectionState(state)) => {
                Ok(self.on_link_state(state).await)
            }
            NegotiatorEvent::Transport(TransportEvent::RemoteTrack { kind, track_id }) => {
                let Some(link) = self.link.as_mut() else {
                    return Ok(None);
                };
                let info = RemoteTrackInfo { kind, track_id };
                link.remote_stream
                    .get_or_insert_with(RemoteStream::default)
                    .tracks
                    .push(info.clone());
                Ok(Some(LinkUpdate::RemoteTrack(info)))
            }
        }
    }

    /// Sends an offer to the remote participant, creating the link if needed.
    pub async fn make_offer(&mut self) -> Result<(), NegotiationError> {
        let remote = self.remote_id.clone().ok_or(NegotiationError::NoRemote)?;
        self.ensure_link().await?;
        let transport = self.current_transport()?;
        self.enter_negotiating();

        self.making_offer = true;
        let result = async {
            // An unanswered offer is replaced, not stacked.
            if transport.signaling_state() == SignalingState::HaveLocalOffer {
                transport.rollback().await?;
            }
            let offer = transport.create_offer().await?;
            transport.set_local_description(offer.clone()).await?;
            anyhow::Ok(offer)
        }
        .await;
        self.making_offer = false;
        let offer = result?;

        debug!("Sending offer to {} in room {}", remote, self.room_id);
        self.signaling
            .send(SignalEvent::Offer {
                room_id: self.room_id.clone(),
                sdp: offer,
                target_user_id: Some(remote),
                from_user_id: Some(self.local_id.clone()),
            })
            .await?;

        if let Some(timeout) = self.config.negotiation_timeout {
            self.answer_deadline = Some(Instant::now() + timeout);
        }
        Ok(())
    }

    pub async fn on_remote_offer(
        &mut self,
        from: Option<ParticipantId>,
        sdp: SessionDescription,
    ) -> Result<OfferOutcome, NegotiationError> {
        if self.remote_id.is_none() {
            self.remote_id = from;
        }
        if self.role.is_none() {
            // Whoever receives the first offer did not initiate.
            self.role = Some(NegotiationRole::Polite);
        }

        self.ensure_link().await?;
        let transport = self.current_transport()?;
        self.enter_negotiating();

        let collision =
            self.making_offer || transport.signaling_state() != SignalingState::Stable;
        if collision && !self.is_polite() {
            info!(
                "Ignoring colliding offer from {:?} (signaling state {})",
                self.remote_id,
                transport.signaling_state()
            );
            return Ok(OfferOutcome::Ignored);
        }

        if collision {
            info!("Offer collision, rolling back local offer");
            transport.rollback().await?;
            self.answer_deadline = None;
        }

        transport
            .set_remote_description(sdp)
            .await
            .map_err(|e| NegotiationError::MalformedDescription(format!("{e:#}")))?;
        self.mark_remote_description();
        self.flush_candidates(transport.as_ref()).await;

        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;

        debug!("Sending answer to {:?} in room {}", self.remote_id, self.room_id);
        self.signaling
            .send(SignalEvent::Answer {
                room_id: self.room_id.clone(),
                sdp: answer,
                target_user_id: self.remote_id.clone(),
                from_user_id: Some(self.local_id.clone()),
            })
            .await?;
        Ok(OfferOutcome::Answered)
    }

    pub async fn on_remote_answer(&mut self, sdp: SessionDescription) -> Result<(), NegotiationError> {
        let transport = self.current_transport()?;
        let state = transport.signaling_state();
        if state != SignalingState::HaveLocalOffer {
            return Err(NegotiationError::StaleAnswer(state.to_string()));
        }

        transport
            .set_remote_description(sdp)
            .await
            .map_err(|e| NegotiationError::MalformedDescription(format!("{e:#}")))?;
        self.answer_deadline = None;
        self.mark_remote_description();
        self.flush_candidates(transport.as_ref()).await;
        Ok(())
    }

    pub async fn on_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        match &self.link {
            Some(link) if link.has_remote_description => {
                link.transport.add_ice_candidate(candidate).await?;
            }
            _ => {
                self.pending.push(candidate);
                debug!("Queued early ICE candidate ({} pending)", self.pending.len());
            }
        }
        Ok(())
    }

    /// Adds a track to the local stream. On a live link this renegotiates.
    pub async fn add_local_track(&mut self, track: Arc<LocalTrack>) -> Result<(), NegotiationError> {
        self.local_stream.push(track.clone());
        let Some(link) = &self.link else {
            return Ok(());
        };
        link.transport.add_track(track).await?;
        info!("Local track set changed, renegotiating");
        self.make_offer().await
    }

    /// Stops local tracks, closes the link and forgets all negotiation state.
    pub async fn close(&mut self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.local_stream.stop();
        self.close_link().await;
        self.remote_id = None;
        self.role = None;
        self.set_state(ConnectionState::Closed);
        info!("Negotiation for room {} closed", self.room_id);
    }

    async fn on_link_state(&mut self, state: LinkConnectionState) -> Option<LinkUpdate> {
        match state {
            LinkConnectionState::Connected => {
                self.answer_deadline = None;
                self.set_state(ConnectionState::Connected);
                info!("Link to {:?} connected", self.remote_id);
                Some(LinkUpdate::Connected)
            }
            LinkConnectionState::Disconnected | LinkConnectionState::Failed => {
                let lost = if state == LinkConnectionState::Failed {
                    ConnectionState::Failed
                } else {
                    ConnectionState::Disconnected
                };
                warn!("Link to {:?} is {}", self.remote_id, lost);
                self.set_state(lost);
                self.close_link().await;

                if self.is_initiator() {
                    let leave = SignalEvent::LeaveRoom {
                        room_id: self.room_id.clone(),
                    };
                    if let Err(e) = self.signaling.send(leave).await {
                        warn!("Could not announce leave-room: {}", e);
                    }
                }
                Some(LinkUpdate::Lost(lost))
            }
            _ => None,
        }
    }

    async fn ensure_link(&mut self) -> Result<(), NegotiationError> {
        if self.link.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(TRANSPORT_EVENT_CAPACITY);
        let transport = self.factory.create(tx).await?;
        for track in self.local_stream.tracks() {
            transport.add_track(track.clone()).await?;
        }
        info!(
            "Created peer link with {} local track(s) for room {}",
            self.local_stream.tracks().len(),
            self.room_id
        );

        self.link = Some(PeerLink {
            transport,
            events: rx,
            remote_stream: None,
            has_remote_description: false,
        });
        Ok(())
    }

    async fn close_link(&mut self) {
        self.making_offer = false;
        self.initiate_at = None;
        self.answer_deadline = None;
        self.pending.clear();
        if let Some(link) = self.link.take() {
            if let Err(e) = link.transport.close().await {
                warn!("Error while closing peer link: {:#}", e);
            }
        }
    }

    fn drop_link(&mut self) {
        self.making_offer = false;
        self.initiate_at = None;
        self.answer_deadline = None;
        self.pending.clear();
        if let Some(link) = self.link.take() {
            tokio::spawn(async move {
                let _ = link.transport.close().await;
            });
        }
    }

    fn current_transport(&self) -> Result<Arc<dyn PeerTransport>, NegotiationError> {
        self.link
            .as_ref()
            .map(|l| l.transport.clone())
            .ok_or(NegotiationError::NoLink)
    }

    fn mark_remote_description(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.has_remote_description = true;
        }
    }

    async fn flush_candidates(&mut self, transport: &dyn PeerTransport) {
        let queued = self.pending.drain();
        if queued.is_empty() {
            return;
        }
        debug!("Applying {} queued ICE candidate(s)", queued.len());
        for candidate in queued {
            if let Err(e) = transport.add_ice_candidate(candidate).await {
                warn!("Queued ICE candidate rejected: {:#}", e);
            }
        }
    }

    fn is_polite(&self) -> bool {
        self.role.is_none_or(|r| r.is_polite())
    }

    fn enter_negotiating(&mut self) {
        if self.state() != ConnectionState::Connected {
            self.set_state(ConnectionState::Negotiating);
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Connection state {} -> {}", previous, next);
        }
    }
}

async fn recv_or_pending(events: Option<&mut mpsc::Receiver<TransportEvent>>) -> TransportEvent {
    match events {
        Some(rx) => match rx.recv().await {
            Some(event) => event,
            None => pending().await,
        },
        None => pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
