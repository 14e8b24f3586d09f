//! The call session actor.
//!
//! Everything that mutates the peer link or the local capture happens inside
//! [`CallSession::run`]: handle commands, relay messages, transport events and
//! internal timers arrive on separate channels and are processed one at a
//! time.

use crate::api::{ChunkStorage, TakeProvider};
use crate::capture::{CaptureBackend, MeetingConfig, open_call_stream, open_with_fallback};
use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaController, TrackState};
use crate::negotiation::{LinkUpdate, Negotiator, NegotiatorEvent};
use crate::recording::{RecordingOrigin, RecordingPipeline, UploadQueue};
use crate::session::session_command::SessionCommand;
use crate::session::session_event::{CallEndReason, SessionEvent, SessionSnapshot};
use crate::session::session_handle::SessionHandle;
use crate::signaling::{ChannelEvent, SignalingOutput};
use crate::transport::TransportFactory;
use duet_core::utils::MAX_ROOM_USERS;
use duet_core::{MediaKind, ParticipantId, RoomId, SignalEvent, TakeId};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

const COMMAND_CAPACITY: usize = 100;
const EVENT_CAPACITY: usize = 256;

/// Everything a session needs from the outside world.
pub struct SessionContext {
    pub local_id: ParticipantId,
    pub capture: Arc<dyn CaptureBackend>,
    pub transports: Arc<dyn TransportFactory>,
    pub signaling: Arc<dyn SignalingOutput>,
    /// Inbound relay traffic, usually [`SignalingChannel::subscribe`](crate::signaling::SignalingChannel::subscribe).
    pub inbound: broadcast::Receiver<ChannelEvent>,
    pub takes: Arc<dyn TakeProvider>,
    pub storage: Arc<dyn ChunkStorage>,
    pub config: ClientConfig,
}

#[derive(Debug)]
enum Internal {
    DisplayEnded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct CallSession {
    room_id: RoomId,
    local_id: ParticipantId,
    participants: Vec<ParticipantId>,
    capture: Arc<dyn CaptureBackend>,
    signaling: Arc<dyn SignalingOutput>,
    negotiator: Negotiator,
    media: MediaController,
    recording: RecordingPipeline,
    commands: mpsc::Receiver<SessionCommand>,
    inbound: broadcast::Receiver<ChannelEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    events: broadcast::Sender<SessionEvent>,
    ended: bool,
}

impl CallSession {
    /// Acquires the call stream, announces the join and starts the session
    /// loop.
    ///
    /// Nothing is left running when this fails: a capture error means the
    /// session never starts, a signaling error releases the capture again.
    pub async fn join(
        ctx: SessionContext,
        room_id: RoomId,
        meeting: &MeetingConfig,
    ) -> SessionResult<(SessionHandle, broadcast::Receiver<SessionEvent>)> {
        let SessionContext {
            local_id,
            capture,
            transports,
            signaling,
            inbound,
            takes,
            storage,
            config,
        } = ctx;

        let mut negotiator = Negotiator::new(
            local_id.clone(),
            room_id.clone(),
            transports,
            signaling.clone(),
            config.negotiation.clone(),
        );
        negotiator.begin_gathering();

        capture.request_permission().await?;
        let stream = open_call_stream(capture.as_ref(), meeting).await?;
        info!(
            "Call stream ready for room {}: {} track(s)",
            room_id,
            stream.tracks().len()
        );

        let mut media = MediaController::new(capture.clone());
        media.sync_with(&stream);
        negotiator.attach_local_stream(stream.clone());

        if let Err(e) = signaling
            .send(SignalEvent::JoinRoom {
                room_id: room_id.clone(),
            })
            .await
        {
            error!("Could not join room {}: {}", room_id, e);
            stream.stop();
            return Err(SessionError::Signaling(e));
        }
        info!("{} joining room {}", local_id, room_id);

        let queue = UploadQueue::new(
            room_id.clone(),
            local_id.clone(),
            storage,
            &config.recording,
        );
        let recording = RecordingPipeline::new(
            room_id.clone(),
            takes,
            signaling.clone(),
            queue.clone(),
            config.recording.clone(),
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, events_rx) = broadcast::channel(EVENT_CAPACITY);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let handle = SessionHandle::new(
            room_id.clone(),
            local_id.clone(),
            command_tx,
            events.clone(),
            negotiator.watch_state(),
            queue,
        );

        let session = Self {
            room_id,
            local_id,
            participants: Vec::new(),
            capture,
            signaling,
            negotiator,
            media,
            recording,
            commands: command_rx,
            inbound,
            internal_tx,
            internal_rx,
            events,
            ended: false,
        };
        tokio::spawn(session.run());

        Ok((handle, events_rx))
    }

    pub async fn run(mut self) {
        info!("Session loop for room {} started", self.room_id);

        loop {
            let flow = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(c) => self.handle_command(c).await,
                    None => {
                        info!("All session handles dropped, leaving room {}", self.room_id);
                        self.shutdown(CallEndReason::Left, true).await;
                        Flow::Stop
                    }
                },

                msg = self.inbound.recv() => match msg {
                    Ok(event) => self.handle_channel_event(event).await,
                    Err(RecvError::Lagged(n)) => {
                        warn!("Session fell behind the relay, {} message(s) skipped", n);
                        Flow::Continue
                    }
                    Err(RecvError::Closed) => {
                        warn!("Signaling channel dropped");
                        self.shutdown(CallEndReason::SignalingLost, false).await;
                        Flow::Stop
                    }
                },

                evt = self.negotiator.next_event() => self.handle_negotiator_event(evt).await,

                Some(internal) = self.internal_rx.recv() => self.handle_internal(internal).await,
            };

            if flow == Flow::Stop {
                break;
            }
        }

        info!("Session loop for room {} finished", self.room_id);
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> Flow {
        match cmd {
            SessionCommand::Toggle { kind, reply } => {
                let enabled = self
                    .media
                    .toggle(self.negotiator.local_stream(), kind);
                self.announce_media().await;
                let _ = reply.send(enabled);
            }

            SessionCommand::StartScreenShare { reply } => {
                let result = self.start_screen_share().await;
                let _ = reply.send(result);
            }

            SessionCommand::StopScreenShare { reply } => {
                let result = self
                    .media
                    .stop_screen_share(self.negotiator.local_stream(), self.negotiator.transport())
                    .await;
                if matches!(result, Ok(true)) {
                    self.announce_media().await;
                }
                let _ = reply.send(result);
            }

            SessionCommand::StartRecording { reply } => {
                let result = self
                    .recording
                    .start(self.negotiator.local_stream())
                    .await
                    .map_err(SessionError::from);
                if let Ok(take_id) = &result {
                    self.emit(SessionEvent::RecordingStarted {
                        take_id: take_id.clone(),
                        origin: RecordingOrigin::Local,
                    });
                }
                let _ = reply.send(result);
            }

            SessionCommand::StopRecording { reply } => {
                let result = self.recording.stop().await.map_err(SessionError::from);
                if let Ok(take_id) = &result {
                    self.emit(SessionEvent::RecordingStopped {
                        take_id: take_id.clone(),
                    });
                }
                let _ = reply.send(result);
            }

            SessionCommand::AddTrack {
                kind,
                device_id,
                reply,
            } => {
                let result = self.add_track(kind, device_id.as_deref()).await;
                let _ = reply.send(result);
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            SessionCommand::Leave { reply } => {
                self.shutdown(CallEndReason::Left, true).await;
                let _ = reply.send(());
                return Flow::Stop;
            }

            SessionCommand::EndCall { reply } => {
                self.send(SignalEvent::EndCall {
                    room_id: self.room_id.clone(),
                })
                .await;
                self.shutdown(CallEndReason::Ended, true).await;
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) -> Flow {
        match event {
            ChannelEvent::Message(signal) => self.handle_signal(signal).await,
            ChannelEvent::Disconnected => {
                warn!("Relay connection lost during call in room {}", self.room_id);
                self.emit(SessionEvent::SignalingDisconnected);
                Flow::Continue
            }
            ChannelEvent::Reconnected { attempt } => {
                info!("Relay back after {} attempt(s), re-joining {}", attempt, self.room_id);
                self.send(SignalEvent::JoinRoom {
                    room_id: self.room_id.clone(),
                })
                .await;
                self.announce_media().await;
                self.emit(SessionEvent::SignalingReconnected);
                Flow::Continue
            }
            ChannelEvent::ReconnectFailed { attempts } => {
                error!("Relay unreachable after {} attempts", attempts);
                self.shutdown(CallEndReason::SignalingLost, false).await;
                Flow::Stop
            }
        }
    }

    async fn handle_signal(&mut self, signal: SignalEvent) -> Flow {
        match signal {
            SignalEvent::UserJoined { users, user_id } => {
                if users.len() > MAX_ROOM_USERS {
                    warn!(
                        "Room {} reports {} participants; only one remote is used",
                        self.room_id,
                        users.len()
                    );
                }
                self.participants = users.clone();
                if let Some(remote) = self.negotiator.on_user_joined(&users, &user_id) {
                    if let Some(role) = self.negotiator.role() {
                        self.emit(SessionEvent::RemoteJoined {
                            participant_id: remote,
                            role,
                        });
                    }
                }
            }

            SignalEvent::UserLeft { user_id } => {
                self.participants.retain(|p| *p != user_id);
                if self.negotiator.on_user_left(&user_id).await {
                    if let Err(e) = self
                        .media
                        .stop_screen_share(self.negotiator.local_stream(), None)
                        .await
                    {
                        warn!("Could not stop screen share: {}", e);
                    }
                    self.media.reset_remote();
                    self.emit(SessionEvent::RemoteLeft {
                        participant_id: user_id,
                    });
                }
            }

            SignalEvent::JoinError { error } => {
                warn!("Join of room {} rejected: {}", self.room_id, error);
                self.shutdown(CallEndReason::JoinRejected(error), false)
                    .await;
                return Flow::Stop;
            }

            SignalEvent::Offer {
                sdp, from_user_id, ..
            } => {
                if from_user_id.as_ref() == Some(&self.local_id) {
                    return Flow::Continue;
                }
                match self.negotiator.on_remote_offer(from_user_id, sdp).await {
                    Ok(outcome) => debug!("Remote offer handled: {:?}", outcome),
                    Err(e) => warn!("Remote offer discarded: {}", e),
                }
            }

            SignalEvent::Answer {
                sdp, from_user_id, ..
            } => {
                if from_user_id.as_ref() == Some(&self.local_id) {
                    return Flow::Continue;
                }
                if let Err(e) = self.negotiator.on_remote_answer(sdp).await {
                    warn!("Remote answer discarded: {}", e);
                }
            }

            SignalEvent::IceCandidate {
                candidate,
                from_user_id,
                ..
            } => {
                if from_user_id.as_ref() == Some(&self.local_id) {
                    return Flow::Continue;
                }
                if let Err(e) = self.negotiator.on_remote_candidate(candidate).await {
                    warn!("Remote ICE candidate rejected: {}", e);
                }
            }

            SignalEvent::MediaStateChange {
                media_state,
                user_id,
                ..
            } => {
                if self
                    .media
                    .on_remote_announcement(&self.local_id, &user_id, media_state)
                {
                    self.emit(SessionEvent::RemoteMedia(self.media.remote_state()));
                }
            }

            SignalEvent::StartRecording { take_id, .. } => self.follow_remote_recording(take_id),

            SignalEvent::StopRecording { .. } => {
                if self.recording.origin() == Some(RecordingOrigin::Remote) {
                    match self.recording.stop().await {
                        Ok(take_id) => self.emit(SessionEvent::RecordingStopped { take_id }),
                        Err(e) => warn!("Could not stop followed recording: {}", e),
                    }
                }
            }

            SignalEvent::CallEnded { .. } => {
                info!("Call in room {} was ended", self.room_id);
                self.shutdown(CallEndReason::EndedRemotely, true).await;
                return Flow::Stop;
            }

            other @ (SignalEvent::JoinRoom { .. }
            | SignalEvent::LeaveRoom { .. }
            | SignalEvent::EndCall { .. }) => {
                debug!("Ignoring server-bound event {}", other.name());
            }
        }
        Flow::Continue
    }

    async fn handle_negotiator_event(&mut self, event: NegotiatorEvent) -> Flow {
        match self.negotiator.handle_event(event).await {
            Ok(Some(LinkUpdate::Connected)) => {
                self.emit(SessionEvent::Connected);
                // The remote side has no idea about our lobby toggles yet.
                self.announce_media().await;
            }
            Ok(Some(LinkUpdate::RemoteTrack(track))) => {
                self.emit(SessionEvent::RemoteTrack { kind: track.kind });
            }
            Ok(Some(LinkUpdate::Lost(state))) => {
                self.shutdown(CallEndReason::LinkLost(state), false).await;
                return Flow::Stop;
            }
            Ok(None) => {}
            Err(e) => warn!("Negotiation step failed: {}", e),
        }
        Flow::Continue
    }

    async fn handle_internal(&mut self, internal: Internal) -> Flow {
        match internal {
            Internal::DisplayEnded(track_id) => {
                match self
                    .media
                    .on_display_ended(
                        &track_id,
                        self.negotiator.local_stream(),
                        self.negotiator.transport(),
                    )
                    .await
                {
                    Ok(true) => {
                        self.announce_media().await;
                        self.emit(SessionEvent::ScreenShareEnded);
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Could not restore camera after screen share: {}", e),
                }
            }
        }
        Flow::Continue
    }

    async fn start_screen_share(&mut self) -> SessionResult<()> {
        if self.media.is_screen_sharing() {
            return Ok(());
        }
        let display = self
            .media
            .start_screen_share(self.negotiator.transport())
            .await?;

        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            if display.finished().await == TrackState::Ended {
                let _ = tx.send(Internal::DisplayEnded(display.id().to_owned()));
            }
        });

        self.announce_media().await;
        Ok(())
    }

    async fn add_track(&mut self, kind: MediaKind, device_id: Option<&str>) -> SessionResult<()> {
        if self.negotiator.local_stream().has(kind) {
            return Err(SessionError::TrackExists(kind));
        }

        let track = open_with_fallback(self.capture.as_ref(), kind, device_id).await?;
        track.set_enabled(self.media.is_enabled(kind));
        info!("Adding {} track {} to the call", kind, track.id());
        self.negotiator.add_local_track(track).await?;
        Ok(())
    }

    fn follow_remote_recording(&mut self, take_id: Option<TakeId>) {
        if !self.recording.follows_remote() {
            return;
        }
        let Some(take_id) = take_id else {
            warn!("start-recording without a take id, not following");
            return;
        };
        if self.recording.is_recording() {
            debug!("Already recording, ignoring remote start for take {}", take_id);
            return;
        }

        match self
            .recording
            .join_take(self.negotiator.local_stream(), take_id.clone())
        {
            Ok(()) => self.emit(SessionEvent::RecordingStarted {
                take_id,
                origin: RecordingOrigin::Remote,
            }),
            Err(e) => warn!("Could not follow remote recording: {}", e),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let sender_track_ids = self
            .negotiator
            .transport()
            .map(|t| {
                [MediaKind::Audio, MediaKind::Video]
                    .into_iter()
                    .filter_map(|kind| t.sender_track_id(kind).map(|id| (kind, id)))
                    .collect()
            })
            .unwrap_or_default();

        SessionSnapshot {
            room_id: self.room_id.clone(),
            local_id: self.local_id.clone(),
            remote_id: self.negotiator.remote_id().cloned(),
            participants: self.participants.clone(),
            connection_state: self.negotiator.state(),
            role: self.negotiator.role(),
            local_media: self.media.announcement(),
            remote_media: self.media.remote_state(),
            has_remote_stream: self.negotiator.remote_stream().is_some(),
            sender_track_ids,
            recording: self.recording.current_take().cloned(),
        }
    }

    /// Stops recording, capture and link. `notify` sends `leave-room`.
    async fn shutdown(&mut self, reason: CallEndReason, notify: bool) {
        if self.ended {
            return;
        }
        self.ended = true;

        if self.recording.is_recording() {
            if let Err(e) = self.recording.stop().await {
                warn!("Could not stop recording on shutdown: {}", e);
            }
        }
        self.media.release();

        if notify {
            self.send(SignalEvent::LeaveRoom {
                room_id: self.room_id.clone(),
            })
            .await;
        }
        self.negotiator.close().await;

        info!("Session in room {} ended: {:?}", self.room_id, reason);
        self.emit(SessionEvent::CallEnded(reason));
    }

    async fn announce_media(&mut self) {
        let announcement = self.media.announcement();
        self.send(SignalEvent::MediaStateChange {
            room_id: self.room_id.clone(),
            media_state: announcement,
            user_id: self.local_id.clone(),
        })
        .await;
        self.emit(SessionEvent::LocalMedia(announcement));
    }

    async fn send(&self, event: SignalEvent) {
        let name = event.name();
        if let Err(e) = self.signaling.send(event).await {
            warn!("Could not send {}: {}", name, e);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
