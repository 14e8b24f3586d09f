//! WebSocket connection to the relay server.
//!
//! One duplex socket carrying JSON text frames. The channel keeps no session
//! state: after a reconnect it only reports [`ChannelEvent::Reconnected`] and
//! the layers above announce themselves again. Nothing sent while
//! disconnected is buffered.

use crate::config::SignalingConfig;
use crate::error::SignalingError;
use crate::signaling::signaling_output::SignalingOutput;
use async_trait::async_trait;
use duet_core::{ParticipantId, SignalEvent};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The socket dropped; reconnection is being attempted.
    Disconnected,
    /// The socket is back after `attempt` tries.
    Reconnected { attempt: u32 },
    /// All reconnect attempts were used up. The channel stays down.
    ReconnectFailed { attempts: u32 },
    Message(SignalEvent),
}

pub struct SignalingChannel {
    url: String,
    config: SignalingConfig,
    state: watch::Sender<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    closed: AtomicBool,
}

impl SignalingChannel {
    pub fn new(config: SignalingConfig, participant_id: &ParticipantId) -> Arc<Self> {
        let url = format!("{}/{}", config.url.trim_end_matches('/'), participant_id);
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            url,
            config,
            state,
            events,
            outbound: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection_state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Typed stream of everything the relay sends, plus connection changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    /// Opens the socket and starts the background supervisor.
    ///
    /// Fails with [`SignalingError::ConnectTimeout`] when the relay does not
    /// accept the connection within the configured timeout.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SignalingError> {
        if self.connection_state() != ChannelState::Disconnected {
            return Ok(());
        }
        self.closed.store(false, Ordering::SeqCst);

        info!("Connecting to signaling server: {}", self.url);
        let stream = match self.dial().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Signaling connect failed: {}", e);
                self.state.send_replace(ChannelState::Disconnected);
                return Err(e);
            }
        };
        info!("Connected to signaling server");

        let rx = self.attach();
        self.state.send_replace(ChannelState::Connected);
        tokio::spawn(self.clone().supervise(stream, rx));
        Ok(())
    }

    /// Closes the socket for good. No reconnect follows.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender ends the pump, which sends a close frame.
        self.outbound.lock().take();
        self.state.send_replace(ChannelState::Disconnected);
        info!("Signaling channel closed");
    }

    async fn dial(&self) -> Result<WsStream, SignalingError> {
        self.state.send_replace(ChannelState::Connecting);
        match tokio::time::timeout(self.config.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((stream, _))) => Ok(stream),
            Ok(Err(e)) => Err(SignalingError::WebSocket(e)),
            Err(_) => Err(SignalingError::ConnectTimeout {
                url: self.url.clone(),
                timeout_ms: self.config.connect_timeout.as_millis() as u64,
            }),
        }
    }

    fn attach(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        rx
    }

    async fn supervise(self: Arc<Self>, stream: WsStream, rx: mpsc::UnboundedReceiver<Message>) {
        let mut next = Some((stream, rx));

        while let Some((stream, rx)) = next.take() {
            self.pump(stream, rx).await;
            self.outbound.lock().take();

            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            self.state.send_replace(ChannelState::Disconnected);
            let _ = self.events.send(ChannelEvent::Disconnected);
            warn!("Signaling connection lost, reconnecting");

            next = self.reconnect().await;
        }

        debug!("Signaling supervisor terminated");
    }

    async fn reconnect(&self) -> Option<(WsStream, mpsc::UnboundedReceiver<Message>)> {
        let attempts = self.config.reconnect_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.reconnect_delay).await;
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            match self.dial().await {
                Ok(stream) => {
                    let rx = self.attach();
                    self.state.send_replace(ChannelState::Connected);
                    info!("Reconnected to signaling server after {} attempt(s)", attempt);
                    let _ = self.events.send(ChannelEvent::Reconnected { attempt });
                    return Some((stream, rx));
                }
                Err(e) => {
                    warn!("Reconnect attempt {}/{} failed: {}", attempt, attempts, e);
                    self.state.send_replace(ChannelState::Disconnected);
                }
            }
        }

        error!("Giving up on signaling server after {} attempts", attempts);
        let _ = self.events.send(ChannelEvent::ReconnectFailed { attempts });
        None
    }

    async fn pump(&self, stream: WsStream, mut rx: mpsc::UnboundedReceiver<Message>) {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Signaling socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("Signaling socket error: {}", e);
                        break;
                    }
                },
                outgoing = rx.recv() => match outgoing {
                    Some(msg) => {
                        if let Err(e) = write.send(msg).await {
                            error!("Failed to send signaling frame: {}", e);
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<SignalEvent>(text) {
            Ok(event) => {
                debug!("<- {}", event.name());
                let _ = self.events.send(ChannelEvent::Message(event));
            }
            Err(e) => warn!("Ignoring malformed signaling frame: {} ({})", e, text),
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingChannel {
    async fn send(&self, event: SignalEvent) -> Result<(), SignalingError> {
        let json = serde_json::to_string(&event)?;
        let guard = self.outbound.lock();
        let tx = guard.as_ref().ok_or(SignalingError::NotConnected)?;
        tx.send(Message::text(json))
            .map_err(|_| SignalingError::NotConnected)?;
        debug!("-> {}", event.name());
        Ok(())
    }
}
