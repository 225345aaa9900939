//! Host connection management.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deck::{LaunchArgs, OutboundMessage, Target};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::sink::HostSink;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What happened to an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the socket.
    Sent,
    /// Image held until the next flush.
    Queued,
    /// Not an image and the socket is not open.
    Dropped,
}

/// Something received from the host side of the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A text frame, unparsed.
    Frame(String),
    /// The socket closed or failed; emitted once per open.
    Closed,
}

/// An image frame waiting for the socket to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub context: String,
    pub image: String,
    pub target: Target,
}

impl PendingImage {
    fn into_message(self) -> OutboundMessage {
        OutboundMessage::SetImage {
            context: self.context,
            image: self.image,
            target: self.target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub connect_timeout: Duration,
    /// How often queued images are retried while the socket is open.
    pub flush_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            flush_interval: Duration::from_millis(5000),
        }
    }
}

struct Shared {
    state: RwLock<ConnectionState>,
    writer: Mutex<Option<WsWriter>>,
    pending: Mutex<VecDeque<PendingImage>>,
    /// Held for a whole drain so images leave in queue order.
    flushing: Mutex<()>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

/// Result of one drain of the pending queue.
#[derive(Debug, Clone, Copy)]
struct Flush {
    written: usize,
    stalled: bool,
}

impl Shared {
    async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn write_text(&self, text: String) -> Result<()> {
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer
            .send(Message::Text(text.into()))
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))
    }

    /// Send queued images in arrival order. Stops at the first failure, which
    /// goes back to the head of the queue.
    async fn flush_pending(&self) -> Flush {
        let _drain = self.flushing.lock().await;
        let mut flushed = 0;
        let mut stalled = false;
        loop {
            let Some(pending) = self.pending.lock().await.pop_front() else {
                break;
            };
            let message = pending.clone().into_message();
            let result = match message.to_text() {
                Ok(text) => self.write_text(text).await,
                Err(error) => Err(error.into()),
            };
            if let Err(error) = result {
                warn!(context = %pending.context, "pending image flush failed: {}", error);
                self.pending.lock().await.push_front(pending);
                stalled = true;
                break;
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!("flushed {} pending image(s)", flushed);
        }
        Flush {
            written: flushed,
            stalled,
        }
    }

    async fn hold(&self, message: OutboundMessage) -> SendOutcome {
        match message {
            OutboundMessage::SetImage {
                context,
                image,
                target,
            } => {
                debug!(context = %context, "queueing image until host connection opens");
                self.pending.lock().await.push_back(PendingImage {
                    context,
                    image,
                    target,
                });
                SendOutcome::Queued
            }
            other => {
                debug!(
                    "dropping {} frame, host connection not open",
                    other.event_name()
                );
                SendOutcome::Dropped
            }
        }
    }

    async fn stop_flush_task(&self) {
        if let Some(task) = self.flush_task.lock().await.take() {
            task.abort();
        }
    }
}

/// The plugin's WebSocket connection to the host.
pub struct HostConnection {
    endpoint: String,
    plugin_uuid: String,
    register_event: String,
    config: ConnectionConfig,
    shared: Arc<Shared>,
    incoming_tx: mpsc::UnboundedSender<HostEvent>,
    incoming_rx: Arc<Mutex<mpsc::UnboundedReceiver<HostEvent>>>,
    recv_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl HostConnection {
    /// Connection for the host described by the launch arguments.
    pub fn new(launch: &LaunchArgs) -> Self {
        Self::with_config(launch, ConnectionConfig::default())
    }

    pub fn with_config(launch: &LaunchArgs, config: ConnectionConfig) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        Self {
            endpoint: launch.endpoint(),
            plugin_uuid: launch.plugin_uuid.clone(),
            register_event: launch.register_event.clone(),
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(ConnectionState::Disconnected),
                writer: Mutex::new(None),
                pending: Mutex::new(VecDeque::new()),
                flushing: Mutex::new(()),
                flush_task: Mutex::new(None),
            }),
            incoming_tx,
            incoming_rx: Arc::new(Mutex::new(incoming_rx)),
            recv_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.shared.state().await
    }

    /// Images waiting for the socket, oldest first.
    pub async fn pending_images(&self) -> Vec<PendingImage> {
        self.shared.pending.lock().await.iter().cloned().collect()
    }

    /// Open the socket, register, flush queued images and start the
    /// background reader and keep-alive flush.
    pub async fn connect(&self) -> Result<()> {
        let mut state_guard = self.shared.state.write().await;
        if *state_guard == ConnectionState::Connected {
            return Err(ClientError::AlreadyConnected);
        }
        *state_guard = ConnectionState::Connecting;
        drop(state_guard);

        let register = OutboundMessage::Register {
            event: self.register_event.clone(),
            uuid: self.plugin_uuid.clone(),
        }
        .to_text();
        let register = match register {
            Ok(text) => text,
            Err(error) => {
                *self.shared.state.write().await = ConnectionState::Disconnected;
                return Err(error.into());
            }
        };

        let connect_result = timeout(
            self.config.connect_timeout,
            connect_async(self.endpoint.as_str()),
        )
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "connection timeout after {:?}",
                    self.config.connect_timeout
                ))
            })
            .and_then(|result| result.map_err(|error| ClientError::WebSocket(error.to_string())));

        let (stream, _response) = match connect_result {
            Ok(connected) => connected,
            Err(error) => {
                *self.shared.state.write().await = ConnectionState::Disconnected;
                return Err(error);
            }
        };

        // Stay `Connecting` until the backlog is out: images sent meanwhile
        // queue behind it.
        let (writer, mut reader) = stream.split();
        *self.shared.writer.lock().await = Some(writer);

        if let Err(error) = self.shared.write_text(register).await {
            self.shared.writer.lock().await.take();
            *self.shared.state.write().await = ConnectionState::Disconnected;
            return Err(error);
        }
        info!(endpoint = %self.endpoint, "registered with host");

        self.shared.flush_pending().await;
        {
            let mut state_guard = self.shared.state.write().await;
            self.shared.flush_pending().await;
            *state_guard = ConnectionState::Connected;
        }

        let shared = Arc::clone(&self.shared);
        let flush_interval = self.config.flush_interval;
        let flush_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if shared.state().await != ConnectionState::Connected {
                    break;
                }
                shared.flush_pending().await;
            }
        });
        *self.shared.flush_task.lock().await = Some(flush_task);

        let incoming_tx = self.incoming_tx.clone();
        let shared = Arc::clone(&self.shared);
        let endpoint = self.endpoint.clone();
        let task = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if incoming_tx
                            .send(HostEvent::Frame(text.as_str().to_string()))
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        debug!("received ping from {} ({} bytes)", endpoint, payload.len());
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Binary(_)) => {}
                    Ok(Message::Frame(_)) => {}
                    Err(error) => {
                        warn!("websocket read error on {}: {}", endpoint, error);
                        break;
                    }
                }
            }

            shared.stop_flush_task().await;
            shared.writer.lock().await.take();
            *shared.state.write().await = ConnectionState::Disconnected;
            info!(endpoint = %endpoint, "host connection closed");
            let _ = incoming_tx.send(HostEvent::Closed);
        });

        *self.recv_task.lock().await = Some(task);
        Ok(())
    }

    /// Close the socket and stop background tasks. Queued images are kept.
    pub async fn disconnect(&self) -> Result<()> {
        self.shared.stop_flush_task().await;

        if let Some(task) = self.recv_task.lock().await.take() {
            task.abort();
        }

        let writer = self.shared.writer.lock().await.take();
        *self.shared.state.write().await = ConnectionState::Disconnected;
        if let Some(mut writer) = writer {
            writer
                .send(Message::Close(None))
                .await
                .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        }
        Ok(())
    }

    /// Send a frame, or queue it when it is an image and the socket is not open.
    ///
    /// Images always pass through the pending queue so a fresh face can never
    /// overtake an older one still waiting to be flushed.
    pub async fn send(&self, message: OutboundMessage) -> Result<SendOutcome> {
        if self.state().await != ConnectionState::Connected {
            return Ok(self.shared.hold(message).await);
        }

        if message.is_image() {
            self.shared.hold(message).await;
            let flush = self.shared.flush_pending().await;
            return Ok(if flush.stalled {
                SendOutcome::Queued
            } else {
                SendOutcome::Sent
            });
        }

        let text = message.to_text()?;
        self.shared.write_text(text).await?;
        Ok(SendOutcome::Sent)
    }

    /// Retry queued images now. Returns how many were written.
    pub async fn flush_pending(&self) -> usize {
        if self.state().await != ConnectionState::Connected {
            return 0;
        }
        self.shared.flush_pending().await.written
    }

    /// Next event from the host. `None` once the connection is dropped.
    pub async fn recv(&self) -> Option<HostEvent> {
        self.incoming_rx.lock().await.recv().await
    }
}

#[async_trait]
impl HostSink for HostConnection {
    async fn send(&self, message: OutboundMessage) -> Result<SendOutcome> {
        HostConnection::send(self, message).await
    }
}
