//! Console connection: dial + auth, the read loop, and reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use pt_domain::error::{Error, Result};
use pt_domain::models::PowerSignal;
use pt_domain::trace::TraceEvent;
use pt_protocol::{decode_event, Event, Frame};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::reconnect::ReconnectPolicy;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Bound on one reconnect dial plus its auth frame.
const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on a single outbound write.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on closing a dead stream before the first back-off sleep.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest inbound message the console accepts.
const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Why the read loop stopped.
enum Exit {
    Closed,
    ReceiverDropped,
    StreamFailed,
    ReconnectExhausted,
}

impl Exit {
    fn as_str(&self) -> &'static str {
        match self {
            Exit::Closed => "closed",
            Exit::ReceiverDropped => "event receiver dropped",
            Exit::StreamFailed => "stream failed",
            Exit::ReconnectExhausted => "reconnect attempts exhausted",
        }
    }
}

/// State shared between the public handles and the read-loop task.
struct Shared {
    socket_url: String,
    token: String,
    policy: ReconnectPolicy,
    /// Live write half. `None` while disconnected or reconnecting.
    sink: RwLock<Option<Arc<Mutex<WsSink>>>>,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    /// Dial the socket, send the auth frame and install the new write half.
    async fn dial(&self) -> Result<WsSource> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_MESSAGE_SIZE);
        config.max_frame_size = Some(MAX_MESSAGE_SIZE);

        let url = self.socket_url.as_str();
        let (ws, _response) = tokio_tungstenite::connect_async_with_config(url, Some(config), false)
            .await
            .map_err(|e| Error::WebSocket(format!("failed to dial websocket: {e}")))?;
        let (mut sink, source) = ws.split();

        let auth = Frame::auth(&self.token).to_json();
        if let Err(e) = sink.send(Message::Text(auth)).await {
            let _ = sink.close().await;
            return Err(Error::WebSocket(format!("failed to send auth frame: {e}")));
        }

        *self.sink.write() = Some(Arc::new(Mutex::new(sink)));
        Ok(source)
    }

    /// Tear down a failed session: flush any pending close reply on the
    /// write half, then drop both halves so the socket is released.
    async fn teardown(&self, dead: WsSource) {
        let sink = self.sink.write().take();
        if let Some(sink) = sink {
            let _ = tokio::time::timeout(TEARDOWN_TIMEOUT, async {
                let _ = sink.lock().await.close().await;
            })
            .await;
        }
        drop(dead);
    }

    /// Send a normal-closure frame on the current write half, if any, and
    /// drop it.
    async fn shutdown_sink(&self) {
        let sink = self.sink.write().take();
        let Some(sink) = sink else { return };

        let mut sink = sink.lock().await;
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        let _ = tokio::time::timeout(SEND_TIMEOUT, async {
            let _ = sink.send(Message::Close(Some(frame))).await;
            let _ = sink.close().await;
        })
        .await;
    }

    /// Close the dead session, then redial with back-off.
    ///
    /// Returns the new read half, or `None` when reconnection is disabled,
    /// the attempt budget is spent, or the connection was closed meanwhile.
    /// The attempt counter starts from zero on every call.
    async fn reconnect(&self, dead: WsSource) -> Option<WsSource> {
        if !self.policy.enabled {
            return None;
        }

        self.reconnecting.store(true, Ordering::SeqCst);
        self.teardown(dead).await;

        let mut attempt: u32 = 0;
        let source = loop {
            if self.policy.should_give_up(attempt) {
                tracing::warn!(
                    socket_url = %self.socket_url,
                    attempts = attempt,
                    "giving up on console reconnect"
                );
                break None;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            TraceEvent::StreamReconnecting {
                socket_url: self.socket_url.clone(),
                attempt: attempt + 1,
                delay_ms: delay.as_millis() as u64,
            }
            .emit();

            let slept = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                _ = tokio::time::sleep(delay) => true,
            };
            if !slept {
                break None;
            }
            attempt += 1;

            let dialed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                r = tokio::time::timeout(DIAL_TIMEOUT, self.dial()) => Some(r),
            };
            match dialed {
                None => break None,
                Some(Ok(Ok(source))) => {
                    tracing::info!(
                        socket_url = %self.socket_url,
                        attempts = attempt,
                        "console reconnected"
                    );
                    TraceEvent::StreamReconnected {
                        socket_url: self.socket_url.clone(),
                        attempts: attempt,
                    }
                    .emit();
                    break Some(source);
                }
                Some(Ok(Err(e))) => {
                    tracing::warn!(
                        socket_url = %self.socket_url,
                        attempt,
                        error = %e,
                        "reconnect failed"
                    );
                }
                Some(Err(_)) => {
                    tracing::warn!(socket_url = %self.socket_url, attempt, "reconnect timed out");
                }
            }
        };

        self.reconnecting.store(false, Ordering::SeqCst);
        source
    }
}

/// What one turn of the read loop produced.
enum Step {
    Frame(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
    Cancelled,
}

async fn read_loop(shared: Arc<Shared>, mut source: WsSource, events: mpsc::Sender<Event>) {
    let exit = loop {
        let step = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => Step::Cancelled,
            msg = source.next() => Step::Frame(msg),
        };

        let failure = match step {
            Step::Cancelled => break Exit::Closed,
            Step::Frame(Some(Ok(Message::Text(text)))) => {
                let Some(event) = decode_event(&text) else { continue };
                let delivered = tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => None,
                    sent = events.send(event) => Some(sent.is_ok()),
                };
                match delivered {
                    None => break Exit::Closed,
                    Some(false) => break Exit::ReceiverDropped,
                    Some(true) => continue,
                }
            }
            Step::Frame(Some(Ok(Message::Close(frame)))) => {
                format!("server closed the connection: {frame:?}")
            }
            Step::Frame(Some(Ok(_))) => continue,
            Step::Frame(Some(Err(e))) => e.to_string(),
            Step::Frame(None) => "stream ended".to_owned(),
        };

        if shared.cancel.is_cancelled() {
            break Exit::Closed;
        }
        tracing::warn!(socket_url = %shared.socket_url, error = %failure, "console stream failed");

        if !shared.policy.enabled {
            break Exit::StreamFailed;
        }
        match shared.reconnect(source).await {
            Some(next) => source = next,
            None if shared.cancel.is_cancelled() => break Exit::Closed,
            None => break Exit::ReconnectExhausted,
        }
    };

    shared.shutdown_sink().await;
    tracing::info!(
        socket_url = %shared.socket_url,
        reason = exit.as_str(),
        "console stream closed"
    );
    TraceEvent::StreamClosed {
        socket_url: shared.socket_url.clone(),
        reason: exit.as_str().to_owned(),
    }
    .emit();
    // Dropping `events` here closes the consumer's channel.
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public handles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cloneable control handle for a [`Connection`].
///
/// Handles send frames and close the connection; only the owning
/// [`Connection`] receives events.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("socket_url", &self.shared.socket_url)
            .field("reconnecting", &self.is_reconnecting())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.send_frame(Frame::send_command(command)).await
    }

    pub async fn set_state(&self, signal: PowerSignal) -> Result<()> {
        self.send_frame(Frame::set_state(signal)).await
    }

    /// Write one frame on the live socket.
    ///
    /// Fails with [`Error::ConnectionClosed`] while disconnected, including
    /// during a reconnect and after [`close`](Self::close).
    pub async fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let sink = self
            .shared
            .sink
            .read()
            .clone()
            .ok_or(Error::ConnectionClosed)?;

        let mut sink = sink.lock().await;
        tokio::time::timeout(SEND_TIMEOUT, sink.send(Message::Text(frame.to_json())))
            .await
            .map_err(|_| Error::Timeout("websocket write timed out".into()))?
            .map_err(|e| Error::WebSocket(format!("failed to send frame: {e}")))
    }

    /// Stop the read loop and close the socket. Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.cancel.cancel();
        self.shared.shutdown_sink().await;
    }

    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnecting.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst) || self.shared.cancel.is_cancelled()
    }

    pub fn socket_url(&self) -> &str {
        &self.shared.socket_url
    }
}

/// A live console connection and its event channel.
///
/// Events arrive in wire order on a bounded channel. The channel closes
/// when the connection is closed, when the stream fails with reconnection
/// disabled, or when reconnect attempts are exhausted. Dropping the
/// `Connection` stops the read loop.
pub struct Connection {
    handle: ConnectionHandle,
    events: mpsc::Receiver<Event>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Dial `socket_url`, authenticate with `token` and start reading.
    ///
    /// `None` for `policy` disables reconnection. A failure of this first
    /// dial is returned to the caller and never retried.
    pub async fn connect(
        socket_url: impl Into<String>,
        token: impl Into<String>,
        policy: Option<ReconnectPolicy>,
    ) -> Result<Self> {
        Self::connect_with_buffer(socket_url, token, policy, DEFAULT_EVENT_BUFFER).await
    }

    pub async fn connect_with_buffer(
        socket_url: impl Into<String>,
        token: impl Into<String>,
        policy: Option<ReconnectPolicy>,
        event_buffer: usize,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            socket_url: socket_url.into(),
            token: token.into(),
            policy: policy.unwrap_or_else(ReconnectPolicy::disabled),
            sink: RwLock::new(None),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        let source = shared.dial().await?;
        tracing::info!(
            socket_url = %shared.socket_url,
            reconnect = shared.policy.enabled,
            "console connected"
        );

        let (tx, rx) = mpsc::channel(event_buffer.max(1));
        tokio::spawn(read_loop(shared.clone(), source, tx));

        Ok(Self {
            handle: ConnectionHandle { shared },
            events: rx,
        })
    }

    /// Next event, or `None` once the channel is closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.events
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.handle.send_command(command).await
    }

    pub async fn set_state(&self, signal: PowerSignal) -> Result<()> {
        self.handle.set_state(signal).await
    }

    pub async fn close(&self) {
        self.handle.close().await
    }

    pub fn is_reconnecting(&self) -> bool {
        self.handle.is_reconnecting()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.handle.shared.closed.store(true, Ordering::SeqCst);
        self.handle.shared.cancel.cancel();
    }
}
