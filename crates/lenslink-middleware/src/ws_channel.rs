//! WebSocket implementation of [`MessageChannel`].
//!
//! [`WsChannel`] dials a `ws://host:port` endpoint with `tokio-tungstenite`,
//! keeps the write half behind an async mutex for sends, and spawns a
//! reader task that turns inbound frames into [`ChannelEvent`]s.
//!
//! Closing never waits on a stalled peer: `close()` raises a signal that
//! pre-empts any pending send, and the close handshake is bounded by
//! [`CLOSE_TIMEOUT`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use lenslink_types::{ChannelState, LinkError};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelFactory, EVENT_CAPACITY, MessageChannel, OutboundMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// URL scheme accepted by [`WsChannelFactory`].
pub const WS_SCHEME: &str = "ws://";

/// Upper bound on the close handshake.  Past it the socket is dropped.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ────────────────────────────────────────────────────────────────────────────
// Shared state (channel + reader task)
// ────────────────────────────────────────────────────────────────────────────

struct Shared {
    state: Mutex<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
    writer: AsyncMutex<Option<WsSink>>,
    /// `true` once a close is under way; pending sends give up the writer.
    closing: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn set_state(&self, next: ChannelState) {
        *self.state.lock() = next;
    }

    /// Move to `Closed` and emit [`ChannelEvent::Closed`] exactly once.
    fn mark_closed(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ChannelState::Closed);
        if previous != ChannelState::Closed {
            self.emit(ChannelEvent::Closed);
        }
    }

    fn emit(&self, event: ChannelEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Pre-empt pending sends, then take the write half and finish the
    /// close handshake within [`CLOSE_TIMEOUT`].
    async fn shutdown_writer(&self) -> Result<(), LinkError> {
        self.closing.send_replace(true);
        let Some(mut sink) = self.writer.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LinkError::ChannelError(format!("close failed: {e}"))),
            Err(_) => Err(LinkError::ChannelError(format!(
                "close handshake timed out after {CLOSE_TIMEOUT:?}"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// WsChannel
// ────────────────────────────────────────────────────────────────────────────

/// WebSocket client channel.
pub struct WsChannel {
    url: String,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsChannel {
    /// Create a closed channel targeting `url`.  Nothing is dialled until
    /// [`connect`][MessageChannel::connect].
    pub fn new(url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (closing, _) = watch::channel(false);
        Self {
            url: url.into(),
            shared: Arc::new(Shared {
                state: Mutex::new(ChannelState::Closed),
                events,
                writer: AsyncMutex::new(None),
                closing,
            }),
            reader: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MessageChannel for WsChannel {
    fn url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> ChannelState {
        self.shared.state()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    async fn connect(&self) -> Result<(), LinkError> {
        {
            let mut state = self.shared.state.lock();
            if *state != ChannelState::Closed {
                return Err(LinkError::ChannelError(format!(
                    "connect requested while {:?}",
                    *state
                )));
            }
            *state = ChannelState::Connecting;
        }
        self.shared.closing.send_replace(false);

        let (ws, _response) = match connect_async(self.url.as_str()).await {
            Ok(ok) => ok,
            Err(e) => {
                let msg = format!("connect to {} failed: {e}", self.url);
                self.shared.emit(ChannelEvent::Error(msg.clone()));
                self.shared.mark_closed();
                return Err(LinkError::ChannelError(msg));
            }
        };

        let (sink, stream) = ws.split();
        *self.shared.writer.lock().await = Some(sink);
        self.shared.set_state(ChannelState::Open);
        info!(url = %self.url, "websocket connected");
        self.shared.emit(ChannelEvent::Opened);

        let handle = tokio::spawn(read_loop(stream, Arc::clone(&self.shared)));
        if let Some(stale) = self.reader.lock().replace(handle) {
            stale.abort();
        }
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), LinkError> {
        let state = self.shared.state();
        if state != ChannelState::Open {
            return Err(LinkError::ChannelNotOpen(state));
        }

        let mut closing = self.shared.closing.subscribe();
        let mut writer = self.shared.writer.lock().await;
        let state = self.shared.state();
        let Some(sink) = writer.as_mut().filter(|_| state == ChannelState::Open) else {
            return Err(LinkError::ChannelNotOpen(state));
        };
        let frame = match message {
            OutboundMessage::Text(text) => Message::Text(text.into()),
            OutboundMessage::Binary(bytes) => Message::Binary(bytes.into()),
        };
        tokio::select! {
            sent = sink.send(frame) => sent.map_err(|e| {
                let msg = format!("send failed: {e}");
                self.shared.emit(ChannelEvent::Error(msg.clone()));
                LinkError::ChannelError(msg)
            }),
            _ = async { let _ = closing.wait_for(|closing| *closing).await; } => {
                debug!(url = %self.url, "pending send abandoned by close");
                Err(LinkError::ChannelNotOpen(self.shared.state()))
            }
        }
    }

    async fn close(&self) -> Result<(), LinkError> {
        if self.shared.state() == ChannelState::Closed {
            return Ok(());
        }
        self.shared.set_state(ChannelState::Closing);

        let result = self.shared.shutdown_writer().await;

        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.shared.mark_closed();
        debug!(url = %self.url, "websocket closed");
        result
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, shared: Arc<Shared>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                shared.emit(ChannelEvent::Message(text.as_str().as_bytes().to_vec()));
            }
            Ok(Message::Binary(bytes)) => {
                shared.emit(ChannelEvent::Message(bytes.to_vec()));
            }
            Ok(Message::Close(frame)) => {
                debug!(?frame, "websocket close frame received");
                shared.set_state(ChannelState::Closing);
                // Flushes the close reply tungstenite queued.
                if let Err(e) = shared.shutdown_writer().await {
                    debug!(error = %e, "close reply not delivered");
                }
                break;
            }
            // Ping/pong are answered by tungstenite itself.
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "websocket read error");
                shared.emit(ChannelEvent::Error(e.to_string()));
                break;
            }
        }
    }
    shared.mark_closed();
}

// ────────────────────────────────────────────────────────────────────────────
// Factory
// ────────────────────────────────────────────────────────────────────────────

/// Creates a fresh [`WsChannel`] per connect.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsChannelFactory;

impl ChannelFactory for WsChannelFactory {
    fn create(&self, url: &str) -> Result<Arc<dyn MessageChannel>, LinkError> {
        let host = url.strip_prefix(WS_SCHEME).ok_or_else(|| {
            LinkError::Config(format!("unsupported endpoint '{url}': expected {WS_SCHEME}host:port"))
        })?;
        if host.is_empty() {
            return Err(LinkError::Config(format!("endpoint '{url}' has no host")));
        }
        Ok(Arc::new(WsChannel::new(url)))
    }
}
