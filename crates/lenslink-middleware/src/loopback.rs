//! In-memory channel for CI/CD testing without a network peer.
//!
//! [`LoopbackChannel`] implements [`MessageChannel`] entirely in process:
//! it records every message sent through it, lets tests inject inbound
//! messages and transport errors, can simulate slow or failing sends, and
//! tracks the highest number of sends that were ever in progress at once.
//!
//! # Example
//!
//! ```rust
//! use lenslink_middleware::channel::MessageChannel;
//! use lenslink_middleware::loopback::LoopbackChannel;
//! use lenslink_types::ChannelState;
//!
//! let ch = LoopbackChannel::new("loopback://test");
//! assert_eq!(ch.state(), ChannelState::Closed);
//! ch.inject("T 0 0 0"); // no subscribers yet; silently dropped
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lenslink_types::{ChannelState, LinkError};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::channel::{ChannelEvent, ChannelFactory, EVENT_CAPACITY, MessageChannel, OutboundMessage};

/// In-process channel.  Starts closed.
pub struct LoopbackChannel {
    url: String,
    state: Mutex<ChannelState>,
    events: broadcast::Sender<ChannelEvent>,
    sent: Mutex<Vec<OutboundMessage>>,
    send_delay: Mutex<Duration>,
    fail_sends: AtomicBool,
    fail_connect: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    send_attempts: AtomicUsize,
}

impl LoopbackChannel {
    pub fn new(url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            url: url.into(),
            state: Mutex::new(ChannelState::Closed),
            events,
            sent: Mutex::new(Vec::new()),
            send_delay: Mutex::new(Duration::ZERO),
            fail_sends: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
        }
    }

    /// Make every send take `delay` before it completes.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = delay;
    }

    /// Make subsequent sends fail with a channel error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent connects fail with a channel error.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Deliver an inbound message to subscribers.
    pub fn inject(&self, payload: impl Into<Vec<u8>>) {
        let _ = self.events.send(ChannelEvent::Message(payload.into()));
    }

    /// Simulate a transport failure: emits an error and drops the
    /// connection.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Error(reason.into()));
        self.mark_closed();
    }

    /// Messages that were delivered successfully, in order.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    /// Every call to `send`, including rejected ones.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently pending sends observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ChannelState::Closed);
        if previous != ChannelState::Closed {
            let _ = self.events.send(ChannelEvent::Closed);
        }
    }
}

#[async_trait]
impl MessageChannel for LoopbackChannel {
    fn url(&self) -> &str {
        &self.url
    }

    fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) -> Result<(), LinkError> {
        *self.state.lock() = ChannelState::Connecting;
        tokio::task::yield_now().await;

        if self.fail_connect.load(Ordering::SeqCst) {
            let msg = format!("connection to {} refused", self.url);
            let _ = self.events.send(ChannelEvent::Error(msg.clone()));
            self.mark_closed();
            return Err(LinkError::ChannelError(msg));
        }

        *self.state.lock() = ChannelState::Open;
        let _ = self.events.send(ChannelEvent::Opened);
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), LinkError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state != ChannelState::Open {
            return Err(LinkError::ChannelNotOpen(state));
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        // The connection may have gone away while the send was pending.
        let state = self.state();
        if state != ChannelState::Open {
            return Err(LinkError::ChannelNotOpen(state));
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            let msg = "simulated send failure".to_string();
            let _ = self.events.send(ChannelEvent::Error(msg.clone()));
            return Err(LinkError::ChannelError(msg));
        }

        self.sent.lock().push(message);
        Ok(())
    }

    async fn close(&self) -> Result<(), LinkError> {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Closed {
                return Ok(());
            }
            *state = ChannelState::Closing;
        }
        tokio::task::yield_now().await;
        self.mark_closed();
        Ok(())
    }
}

/// Hands out the same [`LoopbackChannel`] for every connect and remembers
/// which endpoints were requested.
#[derive(Clone)]
pub struct LoopbackFactory {
    channel: Arc<LoopbackChannel>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl LoopbackFactory {
    pub fn new(channel: Arc<LoopbackChannel>) -> Self {
        Self {
            channel,
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Endpoints passed to [`create`][ChannelFactory::create], in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

impl ChannelFactory for LoopbackFactory {
    fn create(&self, url: &str) -> Result<Arc<dyn MessageChannel>, LinkError> {
        self.requested.lock().push(url.to_string());
        Ok(Arc::clone(&self.channel) as Arc<dyn MessageChannel>)
    }
}
