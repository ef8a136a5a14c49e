//! [`ConnectionManager`] – owns the channel and its lifecycle.
//!
//! State machine:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──opened──▶ Open ──disconnect──▶ Closing ──▶ Closed
//!                        │                   │                                 │
//!                        └──error/closed─────┴────────────▶ Closed ◀──connect──┘
//! ```
//!
//! `connect` is only accepted from `Idle` or `Closed`; it builds a channel
//! through the configured [`ChannelFactory`], hooks the channel's event
//! stream, and dials in the background.  `disconnect` unregisters the
//! message handler before anything else is torn down and always ends in
//! `Closed`.  Reconnection is left to the caller.
//!
//! Every transition is published on [`Topic::Lifecycle`] together with any
//! transport error the channel reports.

use std::sync::Arc;

use lenslink_middleware::{ChannelEvent, ChannelFactory, EventBus, MessageChannel, Topic};
use lenslink_types::{ChannelState, Event, EventPayload, LifecycleState, LinkError};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SOURCE: &str = "lenslink-runtime::lifecycle";

/// Receives every inbound message while the connection is up.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, payload: &[u8]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state (manager + event pump)
// ─────────────────────────────────────────────────────────────────────────────

struct Shared {
    state: watch::Sender<LifecycleState>,
    bus: EventBus,
    /// The handler currently hooked to the channel.  Cleared first on
    /// disconnect.
    active_handler: RwLock<Option<Arc<dyn MessageHandler>>>,
}

impl Shared {
    /// Move to `to` if the current state is one of `from`.  Returns the
    /// state that was replaced.
    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Option<LifecycleState> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if from.contains(state) {
                previous = Some(std::mem::replace(state, to));
                true
            } else {
                false
            }
        });
        if let Some(from) = previous {
            info!(%from, %to, "connection state changed");
            self.bus.publish_to(
                Topic::Lifecycle,
                Event::new(SOURCE, EventPayload::StateChanged { from, to }),
            );
        }
        previous
    }

    fn report_error(&self, message: String) {
        warn!(error = %message, "channel error");
        self.bus
            .publish_to(Topic::Lifecycle, Event::new(SOURCE, EventPayload::ChannelError(message)));
    }
}

struct ActiveLink {
    channel: Arc<dyn MessageChannel>,
    pump: JoinHandle<()>,
    dial: JoinHandle<()>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionManager
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one channel at a time through the connection lifecycle.
pub struct ConnectionManager {
    factory: Arc<dyn ChannelFactory>,
    shared: Arc<Shared>,
    handler: Option<Arc<dyn MessageHandler>>,
    active: Mutex<Option<ActiveLink>>,
}

impl ConnectionManager {
    pub fn new(factory: Arc<dyn ChannelFactory>, bus: EventBus) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            factory,
            shared: Arc::new(Shared {
                state,
                bus,
                active_handler: RwLock::new(None),
            }),
            handler: None,
            active: Mutex::new(None),
        }
    }

    /// Handler hooked to the inbound message stream on every `connect`.
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.shared.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.shared.state.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// The channel, if both the lifecycle and the channel itself are open.
    pub fn open_channel(&self) -> Option<Arc<dyn MessageChannel>> {
        if self.state() != LifecycleState::Open {
            return None;
        }
        let active = self.active.lock();
        let channel = &active.as_ref()?.channel;
        (channel.state() == ChannelState::Open).then(|| Arc::clone(channel))
    }

    pub fn is_open(&self) -> bool {
        self.open_channel().is_some()
    }

    /// Start connecting to `url`.
    ///
    /// Returns as soon as the manager is `Connecting`; the handshake runs in
    /// the background and moves the manager to `Open` (or `Closed` on
    /// failure).  Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`LinkError::InvalidTransition`] unless the manager is `Idle` or
    ///   `Closed`.
    /// * Whatever the factory returns for an unusable `url`; the state is
    ///   left untouched in that case.
    pub fn connect(&self, url: &str) -> Result<(), LinkError> {
        let mut active = self.active.lock();
        let state = self.state();
        if !state.can_connect() {
            return Err(LinkError::InvalidTransition { from: state, verb: "connect" });
        }

        let channel = self.factory.create(url)?;
        // Subscribe before dialling so `Opened` cannot be missed.
        let events = channel.subscribe();
        *self.shared.active_handler.write() = self.handler.clone();
        self.shared
            .transition(&[LifecycleState::Idle, LifecycleState::Closed], LifecycleState::Connecting);

        let pump = tokio::spawn(pump_events(events, Arc::clone(&self.shared)));
        let dial = {
            let channel = Arc::clone(&channel);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                if let Err(e) = channel.connect().await {
                    debug!(error = %e, url = channel.url(), "connect failed");
                    shared.transition(&[LifecycleState::Connecting], LifecycleState::Closed);
                }
            })
        };

        if let Some(stale) = active.replace(ActiveLink { channel, pump, dial }) {
            stale.pump.abort();
            stale.dial.abort();
        }
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// The message handler is unhooked first, then the channel is closed.
    /// Close errors are reported on the bus but never returned; from the
    /// caller's point of view the manager always ends in `Closed`.  A no-op
    /// unless the manager is `Connecting` or `Open`.
    pub async fn disconnect(&self) {
        self.shared.active_handler.write().take();

        let Some(link) = self.active.lock().take() else {
            return;
        };
        let closing = self.shared.transition(
            &[LifecycleState::Connecting, LifecycleState::Open],
            LifecycleState::Closing,
        );
        if closing.is_none() {
            // Already dropped to Closed on its own; just reap the tasks.
            link.pump.abort();
            link.dial.abort();
            return;
        }

        link.dial.abort();
        if let Err(e) = link.channel.close().await {
            self.shared.report_error(e.to_string());
        }
        link.pump.abort();
        self.shared.transition(&[LifecycleState::Closing], LifecycleState::Closed);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.active.lock().take() {
            link.pump.abort();
            link.dial.abort();
        }
    }
}

/// Route channel events into lifecycle transitions and the message handler.
async fn pump_events(mut events: broadcast::Receiver<ChannelEvent>, shared: Arc<Shared>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(lagged_by = n, "channel event pump lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            ChannelEvent::Opened => {
                shared.transition(&[LifecycleState::Connecting], LifecycleState::Open);
            }
            ChannelEvent::Message(payload) => {
                let handler = shared.active_handler.read().clone();
                if let Some(handler) = handler {
                    handler.on_message(&payload);
                }
            }
            ChannelEvent::Error(message) => shared.report_error(message),
            ChannelEvent::Closed => {
                shared.transition(
                    &[LifecycleState::Connecting, LifecycleState::Open],
                    LifecycleState::Closed,
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lenslink_middleware::{LoopbackChannel, LoopbackFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingHandler(AtomicUsize);

    impl MessageHandler for CountingHandler {
        fn on_message(&self, _payload: &[u8]) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager() -> (Arc<LoopbackChannel>, LoopbackFactory, ConnectionManager) {
        let channel = Arc::new(LoopbackChannel::new("loopback://test"));
        let factory = LoopbackFactory::new(Arc::clone(&channel));
        let manager = ConnectionManager::new(Arc::new(factory.clone()), EventBus::default());
        (channel, factory, manager)
    }

    async fn wait_for(manager: &ConnectionManager, want: LifecycleState) {
        let mut rx = manager.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn connect_moves_through_connecting_to_open() {
        let (_channel, factory, manager) = manager();
        assert_eq!(manager.state(), LifecycleState::Idle);

        manager.connect("ws://127.0.0.1:9002").unwrap();
        assert_eq!(manager.state(), LifecycleState::Connecting);

        wait_for(&manager, LifecycleState::Open).await;
        assert!(manager.is_open());
        assert_eq!(factory.requested(), vec!["ws://127.0.0.1:9002"]);
    }

    #[tokio::test]
    async fn connect_is_rejected_while_connected() {
        let (_channel, _factory, manager) = manager();
        manager.connect("ws://a:1").unwrap();
        wait_for(&manager, LifecycleState::Open).await;

        let err = manager.connect("ws://a:1").unwrap_err();
        assert_eq!(
            err,
            LinkError::InvalidTransition { from: LifecycleState::Open, verb: "connect" }
        );
    }

    #[tokio::test]
    async fn disconnect_ends_closed_and_can_reconnect() {
        let (_channel, _factory, manager) = manager();
        let mut lifecycle = manager.bus().subscribe_to(Topic::Lifecycle);

        manager.connect("ws://a:1").unwrap();
        wait_for(&manager, LifecycleState::Open).await;
        manager.disconnect().await;
        assert_eq!(manager.state(), LifecycleState::Closed);
        assert!(!manager.is_open());

        let mut seen = Vec::new();
        while let Some(event) = lifecycle.try_next() {
            if let EventPayload::StateChanged { to, .. } = event.payload {
                seen.push(to);
            }
        }
        assert_eq!(
            seen,
            vec![
                LifecycleState::Connecting,
                LifecycleState::Open,
                LifecycleState::Closing,
                LifecycleState::Closed,
            ]
        );

        manager.connect("ws://a:1").unwrap();
        wait_for(&manager, LifecycleState::Open).await;
    }

    #[tokio::test]
    async fn disconnect_from_idle_is_a_no_op() {
        let (_channel, _factory, manager) = manager();
        manager.disconnect().await;
        assert_eq!(manager.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn failed_connect_lands_in_closed_and_reports_error() {
        let (channel, _factory, manager) = manager();
        channel.set_fail_connect(true);
        let mut lifecycle = manager.bus().subscribe_to(Topic::Lifecycle);

        manager.connect("ws://a:1").unwrap();
        wait_for(&manager, LifecycleState::Closed).await;

        let mut saw_error = false;
        for _ in 0..8 {
            match tokio::time::timeout(Duration::from_secs(1), lifecycle.recv()).await {
                Ok(Ok(Event { payload: EventPayload::ChannelError(_), .. })) => {
                    saw_error = true;
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_error, "channel error must reach lifecycle observers");
    }

    #[tokio::test]
    async fn transport_error_drops_open_to_closed() {
        let (channel, _factory, manager) = manager();
        manager.connect("ws://a:1").unwrap();
        wait_for(&manager, LifecycleState::Open).await;

        channel.fail("connection reset");
        wait_for(&manager, LifecycleState::Closed).await;
        // Nothing left to tear down, but the verb is still safe.
        manager.disconnect().await;
        assert_eq!(manager.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn handler_receives_messages_until_disconnect() {
        let (channel, _factory, manager) = manager();
        let handler = Arc::new(CountingHandler::default());
        let manager = manager.with_handler(handler.clone());

        manager.connect("ws://a:1").unwrap();
        wait_for(&manager, LifecycleState::Open).await;

        channel.inject("T 1 2 3");
        channel.inject("R 0 0 1");
        tokio::time::timeout(Duration::from_secs(2), async {
            while handler.0.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("handler saw both messages");

        manager.disconnect().await;
        channel.inject("T 9 9 9");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn factory_rejection_leaves_state_untouched() {
        let manager = ConnectionManager::new(
            Arc::new(lenslink_middleware::WsChannelFactory),
            EventBus::default(),
        );
        assert!(matches!(manager.connect("http://nope"), Err(LinkError::Config(_))));
        assert_eq!(manager.state(), LifecycleState::Idle);
    }
}
