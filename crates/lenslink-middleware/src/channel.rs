//! The duplex message channel abstraction.
//!
//! The runtime never talks to a socket library directly.  It drives a
//! [`MessageChannel`] through explicit verbs (`connect`, `send`, `close`)
//! and observes it through a typed [`ChannelEvent`] stream.  Concrete
//! transports:
//!
//! - [`WsChannel`][crate::ws_channel::WsChannel] – WebSocket client.
//! - [`LoopbackChannel`][crate::loopback::LoopbackChannel] – in-memory
//!   channel for tests and headless runs.

use std::sync::Arc;

use async_trait::async_trait;
use lenslink_types::{ChannelState, LinkError};
use tokio::sync::broadcast;

/// Capacity of a channel's event stream.
pub const EVENT_CAPACITY: usize = 256;

/// Something that happened on a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection handshake completed.
    Opened,
    /// Transport-level error.  Usually followed by [`ChannelEvent::Closed`].
    Error(String),
    /// An inbound message (text or binary) as raw bytes.
    Message(Vec<u8>),
    /// The connection is gone.
    Closed,
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl OutboundMessage {
    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An asynchronous, stateful duplex connection to one remote endpoint.
///
/// # Contract
///
/// * [`subscribe`][Self::subscribe] may be called before `connect`; the
///   receiver sees every event emitted after it was created.
/// * `connect` emits [`ChannelEvent::Opened`] on success and moves the
///   channel to [`ChannelState::Open`].
/// * `send` fails with [`LinkError::ChannelNotOpen`] unless the channel is
///   open.  It never queues.
/// * `close` ends in [`ChannelState::Closed`] and emits
///   [`ChannelEvent::Closed`].
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// The endpoint this channel targets.
    fn url(&self) -> &str;

    fn state(&self) -> ChannelState;

    /// Subscribe to this channel's events.
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;

    async fn connect(&self) -> Result<(), LinkError>;

    async fn send(&self, message: OutboundMessage) -> Result<(), LinkError>;

    async fn close(&self) -> Result<(), LinkError>;
}

/// Builds a channel for an endpoint.  Used by the lifecycle manager so the
/// transport can be swapped without touching lifecycle logic.
pub trait ChannelFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`LinkError::Config`] if `url` is unusable for this transport.
    fn create(&self, url: &str) -> Result<Arc<dyn MessageChannel>, LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_len_counts_bytes() {
        assert_eq!(OutboundMessage::Text("RGB:AAAA".into()).len(), 8);
        assert_eq!(OutboundMessage::Binary(vec![1, 2, 3]).len(), 3);
        assert!(OutboundMessage::Binary(Vec::new()).is_empty());
    }
}
