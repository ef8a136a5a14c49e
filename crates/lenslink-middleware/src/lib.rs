//! `lenslink-middleware` – transport and routing.
//!
//! Moves bytes between the client and its remote peer without caring about
//! their meaning, and fans internal events out to observers.
//!
//! # Modules
//!
//! - [`channel`] – the [`MessageChannel`] trait every transport implements.
//! - [`ws_channel`] – WebSocket transport built on `tokio-tungstenite`.
//! - [`loopback`] – in-memory transport for tests and headless runs.
//! - [`frame_codec`] – binary and `RGB:`+base64 framing of encoded frames.
//! - [`bus`] – typed, topic-based observer bus built on Tokio broadcast
//!   channels.

pub mod bus;
pub mod channel;
pub mod frame_codec;
pub mod loopback;
pub mod ws_channel;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use channel::{ChannelEvent, ChannelFactory, MessageChannel, OutboundMessage};
pub use frame_codec::{TEXT_FRAME_TAG, decode_text_frame, frame_message};
pub use loopback::{LoopbackChannel, LoopbackFactory};
pub use ws_channel::{WsChannel, WsChannelFactory};
