//! `lenslink-runtime` – the streaming client.
//!
//! Ties a frame source, an encoder and a message channel into a real-time
//! client: frames go out at a bounded rate with at most one in flight, pose
//! messages come back and land in a shared spatial sink.
//!
//! # Modules
//!
//! - [`lifecycle`] – [`ConnectionManager`][lifecycle::ConnectionManager]:
//!   the `Idle → Connecting → Open → Closing → Closed` state machine around
//!   one channel, with explicit `connect`/`disconnect` verbs.
//! - [`pipeline`] – [`FramePipeline`][pipeline::FramePipeline]: per-tick
//!   capture, JPEG encode and single-flight send.
//! - [`receiver`] – [`PoseReceiver`][receiver::PoseReceiver]: decodes the
//!   `T`/`R` pose protocol and applies it atomically to the sink.
//! - [`ticker`] – [`Ticker`][ticker::Ticker]: fixed-period trigger.
//! - [`client`] – [`StreamingClient`][client::StreamingClient]: the composed
//!   client.
//! - [`config`] – [`ClientConfig`][config::ClientConfig] and the
//!   `~/.lenslink/config.toml` vault.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console logs
//!   plus optional OTLP span export.

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod pipeline;
pub mod receiver;
pub mod telemetry;
pub mod ticker;

pub use client::StreamingClient;
pub use config::ClientConfig;
pub use lifecycle::{ConnectionManager, MessageHandler};
pub use pipeline::{FramePipeline, TickOutcome};
pub use receiver::PoseReceiver;
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use ticker::Ticker;
