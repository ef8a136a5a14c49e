use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Connection state as reported by a message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Client-side lifecycle of a connection, as driven by the explicit
/// `connect` / `disconnect` verbs.
///
/// `Idle` is the state before the first connect; once a channel has been
/// torn down the manager rests in `Closed` and may connect again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl LifecycleState {
    /// Whether a `connect` verb is accepted in this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed)
    }

    /// Whether a `disconnect` verb has anything to tear down.
    pub fn can_disconnect(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How an encoded frame is framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadEncoding {
    /// Raw compressed image bytes in a binary message.
    #[default]
    Binary,
    /// `"RGB:"` followed by the base64 of the compressed bytes, sent as text.
    TextBase64,
}

/// Unified event wrapper for the observer bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "lenslink-runtime::lifecycle"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the observer bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// Transport-level failure reported by the channel.
    ChannelError(String),
    FrameSent {
        bytes: usize,
        encoding: PayloadEncoding,
    },
    /// A pose message was applied to the spatial sink.
    PoseApplied {
        position: [f32; 3],
        rotation_rad: [f32; 3],
    },
}

/// Global error type spanning capture, encoding, transport and lifecycle
/// failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("Frame source not ready: {0}")]
    SourceNotReady(String),

    #[error("Channel not open (state: {0:?})")]
    ChannelNotOpen(ChannelState),

    #[error("Frame encoding failed: {0}")]
    EncodeFailure(String),

    #[error("Payload decoding failed: {0}")]
    DecodeFailure(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Cannot {verb} while {from}")]
    InvalidTransition {
        from: LifecycleState,
        verb: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}
