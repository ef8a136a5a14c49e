//! [`PoseReceiver`] – applies inbound pose messages to the spatial sink.

use lenslink_middleware::{EventBus, Topic};
use lenslink_perception::{PoseUpdate, PositionMode, SpatialSink, SpatialState};
use lenslink_types::{Event, EventPayload, LinkError};
use tracing::{trace, warn};

use crate::lifecycle::MessageHandler;

const SOURCE: &str = "lenslink-runtime::receiver";

/// Decodes `T`/`R` pose messages and writes them to a [`SpatialSink`].
///
/// Never panics on bad input: invalid UTF-8 is logged and dropped, and
/// malformed numbers only affect their own axis.
pub struct PoseReceiver {
    sink: SpatialSink,
    mode: PositionMode,
    bus: EventBus,
}

impl PoseReceiver {
    pub fn new(sink: SpatialSink, mode: PositionMode, bus: EventBus) -> Self {
        Self { sink, mode, bus }
    }

    /// Decode and apply one message.
    ///
    /// Returns `Ok(None)` when the message carried no pose record, in which
    /// case the sink is left alone.
    ///
    /// # Errors
    ///
    /// [`LinkError::DecodeFailure`] if `payload` is not UTF-8.
    pub fn handle(&self, payload: &[u8]) -> Result<Option<SpatialState>, LinkError> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| LinkError::DecodeFailure(format!("pose message is not UTF-8: {e}")))?;

        let update = PoseUpdate::parse(text);
        if update.is_empty() {
            trace!(len = payload.len(), "message carried no pose record");
            return Ok(None);
        }

        let state = self.sink.apply(&update, self.mode);
        self.bus.publish_to(
            Topic::Pose,
            Event::new(
                SOURCE,
                EventPayload::PoseApplied {
                    position: state.position().to_array(),
                    rotation_rad: state.euler_rad.to_array(),
                },
            ),
        );
        Ok(Some(state))
    }
}

impl MessageHandler for PoseReceiver {
    fn on_message(&self, payload: &[u8]) {
        if let Err(e) = self.handle(payload) {
            warn!(error = %e, len = payload.len(), "pose message dropped");
        }
    }
}
