//! [`FramePipeline`] – capture, encode and transmit, one frame at a time.
//!
//! Each [`tick`][FramePipeline::tick]:
//!
//! 1. Skips unless the connection is open.
//! 2. Skips while the previous frame's send has not completed.
//! 3. Skips unless the source is ready and non-empty.
//! 4. Copies the current frame into a scratch [`FrameBuffer`] that is only
//!    reallocated when the source dimensions change.
//! 5. Encodes synchronously, frames the bytes, and hands them to the
//!    channel on a background task so the caller is never blocked on I/O.
//!
//! Skips are reported as a [`TickOutcome`], never as errors.  A send that
//! completes after the channel has left `Open` is discarded silently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use lenslink_hal::{FrameBuffer, FrameEncoder, FrameSource, PreviewSurface};
use lenslink_middleware::{EventBus, Topic, frame_message};
use lenslink_types::{ChannelState, Event, EventPayload, PayloadEncoding};
use tracing::{debug, trace, warn};

use crate::lifecycle::ConnectionManager;

const SOURCE: &str = "lenslink-runtime::pipeline";

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was encoded and its send started.
    Sent,
    ChannelNotOpen,
    SourceNotReady,
    /// The previous frame is still being sent.
    InFlight,
    EncodeFailed,
}

/// Clears the in-flight flag when the send task finishes or is dropped.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FramePipeline {
    source: Box<dyn FrameSource>,
    encoder: Box<dyn FrameEncoder>,
    encoding: PayloadEncoding,
    link: Arc<ConnectionManager>,
    bus: EventBus,
    scratch: FrameBuffer,
    reallocations: u64,
    in_flight: Arc<AtomicBool>,
    preview: Option<Box<dyn PreviewSurface>>,
}

impl FramePipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        encoder: Box<dyn FrameEncoder>,
        encoding: PayloadEncoding,
        link: Arc<ConnectionManager>,
    ) -> Self {
        let bus = link.bus().clone();
        Self {
            source,
            encoder,
            encoding,
            link,
            bus,
            scratch: FrameBuffer::default(),
            reallocations: 0,
            in_flight: Arc::new(AtomicBool::new(false)),
            preview: None,
        }
    }

    /// Show every captured frame on `preview` before it is encoded.
    pub fn with_preview(mut self, preview: Box<dyn PreviewSurface>) -> Self {
        self.set_preview(preview);
        self
    }

    pub fn set_preview(&mut self, preview: Box<dyn PreviewSurface>) {
        self.preview = Some(preview);
    }

    /// Whether the source currently has a non-empty frame to offer.
    pub fn source_ready(&self) -> bool {
        let (w, h) = self.source.dimensions();
        self.source.is_ready() && w > 0 && h > 0
    }

    /// Whether a send is outstanding.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of times the scratch buffer has been (re)allocated.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Run one capture cycle.  Must be called from within a Tokio runtime.
    pub fn tick(&mut self) -> TickOutcome {
        let Some(channel) = self.link.open_channel() else {
            trace!("tick skipped: channel not open");
            return TickOutcome::ChannelNotOpen;
        };
        if self.in_flight() {
            trace!("tick skipped: previous frame still in flight");
            return TickOutcome::InFlight;
        }
        if !self.source_ready() {
            trace!(source = self.source.id(), "tick skipped: source not ready");
            return TickOutcome::SourceNotReady;
        }

        let (w, h) = self.source.dimensions();
        if self.scratch.ensure_dimensions(w, h) {
            self.reallocations += 1;
            debug!(width = w, height = h, "frame buffer resized");
        }
        if let Err(e) = self.source.read_into(&mut self.scratch) {
            debug!(error = %e, "tick skipped: frame read failed");
            return TickOutcome::SourceNotReady;
        }
        if let Some(preview) = self.preview.as_mut() {
            preview.present(&self.scratch);
        }

        let image = match self.encoder.encode(&self.scratch) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, width = w, height = h, "tick skipped: encode failed");
                return TickOutcome::EncodeFailed;
            }
        };
        let message = frame_message(image, self.encoding);
        let bytes = message.len();
        let encoding = self.encoding;

        self.in_flight.store(true, Ordering::Release);
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let _guard = guard;
            match channel.send(message).await {
                Ok(()) => {
                    trace!(bytes, "frame sent");
                    bus.publish_to(
                        Topic::Frames,
                        Event::new(SOURCE, EventPayload::FrameSent { bytes, encoding }),
                    );
                }
                Err(e) if channel.state() != ChannelState::Open => {
                    debug!(error = %e, "send completed after close; result ignored");
                }
                Err(e) => warn!(error = %e, bytes, "frame send failed"),
            }
        });
        TickOutcome::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lenslink_hal::{JpegFrameEncoder, RecordingPreview, SourceControls, TestPatternSource};
    use lenslink_middleware::{
        LoopbackChannel, LoopbackFactory, OutboundMessage, TEXT_FRAME_TAG, decode_text_frame,
    };
    use lenslink_types::{LifecycleState, LinkError};
    use proptest::prelude::*;
    use std::time::Duration;

    struct Rig {
        channel: Arc<LoopbackChannel>,
        link: Arc<ConnectionManager>,
        controls: SourceControls,
        pipeline: FramePipeline,
    }

    fn rig(encoding: PayloadEncoding) -> Rig {
        let channel = Arc::new(LoopbackChannel::new("loopback://pipeline"));
        let factory = LoopbackFactory::new(Arc::clone(&channel));
        let link = Arc::new(ConnectionManager::new(Arc::new(factory), EventBus::default()));
        let source = TestPatternSource::new("sim", 16, 8);
        let controls = source.controls();
        let pipeline = FramePipeline::new(
            Box::new(source),
            Box::new(JpegFrameEncoder::new(70)),
            encoding,
            Arc::clone(&link),
        );
        Rig { channel, link, controls, pipeline }
    }

    async fn open(link: &ConnectionManager) {
        link.connect("ws://127.0.0.1:9002").unwrap();
        let mut rx = link.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == LifecycleState::Open))
            .await
            .expect("open in time")
            .expect("state channel alive");
    }

    async fn settle(pipeline: &FramePipeline) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while pipeline.in_flight() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("send settled");
    }

    struct FailingEncoder;

    impl FrameEncoder for FailingEncoder {
        fn encode(&mut self, _frame: &FrameBuffer) -> Result<Vec<u8>, LinkError> {
            Err(LinkError::EncodeFailure("codec unavailable".into()))
        }
    }

    #[tokio::test]
    async fn closed_channel_means_no_sends() {
        let mut rig = rig(PayloadEncoding::Binary);
        for _ in 0..10 {
            assert_eq!(rig.pipeline.tick(), TickOutcome::ChannelNotOpen);
        }
        tokio::task::yield_now().await;
        assert_eq!(rig.channel.send_attempts(), 0);
        assert_eq!(rig.controls.reads(), 0);
    }

    #[tokio::test]
    async fn open_channel_sends_binary_jpeg() {
        let mut rig = rig(PayloadEncoding::Binary);
        let mut frames = rig.link.bus().subscribe_to(Topic::Frames);
        open(&rig.link).await;

        assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
        settle(&rig.pipeline).await;

        let sent = rig.channel.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            OutboundMessage::Binary(bytes) => assert_eq!(&bytes[..2], &[0xFF, 0xD8]),
            other => panic!("expected binary frame, got {other:?}"),
        }
        let event = frames.try_next().expect("frame event");
        assert!(matches!(
            event.payload,
            EventPayload::FrameSent { encoding: PayloadEncoding::Binary, .. }
        ));
    }

    #[tokio::test]
    async fn text_framing_carries_decodable_jpeg() {
        let mut rig = rig(PayloadEncoding::TextBase64);
        open(&rig.link).await;

        rig.pipeline.tick();
        settle(&rig.pipeline).await;
        rig.pipeline.tick();
        settle(&rig.pipeline).await;

        let sent = rig.channel.sent();
        assert_eq!(sent.len(), 2);
        for message in sent {
            let OutboundMessage::Text(text) = message else {
                panic!("expected text frame");
            };
            assert!(text.starts_with(TEXT_FRAME_TAG));
            let jpeg = decode_text_frame(&text).unwrap();
            assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        }
    }

    #[tokio::test]
    async fn not_ready_or_empty_source_skips() {
        let mut rig = rig(PayloadEncoding::Binary);
        open(&rig.link).await;

        rig.controls.set_ready(false);
        assert_eq!(rig.pipeline.tick(), TickOutcome::SourceNotReady);
        rig.controls.set_ready(true);
        rig.controls.set_dimensions(0, 8);
        assert_eq!(rig.pipeline.tick(), TickOutcome::SourceNotReady);
        assert_eq!(rig.channel.send_attempts(), 0);
    }

    #[tokio::test]
    async fn scratch_buffer_reallocates_only_on_resize() {
        let mut rig = rig(PayloadEncoding::Binary);
        open(&rig.link).await;

        for _ in 0..3 {
            assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
            settle(&rig.pipeline).await;
        }
        assert_eq!(rig.pipeline.reallocations(), 1);

        rig.controls.set_dimensions(32, 16);
        rig.pipeline.tick();
        settle(&rig.pipeline).await;
        rig.pipeline.tick();
        settle(&rig.pipeline).await;
        assert_eq!(rig.pipeline.reallocations(), 2);
    }

    #[tokio::test]
    async fn encode_failure_is_a_skipped_tick() {
        let channel = Arc::new(LoopbackChannel::new("loopback://enc"));
        let link = Arc::new(ConnectionManager::new(
            Arc::new(LoopbackFactory::new(Arc::clone(&channel))),
            EventBus::default(),
        ));
        let mut pipeline = FramePipeline::new(
            Box::new(TestPatternSource::new("sim", 4, 4)),
            Box::new(FailingEncoder),
            PayloadEncoding::Binary,
            Arc::clone(&link),
        );
        open(&link).await;

        assert_eq!(pipeline.tick(), TickOutcome::EncodeFailed);
        assert_eq!(pipeline.tick(), TickOutcome::EncodeFailed);
        assert!(!pipeline.in_flight());
        assert_eq!(channel.send_attempts(), 0);
    }

    #[tokio::test]
    async fn slow_send_blocks_next_frame() {
        let mut rig = rig(PayloadEncoding::Binary);
        open(&rig.link).await;
        rig.channel.set_send_delay(Duration::from_millis(40));

        assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
        assert_eq!(rig.pipeline.tick(), TickOutcome::InFlight);
        assert_eq!(rig.pipeline.tick(), TickOutcome::InFlight);
        settle(&rig.pipeline).await;
        assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
        settle(&rig.pipeline).await;

        assert_eq!(rig.channel.sent().len(), 2);
        assert_eq!(rig.channel.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn disconnect_during_send_drops_the_result() {
        let mut rig = rig(PayloadEncoding::Binary);
        let mut lifecycle = rig.link.bus().subscribe_to(Topic::Lifecycle);
        open(&rig.link).await;
        rig.channel.set_send_delay(Duration::from_millis(50));

        assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
        tokio::time::sleep(Duration::from_millis(10)).await;
        rig.link.disconnect().await;
        settle(&rig.pipeline).await;

        assert_eq!(rig.link.state(), LifecycleState::Closed);
        assert!(rig.channel.sent().is_empty());
        assert_eq!(rig.pipeline.tick(), TickOutcome::ChannelNotOpen);
        while let Some(event) = lifecycle.try_next() {
            assert!(
                !matches!(event.payload, EventPayload::ChannelError(_)),
                "late send must not surface an error"
            );
        }
    }

    #[tokio::test]
    async fn send_failure_keeps_pipeline_running() {
        let mut rig = rig(PayloadEncoding::Binary);
        let mut lifecycle = rig.link.bus().subscribe_to(Topic::Lifecycle);
        open(&rig.link).await;
        rig.channel.set_fail_sends(true);

        assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
        settle(&rig.pipeline).await;
        assert!(!rig.pipeline.in_flight());
        assert_eq!(rig.link.state(), LifecycleState::Open);

        let reported = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = lifecycle.next().await {
                if matches!(event.payload, EventPayload::ChannelError(_)) {
                    return true;
                }
            }
            false
        })
        .await
        .expect("error reported in time");
        assert!(reported);

        rig.channel.set_fail_sends(false);
        assert_eq!(rig.pipeline.tick(), TickOutcome::Sent);
        settle(&rig.pipeline).await;
        assert_eq!(rig.channel.sent().len(), 1);
        assert_eq!(rig.channel.send_attempts(), 2);
    }

    #[tokio::test]
    async fn preview_sees_each_captured_frame() {
        let mut rig = rig(PayloadEncoding::Binary);
        let preview = RecordingPreview::new();
        rig.pipeline.set_preview(Box::new(preview.clone()));
        open(&rig.link).await;

        rig.pipeline.tick();
        settle(&rig.pipeline).await;
        assert_eq!(preview.frames(), 1);
        assert_eq!(preview.last_dimensions(), Some((16, 8)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn never_more_than_one_frame_in_flight(
            send_ms in 0u64..8,
            gaps in proptest::collection::vec(0u64..4, 4..16),
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            let (max, sent, attempts) = rt.block_on(async {
                let mut rig = rig(PayloadEncoding::Binary);
                open(&rig.link).await;
                rig.channel.set_send_delay(Duration::from_millis(send_ms));
                for gap in gaps {
                    rig.pipeline.tick();
                    tokio::time::sleep(Duration::from_millis(gap)).await;
                }
                settle(&rig.pipeline).await;
                (rig.channel.max_in_flight(), rig.channel.sent().len(), rig.channel.send_attempts())
            });
            prop_assert!(max <= 1);
            prop_assert!(sent >= 1);
            prop_assert_eq!(sent, attempts);
        }
    }
}
