//! [`StreamingClient`] – the composed client.
//!
//! Wires a [`ConnectionManager`], a [`FramePipeline`] driven by a
//! [`Ticker`], and a [`PoseReceiver`] feeding a [`SpatialSink`].  The
//! embedding application only calls `start`/`stop` and reads the sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lenslink_hal::TestPatternSource;
//! use lenslink_middleware::WsChannelFactory;
//! use lenslink_runtime::{ClientConfig, StreamingClient};
//!
//! # async fn run() -> Result<(), lenslink_types::LinkError> {
//! let client = StreamingClient::new(
//!     ClientConfig::default(),
//!     Box::new(TestPatternSource::new("sim", 320, 240)),
//!     Arc::new(WsChannelFactory),
//! )?;
//! client.start()?;
//! let pose = client.sink().snapshot();
//! client.stop().await;
//! # let _ = pose;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use lenslink_hal::{FrameSource, JpegFrameEncoder, PreviewSurface};
use lenslink_middleware::{ChannelFactory, EventBus};
use lenslink_perception::SpatialSink;
use lenslink_types::{LifecycleState, LinkError};
use parking_lot::Mutex;
use tracing::info;

use crate::config::ClientConfig;
use crate::lifecycle::ConnectionManager;
use crate::pipeline::FramePipeline;
use crate::receiver::PoseReceiver;
use crate::ticker::Ticker;

pub struct StreamingClient {
    config: ClientConfig,
    link: Arc<ConnectionManager>,
    pipeline: Arc<Mutex<FramePipeline>>,
    sink: SpatialSink,
    ticker: Mutex<Option<Ticker>>,
}

impl StreamingClient {
    /// Build a client.  Nothing connects until [`start`][Self::start].
    ///
    /// # Errors
    ///
    /// [`LinkError::Config`] if `config` does not validate.
    pub fn new(
        config: ClientConfig,
        source: Box<dyn FrameSource>,
        factory: Arc<dyn ChannelFactory>,
    ) -> Result<Self, LinkError> {
        config.validate()?;

        let bus = EventBus::default();
        let sink = SpatialSink::default();
        let receiver = PoseReceiver::new(sink.clone(), config.position_mode(), bus.clone());
        let link = Arc::new(ConnectionManager::new(factory, bus).with_handler(Arc::new(receiver)));
        let pipeline = FramePipeline::new(
            source,
            Box::new(JpegFrameEncoder::new(config.quality)),
            config.payload,
            Arc::clone(&link),
        );

        Ok(Self {
            config,
            link,
            pipeline: Arc::new(Mutex::new(pipeline)),
            sink,
            ticker: Mutex::new(None),
        })
    }

    pub fn with_preview(self, preview: Box<dyn PreviewSurface>) -> Self {
        self.pipeline.lock().set_preview(preview);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The pose-fed spatial state.  Clones share the same state.
    pub fn sink(&self) -> &SpatialSink {
        &self.sink
    }

    pub fn bus(&self) -> &EventBus {
        self.link.bus()
    }

    pub fn link(&self) -> &Arc<ConnectionManager> {
        &self.link
    }

    pub fn state(&self) -> LifecycleState {
        self.link.state()
    }

    /// Connect to the configured endpoint and start the capture ticker.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`].
    pub fn start(&self) -> Result<(), LinkError> {
        self.link.connect(&self.config.endpoint)?;

        let mut ticker = self.ticker.lock();
        if ticker.is_none() {
            let pipeline = Arc::clone(&self.pipeline);
            *ticker = Some(Ticker::start(
                self.config.capture_period(),
                self.config.start_delay(),
                move || {
                    pipeline.lock().tick();
                },
            ));
            info!(
                endpoint = %self.config.endpoint,
                hz = self.config.capture_hz,
                payload = ?self.config.payload,
                "streaming started"
            );
        }
        Ok(())
    }

    /// Wait for the frame source to become ready, then [`start`][Self::start].
    ///
    /// # Errors
    ///
    /// [`LinkError::SourceNotReady`] if the source is still not ready after
    /// `timeout`.
    pub async fn start_when_ready(&self, poll: Duration, timeout: Duration) -> Result<(), LinkError> {
        let wait = async {
            while !self.pipeline.lock().source_ready() {
                tokio::time::sleep(poll).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            LinkError::SourceNotReady(format!("source not ready after {timeout:?}"))
        })?;
        self.start()
    }

    /// Stop the ticker, then disconnect.  Always ends `Closed` (or `Idle`
    /// if never started).
    pub async fn stop(&self) {
        let ticker = self.ticker.lock().take();
        if let Some(ticker) = ticker {
            let ticks = ticker.stop().await;
            info!(ticks, "streaming stopped");
        }
        self.link.disconnect().await;
    }
}
