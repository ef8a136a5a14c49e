//! [`Ticker`] – fixed-period trigger for the capture pipeline.
//!
//! Ticks that would have fired while the callback was still running are
//! skipped rather than bunched up, so a slow tick never causes a burst.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// A running periodic task.  Dropping it cancels the task.
pub struct Ticker {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl Ticker {
    /// Call `on_tick` every `period`, starting after `delay`.  Must be called
    /// from within a Tokio runtime.
    pub fn start<F>(period: Duration, delay: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = 0u64;
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        on_tick();
                        ticks += 1;
                    }
                }
            }
            debug!(ticks, "ticker stopped");
            ticks
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop ticking and wait for the task to finish.  Returns the number of
    /// ticks that ran.
    pub async fn stop(mut self) -> u64 {
        let _ = self.stop.send(true);
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counter() -> (Arc<AtomicU64>, impl FnMut() + Send + 'static) {
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn ticks_periodically_until_stopped() {
        let (count, on_tick) = counter();
        let ticker = Ticker::start(Duration::from_millis(5), Duration::ZERO, on_tick);
        tokio::time::sleep(Duration::from_millis(60)).await;
        let ran = ticker.stop().await;

        assert!(ran >= 3, "expected several ticks, got {ran}");
        assert_eq!(count.load(Ordering::SeqCst), ran);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), ran, "no ticks after stop");
    }

    #[tokio::test]
    async fn start_delay_postpones_first_tick() {
        let (count, on_tick) = counter();
        let ticker = Ticker::start(Duration::from_millis(5), Duration::from_millis(200), on_tick);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(ticker.stop().await, 0);
    }

    #[tokio::test]
    async fn dropping_cancels_the_task() {
        let (count, on_tick) = counter();
        let ticker = Ticker::start(Duration::from_millis(5), Duration::ZERO, on_tick);
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(ticker);
        let after_drop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}
