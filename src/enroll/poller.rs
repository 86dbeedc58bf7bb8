//! Recurring detection task with explicit cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// A fixed-interval task. Each tick is awaited before the next one is
/// scheduled, so ticks never overlap.
pub struct Poller {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<u64>>,
}

impl Poller {
    /// Spawn on the current tokio runtime.
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        tick().await;
                        ticks += 1;
                    }
                }
            }

            tracing::debug!(ticks, "Poller stopped");
            ticks
        });

        tracing::debug!(?period, "Poller started");
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Signal shutdown and wait for the in-flight tick to finish.
    ///
    /// Returns the number of completed ticks on the first call and `None`
    /// afterwards.
    pub async fn stop(&mut self) -> Option<u64> {
        let handle = self.handle.take()?;
        let _ = self.shutdown.send(true);
        match handle.await {
            Ok(ticks) => Some(ticks),
            Err(e) => {
                tracing::warn!("Poller task ended abnormally: {}", e);
                None
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.shutdown.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn ticks_until_stopped_then_stop_is_idempotent() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut poller = Poller::spawn(Duration::from_millis(10), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(poller.is_running());

        let ticks = poller.stop().await.expect("first stop reports ticks");
        assert!(ticks >= 2);
        assert_eq!(ticks as usize, count.load(Ordering::SeqCst));
        assert!(!poller.is_running());
        assert_eq!(poller.stop().await, None);

        let after = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn slow_ticks_never_overlap() {
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let (a, m) = (Arc::clone(&active), Arc::clone(&max_seen));

        let mut poller = Poller::spawn(Duration::from_millis(5), move || {
            let (a, m) = (Arc::clone(&a), Arc::clone(&m));
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                a.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        poller.stop().await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }
}
