//! Throttled save scheduling.
//!
//! Save requests do not write immediately. Each request arms a short
//! debounce window, and a newer request replaces the window of the one
//! before it, so a burst of edits collapses into a single write. A
//! slower periodic timer writes anything that slipped through, and
//! shutdown flushes whatever is still pending.

use std::sync::{Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};

use super::SessionError;

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { changes: usize },
    NoChanges,
}

/// The thing the scheduler flushes. Flush failures are reported through
/// the target's own event sink, so the scheduler only cares whether the
/// target is still alive.
#[async_trait]
pub trait FlushTarget: Send + Sync {
    async fn flush(&self) -> Result<WriteOutcome, SessionError>;
}

enum SaveSignal {
    Request,
    Shutdown,
}

pub struct SaveScheduler {
    tx: mpsc::UnboundedSender<SaveSignal>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SaveScheduler {
    pub fn start(target: Weak<dyn FlushTarget>, debounce: Duration, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(target, rx, debounce, interval));
        SaveScheduler {
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Ask for a save soon. A request made while one is already waiting
    /// replaces it, restarting the debounce window.
    pub fn request_save(&self) {
        let _ = self.tx.send(SaveSignal::Request);
    }

    /// Stop the worker after one final flush.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(SaveSignal::Shutdown);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run(
    target: Weak<dyn FlushTarget>,
    mut rx: mpsc::UnboundedReceiver<SaveSignal>,
    debounce: Duration,
    interval: Duration,
) {
    // Skip the immediate tick a fresh interval would fire.
    let mut ticker = interval_at(Instant::now() + interval, interval);
    let mut deadline: Option<Instant> = None;

    loop {
        let wait = deadline;
        tokio::select! {
            signal = rx.recv() => match signal {
                Some(SaveSignal::Request) => {
                    deadline = Some(Instant::now() + debounce);
                }
                Some(SaveSignal::Shutdown) | None => {
                    flush(&target).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                deadline = None;
                if !flush(&target).await {
                    break;
                }
            }
            _ = async move {
                match wait {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            } => {
                deadline = None;
                if !flush(&target).await {
                    break;
                }
            }
        }
    }
}

/// Returns false once the target is gone and the worker should stop.
async fn flush(target: &Weak<dyn FlushTarget>) -> bool {
    match target.upgrade() {
        Some(target) => {
            let _ = target.flush().await;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingTarget {
        flushes: AtomicUsize,
    }

    impl CountingTarget {
        fn count(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FlushTarget for CountingTarget {
        async fn flush(&self) -> Result<WriteOutcome, SessionError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(WriteOutcome::Written { changes: 1 })
        }
    }

    fn start(
        target: &Arc<CountingTarget>,
        debounce: Duration,
        interval: Duration,
    ) -> SaveScheduler {
        let weak = Arc::downgrade(target);
        let weak: Weak<dyn FlushTarget> = weak;
        SaveScheduler::start(weak, debounce, interval)
    }

    #[tokio::test]
    async fn test_burst_of_requests_coalesces_into_one_flush() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = start(&target, Duration::from_millis(50), Duration::from_secs(60));

        for _ in 0..5 {
            scheduler.request_save();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(target.count(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_requests_means_no_debounce_flush() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = start(&target, Duration::from_millis(20), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(target.count(), 0);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_periodic_flush_fires_without_requests() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = start(&target, Duration::from_secs(60), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(180)).await;
        assert!(target.count() >= 2);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_separate_requests_flush_separately() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = start(&target, Duration::from_millis(30), Duration::from_secs(60));

        scheduler.request_save();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(target.count(), 1);

        scheduler.request_save();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(target.count(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_request() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = start(&target, Duration::from_secs(60), Duration::from_secs(60));

        scheduler.request_save();
        scheduler.shutdown().await;
        assert_eq!(target.count(), 1);
    }
}
