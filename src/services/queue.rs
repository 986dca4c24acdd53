use std::future::Future;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep_until, Instant};

/// Serializes calls to a rate-limited upstream.
///
/// At most one task runs at a time, tasks start in the order `enqueue` was
/// first polled (tokio's mutex is FIFO-fair), and each task starts no
/// sooner than `delay` after the previous one settled, whether it
/// succeeded or failed. A task's error goes back to its own caller only.
///
/// A caller that drops its future before the task starts withdraws it
/// without affecting the spacing of later tasks. Once started, dropping
/// the future aborts the task and still counts as a settlement.
pub struct RateLimitedQueue {
    delay: Duration,
    last_settled: Mutex<Option<Instant>>,
}

struct SettleGuard<'a> {
    slot: MutexGuard<'a, Option<Instant>>,
    started: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.started {
            *self.slot = Some(Instant::now());
        }
    }
}

impl RateLimitedQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            last_settled: Mutex::new(None),
        }
    }

    pub async fn enqueue<T, F, Fut>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut guard = SettleGuard {
            slot: self.last_settled.lock().await,
            started: false,
        };

        if let Some(settled) = *guard.slot {
            sleep_until(settled + self.delay).await;
        }

        guard.started = true;
        task().await
    }
}

impl Default for RateLimitedQueue {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}
