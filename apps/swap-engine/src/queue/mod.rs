//! Durable work queue contract over the job substrate.
//!
//! The queue hands jobs to the worker pool with at-least-once delivery:
//!
//! - enqueue is idempotent on the order identifier (one job per order at
//!   any time, waiting, delayed, or active);
//! - delivery is FIFO within the single priority class;
//! - every pickup increments the job's attempt counter;
//! - a job whose processing errors without reaching a terminal order
//!   status is re-delivered after exponential backoff until its attempts
//!   are exhausted;
//! - `pause`/`resume`/`drain` and counters cover the lifecycle surface.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::models::SwapJob;
use crate::resilience::RetryPolicy;

/// Poll interval while waiting for delayed jobs to come due.
const DELAYED_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Queue counters, in the shape the health surface reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueMetrics {
    /// Jobs waiting for a worker.
    pub waiting: usize,
    /// Jobs currently owned by a worker.
    pub active: usize,
    /// Jobs parked for backoff re-delivery.
    pub delayed: usize,
    /// Jobs completed since startup.
    pub completed: u64,
    /// Jobs discarded after exhausting their attempts.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct QueueInner {
    waiting: VecDeque<SwapJob>,
    delayed: Vec<(Instant, SwapJob)>,
    active: HashSet<String>,
    /// Every tracked job id: waiting, delayed, or active.
    ids: HashSet<String>,
    attempts: HashMap<String, u32>,
    paused: bool,
    completed: u64,
    failed: u64,
}

/// In-process job queue keyed by order identifier.
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    redelivery: RetryPolicy,
}

impl WorkQueue {
    /// Create a queue whose re-delivery backoff follows `redelivery`.
    #[must_use]
    pub fn new(redelivery: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            redelivery,
        }
    }

    /// Add a job; returns false (a no-op) when a job with the same order
    /// identifier is already tracked.
    pub fn enqueue(&self, job: SwapJob) -> bool {
        let mut inner = self.inner.lock();
        if !inner.ids.insert(job.order_id.clone()) {
            tracing::debug!(order_id = %job.order_id, "duplicate enqueue ignored");
            return false;
        }

        inner.attempts.insert(job.order_id.clone(), job.attempt);
        inner.waiting.push_back(job);
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Wait for the next deliverable job.
    ///
    /// Returns `None` when `shutdown` fires. The returned job's attempt
    /// counter has already been incremented for this delivery.
    pub async fn next_job(&self, shutdown: &CancellationToken) -> Option<SwapJob> {
        loop {
            let wait_hint = {
                let mut inner = self.inner.lock();
                if inner.paused {
                    None
                } else {
                    let now = Instant::now();
                    promote_due_jobs(&mut inner, now);

                    if let Some(mut job) = inner.waiting.pop_front() {
                        job.attempt += 1;
                        inner.attempts.insert(job.order_id.clone(), job.attempt);
                        inner.active.insert(job.order_id.clone());
                        return Some(job);
                    }

                    inner
                        .delayed
                        .iter()
                        .map(|(due, _)| due.saturating_duration_since(now))
                        .min()
                }
            };

            let sleep_for = wait_hint.unwrap_or(DELAYED_POLL_INTERVAL).max(Duration::from_millis(1));
            tokio::select! {
                () = shutdown.cancelled() => return None,
                () = self.notify.notified() => {}
                () = tokio::time::sleep(sleep_for) => {}
            }
        }
    }

    /// Mark an active job as completed and release its identifier.
    pub fn complete(&self, order_id: &str) {
        let mut inner = self.inner.lock();
        inner.active.remove(order_id);
        inner.ids.remove(order_id);
        inner.attempts.remove(order_id);
        inner.completed += 1;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Re-deliver a job whose processing errored, after backoff.
    ///
    /// Returns true when the job was parked for another attempt, false
    /// when its attempts are exhausted and it was discarded.
    pub fn retry_later(&self, job: SwapJob) -> bool {
        let mut inner = self.inner.lock();
        inner.active.remove(&job.order_id);

        if job.attempt >= self.redelivery.max_attempts {
            tracing::warn!(
                order_id = %job.order_id,
                attempts = job.attempt,
                "job attempts exhausted, discarding"
            );
            inner.ids.remove(&job.order_id);
            inner.attempts.remove(&job.order_id);
            inner.failed += 1;
            return false;
        }

        let delay = self.redelivery.delay_for_attempt(job.attempt);
        tracing::info!(
            order_id = %job.order_id,
            attempt = job.attempt,
            delay_ms = delay.as_millis() as u64,
            "job re-delivery scheduled"
        );
        inner.delayed.push((Instant::now() + delay, job));
        drop(inner);

        self.notify.notify_waiters();
        true
    }

    /// Attempts recorded for a tracked job, if any.
    #[must_use]
    pub fn attempts(&self, order_id: &str) -> Option<u32> {
        self.inner.lock().attempts.get(order_id).copied()
    }

    /// Stop delivering jobs; queued work is kept.
    pub fn pause(&self) {
        self.inner.lock().paused = true;
    }

    /// Resume delivery after a pause.
    pub fn resume(&self) {
        self.inner.lock().paused = false;
        self.notify.notify_waiters();
    }

    /// Whether delivery is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Remove all not-yet-started jobs. Active jobs are unaffected.
    pub fn drain(&self) {
        let mut inner = self.inner.lock();
        for job in inner.waiting.drain(..).collect::<Vec<_>>() {
            inner.ids.remove(&job.order_id);
            inner.attempts.remove(&job.order_id);
        }
        for (_, job) in inner.delayed.drain(..).collect::<Vec<_>>() {
            inner.ids.remove(&job.order_id);
            inner.attempts.remove(&job.order_id);
        }
    }

    /// Number of jobs currently owned by workers.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Snapshot of the queue counters.
    #[must_use]
    pub fn metrics(&self) -> QueueMetrics {
        let inner = self.inner.lock();
        QueueMetrics {
            waiting: inner.waiting.len(),
            active: inner.active.len(),
            delayed: inner.delayed.len(),
            completed: inner.completed,
            failed: inner.failed,
        }
    }
}

fn promote_due_jobs(inner: &mut QueueInner, now: Instant) {
    let mut idx = 0;
    while idx < inner.delayed.len() {
        if inner.delayed[idx].0 <= now {
            let (_, job) = inner.delayed.swap_remove(idx);
            inner.waiting.push_back(job);
        } else {
            idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn job(order_id: &str) -> SwapJob {
        SwapJob {
            order_id: order_id.to_string(),
            token_in: "SOL".to_string(),
            token_out: "USDC".to_string(),
            amount_in: 1_000,
            slippage: dec!(0.01),
            attempt: 0,
        }
    }

    fn queue() -> WorkQueue {
        WorkQueue::new(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(40),
        })
    }

    #[tokio::test]
    async fn enqueue_is_idempotent_on_order_id() {
        let queue = queue();

        assert!(queue.enqueue(job("o-1")));
        assert!(!queue.enqueue(job("o-1")));
        assert_eq!(queue.metrics().waiting, 1);
    }

    #[tokio::test]
    async fn delivery_is_fifo_and_counts_attempts() {
        let queue = queue();
        let shutdown = CancellationToken::new();

        queue.enqueue(job("o-1"));
        queue.enqueue(job("o-2"));

        let first = queue.next_job(&shutdown).await.unwrap();
        let second = queue.next_job(&shutdown).await.unwrap();
        assert_eq!(first.order_id, "o-1");
        assert_eq!(second.order_id, "o-2");
        assert_eq!(first.attempt, 1);
        assert_eq!(queue.attempts("o-1"), Some(1));
    }

    #[tokio::test]
    async fn complete_releases_the_identifier() {
        let queue = queue();
        let shutdown = CancellationToken::new();

        queue.enqueue(job("o-1"));
        let delivered = queue.next_job(&shutdown).await.unwrap();
        assert_eq!(queue.active_count(), 1);

        queue.complete(&delivered.order_id);

        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.metrics().completed, 1);
        // The same order id can be enqueued again once released.
        assert!(queue.enqueue(job("o-1")));
    }

    #[tokio::test]
    async fn id_stays_reserved_while_active() {
        let queue = queue();
        let shutdown = CancellationToken::new();

        queue.enqueue(job("o-1"));
        let _delivered = queue.next_job(&shutdown).await.unwrap();

        assert!(!queue.enqueue(job("o-1")));
    }

    #[tokio::test]
    async fn retry_later_redelivers_after_backoff() {
        let queue = queue();
        let shutdown = CancellationToken::new();

        queue.enqueue(job("o-1"));
        let delivered = queue.next_job(&shutdown).await.unwrap();

        assert!(queue.retry_later(delivered));
        assert_eq!(queue.metrics().delayed, 1);

        let redelivered = queue.next_job(&shutdown).await.unwrap();
        assert_eq!(redelivered.order_id, "o-1");
        assert_eq!(redelivered.attempt, 2);
    }

    #[tokio::test]
    async fn retry_later_discards_after_max_attempts() {
        let queue = queue();
        let shutdown = CancellationToken::new();
        queue.enqueue(job("o-1"));

        for expected_attempt in 1..=2 {
            let delivered = queue.next_job(&shutdown).await.unwrap();
            assert_eq!(delivered.attempt, expected_attempt);
            assert!(queue.retry_later(delivered));
        }

        let last = queue.next_job(&shutdown).await.unwrap();
        assert_eq!(last.attempt, 3);
        assert!(!queue.retry_later(last));
        assert_eq!(queue.metrics().failed, 1);
        assert_eq!(queue.active_count(), 0);
    }

    #[tokio::test]
    async fn pause_holds_delivery_until_resume() {
        let queue = std::sync::Arc::new(queue());
        let shutdown = CancellationToken::new();

        queue.enqueue(job("o-1"));
        queue.pause();

        let waiter = {
            let queue = std::sync::Arc::clone(&queue);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.next_job(&shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.resume();
        let delivered = waiter.await.unwrap().unwrap();
        assert_eq!(delivered.order_id, "o-1");
    }

    #[tokio::test]
    async fn drain_removes_pending_work_only() {
        let queue = queue();
        let shutdown = CancellationToken::new();

        queue.enqueue(job("o-1"));
        queue.enqueue(job("o-2"));
        let active = queue.next_job(&shutdown).await.unwrap();

        queue.drain();

        let metrics = queue.metrics();
        assert_eq!(metrics.waiting, 0);
        assert_eq!(metrics.active, 1);
        // Drained ids are free again; the active one is not.
        assert!(queue.enqueue(job("o-2")));
        assert!(!queue.enqueue(job(&active.order_id)));
    }

    #[tokio::test]
    async fn next_job_returns_none_on_shutdown() {
        let queue = queue();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        assert!(queue.next_job(&shutdown).await.is_none());
    }
}
