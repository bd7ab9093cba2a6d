//! In-memory bookkeeping for one due-poll batch: its generation number, how
//! many jobs remain, and the early-refill trigger.
//!
//! The exactly-once requirement on `one_execution_done` is enforced
//! structurally by [`BatchGuard`], an RAII drop-guard: no matter which
//! early-return path a pick-and-execute job takes, dropping the guard runs
//! the bookkeeping exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The fraction of the pool that must be free before the due-poller is woken
/// early to refill. Half the pool free triggers a refill.
pub const TRIGGER_RATIO: f64 = 0.5;

pub struct BatchTracker {
    generation: u64,
    total_submitted: usize,
    remaining: AtomicU64,
    marked_stale: std::sync::atomic::AtomicBool,
    trigger_threshold: usize,
    poll_was_full: bool,
}

impl BatchTracker {
    /// Create a tracker for a batch of `total_submitted` jobs at `generation`,
    /// given a worker pool of `threadpool_size`.
    pub fn new(generation: u64, total_submitted: usize, poll_was_full: bool, threadpool_size: usize) -> Arc<Self> {
        let trigger_threshold = ((threadpool_size as f64) * (1.0 - TRIGGER_RATIO)).ceil() as usize;

        Arc::new(Self {
            generation,
            total_submitted,
            remaining: AtomicU64::new(total_submitted as u64),
            marked_stale: std::sync::atomic::AtomicBool::new(false),
            trigger_threshold: trigger_threshold.max(1),
            poll_was_full,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn total_submitted(&self) -> usize {
        self.total_submitted
    }

    /// A batch is stale if `current_gen` has since moved past it.
    pub fn is_older_generation_than(&self, current_gen: u64) -> bool {
        self.generation < current_gen
    }

    pub fn mark_stale(&self) {
        self.marked_stale.store(true, Ordering::Relaxed);
    }

    pub fn was_marked_stale(&self) -> bool {
        self.marked_stale.load(Ordering::Relaxed)
    }

    /// Record that one submitted job has finished running (regardless of
    /// whether it picked, was skipped, or errored), and return `true` if
    /// this decrement should trigger an early due-poll wakeup.
    ///
    /// This must be called exactly once per submitted job; use
    /// [`BatchTracker::guard`] to get that for free.
    fn one_execution_done(&self) -> bool {
        let previous = self.remaining.fetch_sub(1, Ordering::AcqRel);
        let now_remaining = (previous - 1) as usize;

        self.poll_was_full && now_remaining == self.trigger_threshold
    }

    /// Wrap one submitted job's lifetime in a guard that calls
    /// `one_execution_done` exactly once when dropped, invoking `on_trigger`
    /// if that decrement crosses the early-refill threshold.
    pub fn guard<F>(self: &Arc<Self>, on_trigger: F) -> BatchGuard<F>
    where
        F: FnOnce() + Send + 'static,
    {
        BatchGuard {
            batch: self.clone(),
            on_trigger: Some(on_trigger),
        }
    }
}

pub struct BatchGuard<F: FnOnce() + Send + 'static> {
    batch: Arc<BatchTracker>,
    on_trigger: Option<F>,
}

impl<F: FnOnce() + Send + 'static> Drop for BatchGuard<F> {
    fn drop(&mut self) {
        if self.batch.one_execution_done() {
            if let Some(f) = self.on_trigger.take() {
                f();
            }
        }
    }
}
