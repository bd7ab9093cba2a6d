//! A bounded pool of workers executing submitted jobs.
//!
//! Combines a counting `Semaphore` to cap concurrency with a
//! `tokio::task::JoinSet` to track the spawned job futures. Submission never
//! blocks the due-poller: jobs are spawned immediately and acquire their
//! permit inside the spawned task, so "unbounded queueing" falls naturally
//! out of the Tokio task scheduler rather than needing a bespoke queue.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// The default time `WorkerPool::shutdown` waits for in-flight jobs before
/// giving up and logging whatever is still running.
pub const DEFAULT_SHUTDOWN_WAIT: Duration = Duration::from_secs(30 * 60);

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: tokio::sync::Mutex<JoinSet<()>>,
    shutting_down: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Submit a job to run as soon as a permit is free.
    ///
    /// Jobs submitted after [`WorkerPool::begin_shutdown`] has been called
    /// are discarded without running.
    pub async fn submit<Fut>(&self, job: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }

        let semaphore = self.semaphore.clone();
        let mut tasks = self.tasks.lock().await;

        // Reap finished jobs so the joinset doesn't grow without bound.
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };

            job.await;
        });
    }

    /// Stop accepting new submissions. Already-submitted jobs keep running.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    /// Wait up to `shutdown_wait` for in-flight jobs to finish. Returns the
    /// number of jobs still running when the deadline was hit (0 means a
    /// clean drain).
    pub async fn shutdown(&self, shutdown_wait: Duration) -> usize {
        self.begin_shutdown();

        let mut tasks = self.tasks.lock().await;
        let deadline = tokio::time::Instant::now() + shutdown_wait;

        loop {
            if tasks.is_empty() {
                return 0;
            }

            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    return tasks.len();
                }
                joined = tasks.join_next() => {
                    if joined.is_none() {
                        return 0;
                    }
                }
            }
        }
    }
}
