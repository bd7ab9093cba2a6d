//! The orchestrator: three periodic single-threaded loops (due-poller,
//! dead-detector, heartbeat-updater) plus a bounded worker pool running the
//! pick-then-execute protocol for each due execution.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dbsched_core::{
    Clock, Execution, ExecutionHandle, ExecutionId, StatsSink, SystemClock, TaskError,
    TaskRegistry, Waiter,
};
use dbsched_core::event::{NoopSink, SchedulerEvent};
use dbsched_core::store::ExecutionStore;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::batch::BatchTracker;
use crate::config::Config;
use crate::error::SchedulerError;
use crate::pool::WorkerPool;
use crate::state::SchedulerState;

type StartupHook = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// How long `stop()` waits for each of the three periodic-loop tasks to
/// notice the shutdown flag and return before it gives up on them and moves
/// on to draining the worker pool.
const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The default cadence at which the due-poller wakes in the absence of an
/// early-wake. Independent of `heartbeat_interval` and pool sizing — this is
/// purely how often the due-poller checks on its own when nothing wakes it
/// early.
const DEFAULT_DUE_POLL_INTERVAL: Duration = Duration::from_secs(10);

struct Inner {
    name: String,
    store: Arc<dyn ExecutionStore>,
    registry: TaskRegistry,
    clock: Arc<dyn Clock>,
    config: Config,
    stats: Arc<dyn StatsSink>,
    due_poll_interval: Duration,

    state: SchedulerState,
    current_generation: AtomicU64,
    currently_processing: Mutex<HashMap<ExecutionId, DateTime<Utc>>>,

    due_waiter: Arc<Waiter>,
    dead_waiter: Waiter,
    heartbeat_waiter: Waiter,

    pool: WorkerPool,
    startup_hooks: Mutex<Vec<StartupHook>>,
}

/// A one-way capability to wake the due-poller early, handed to client code
/// so it can trigger an immediate poll after scheduling due work, without
/// giving the client ownership of (or a cyclic reference to) the scheduler
/// itself.
#[derive(Clone)]
pub struct WakeDue(Arc<Waiter>);

impl WakeDue {
    pub fn wake(&self) {
        self.0.wake();
    }
}

pub struct Scheduler {
    inner: Arc<Inner>,
    loops: Mutex<Option<Vec<JoinHandle<()>>>>,
}

pub struct SchedulerBuilder {
    name: String,
    store: Arc<dyn ExecutionStore>,
    registry: TaskRegistry,
    clock: Arc<dyn Clock>,
    config: Config,
    stats: Arc<dyn StatsSink>,
    due_poll_interval: Duration,
    on_startup: Vec<StartupHook>,
}

impl SchedulerBuilder {
    pub fn new(name: impl Into<String>, store: Arc<dyn ExecutionStore>, registry: TaskRegistry) -> Self {
        Self {
            name: name.into(),
            store,
            registry,
            clock: Arc::new(SystemClock),
            config: Config::default(),
            stats: Arc::new(NoopSink),
            due_poll_interval: DEFAULT_DUE_POLL_INTERVAL,
            on_startup: Vec::new(),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.stats = stats;
        self
    }

    pub fn due_poll_interval(mut self, interval: Duration) -> Self {
        self.due_poll_interval = interval;
        self
    }

    /// Register a hook to run once during `start()`, before the periodic
    /// loops launch. A failing hook is logged and otherwise ignored so that
    /// one bad hook can't block startup.
    pub fn on_startup<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_startup.push(Box::new(move || hook().boxed()));
        self
    }

    pub fn build(self) -> Scheduler {
        let inner = Arc::new(Inner {
            name: self.name,
            store: self.store,
            registry: self.registry,
            clock: self.clock,
            due_waiter: Arc::new(Waiter::new()),
            dead_waiter: Waiter::new(),
            heartbeat_waiter: Waiter::new(),
            pool: WorkerPool::new(self.config.threadpool_size),
            config: self.config,
            stats: self.stats,
            due_poll_interval: self.due_poll_interval,
            state: SchedulerState::new(),
            current_generation: AtomicU64::new(0),
            currently_processing: Mutex::new(HashMap::new()),
            startup_hooks: Mutex::new(self.on_startup),
        });

        Scheduler {
            inner,
            loops: Mutex::new(None),
        }
    }
}

impl Scheduler {
    pub fn builder(
        name: impl Into<String>,
        store: Arc<dyn ExecutionStore>,
        registry: TaskRegistry,
    ) -> SchedulerBuilder {
        SchedulerBuilder::new(name, store, registry)
    }

    /// A capability that lets client code wake the due-poller early without
    /// holding a reference to the scheduler itself.
    pub fn wake_due(&self) -> WakeDue {
        WakeDue(self.inner.due_waiter.clone())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Run onStartup hooks, then launch the three periodic loops and
    /// transition `CREATED -> STARTED`.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if !self.inner.state.start() {
            return Err(SchedulerError::AlreadyStarted);
        }

        let span = tracing::info_span!("scheduler", name = %self.inner.name);
        let _enter = span.enter();
        tracing::info!("starting up");

        let hooks = std::mem::take(&mut *self.inner.startup_hooks.lock());
        for hook in hooks {
            if let Err(e) = hook().await {
                tracing::warn!(error = %e, "onStartup hook failed, continuing");
            }
        }

        let due = tokio::spawn(run_due_poll_loop(self.inner.clone()).instrument(span.clone()));
        let dead = tokio::spawn(run_dead_detect_loop(self.inner.clone()).instrument(span.clone()));
        let heartbeat =
            tokio::spawn(run_heartbeat_loop(self.inner.clone()).instrument(span.clone()));

        *self.loops.lock() = Some(vec![due, dead, heartbeat]);

        Ok(())
    }

    /// Idempotent graceful shutdown: stop the three loops (5s grace each),
    /// then drain the worker pool for up to `shutdown_wait`.
    pub async fn stop(&self) {
        if !self.inner.state.request_shutdown() {
            tracing::warn!("stop() called but the scheduler was already shutting down");
            return;
        }

        // Wake every waiter so the loops notice the new state immediately
        // instead of waiting out their current cadence.
        self.inner.due_waiter.wake();
        self.inner.dead_waiter.wake();
        self.inner.heartbeat_waiter.wake();

        let handles = self.loops.lock().take().unwrap_or_default();
        for handle in handles {
            if tokio::time::timeout(LOOP_SHUTDOWN_GRACE, handle)
                .await
                .is_err()
            {
                tracing::warn!("a scheduler loop did not stop within its shutdown grace period");
            }
        }

        let still_running = self.inner.pool.shutdown(self.inner.config.shutdown_wait).await;
        if still_running > 0 {
            let stuck: Vec<ExecutionId> = self
                .inner
                .currently_processing
                .lock()
                .keys()
                .cloned()
                .collect();
            tracing::warn!(
                count = still_running,
                ?stuck,
                "worker pool did not drain within shutdown_wait"
            );
        }

        tracing::info!("shut down");
    }
}

async fn run_due_poll_loop(inner: Arc<Inner>) {
    loop {
        inner.due_waiter.wait_for(inner.due_poll_interval).await;

        if inner.state.is_shutting_down() {
            break;
        }

        let now = inner.clock.now();
        let due = match inner.store.get_due(now, inner.config.polling_limit).await {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "due-poll failed, will retry next tick");
                inner.stats.record(SchedulerEvent::UnexpectedError {
                    context: format!("get_due: {e}"),
                });
                continue;
            }
        };

        let found = due.len();
        let poll_was_full = found == inner.config.polling_limit && found > 0;
        let this_gen = inner.current_generation.load(Ordering::Relaxed) + 1;
        let batch = BatchTracker::new(this_gen, found, poll_was_full, inner.config.threadpool_size);

        for candidate in due {
            let inner = inner.clone();
            let batch = batch.clone();
            inner
                .pool
                .submit(async move { pick_and_execute(inner, candidate, batch).await })
                .await;
        }

        // Publish the new generation only after every job in this batch has
        // been submitted: any worker dequeuing with `batch.gen == current_gen`
        // is current, and anything strictly older has been superseded by a
        // fresh poll that already happened.
        inner.current_generation.store(this_gen, Ordering::Relaxed);
        inner.stats.record(SchedulerEvent::RanExecuteDue { found });
    }
}

async fn pick_and_execute(inner: Arc<Inner>, candidate: Execution, batch: Arc<BatchTracker>) {
    let wake_inner = inner.clone();
    let _batch_guard = batch.guard(move || wake_inner.due_waiter.wake());

    if inner.state.is_shutting_down() {
        return;
    }

    if batch.is_older_generation_than(inner.current_generation.load(Ordering::Relaxed)) {
        batch.mark_stale();
        inner
            .stats
            .record(SchedulerEvent::Stale { id: candidate.id.clone() });
        return;
    }

    let now = inner.clock.now();
    let picked = match inner.store.pick(&candidate, &inner.name, now).await {
        Ok(Some(picked)) => picked,
        Ok(None) => {
            inner
                .stats
                .record(SchedulerEvent::AlreadyPicked { id: candidate.id.clone() });
            return;
        }
        Err(e) => {
            tracing::warn!(id = %candidate.id, error = %e, "pick failed, will retry next poll");
            inner.stats.record(SchedulerEvent::UnexpectedError {
                context: format!("pick({}): {e}", candidate.id),
            });
            return;
        }
    };

    inner
        .currently_processing
        .lock()
        .insert(picked.id.clone(), now);
    let _processing_guard = ProcessingGuard {
        inner: &inner,
        id: picked.id.clone(),
    };

    inner
        .stats
        .record(SchedulerEvent::Executed { id: picked.id.clone() });

    let task = match inner.registry.resolve(picked.task_name()) {
        Some(task) => task,
        None => {
            tracing::error!(id = %picked.id, "no task registered under this name; leaving picked for dead-detection to recover");
            inner
                .stats
                .record(SchedulerEvent::UnresolvedTask { id: picked.id.clone() });
            return;
        }
    };

    let handle = ExecutionHandle::new(inner.store.clone(), picked.clone());

    // Only the task body is unwind-guarded: a panicking body is routed to
    // `on_failure` the same as a returned error, treating runtime errors and
    // panics alike. A panicking *handler*, by contrast, is left to propagate
    // no further than this job: the execution stays picked and
    // dead-detection recovers it.
    match AssertUnwindSafe(task.execute(&handle)).catch_unwind().await {
        Ok(Ok(())) => {
            if let Err(payload) = AssertUnwindSafe(task.on_success(&handle))
                .catch_unwind()
                .await
            {
                tracing::error!(
                    id = %picked.id,
                    panic = %panic_message(&payload),
                    "completion handler panicked; execution left picked for dead-detection"
                );
                inner
                    .stats
                    .record(SchedulerEvent::CompletionHandlerError { id: picked.id.clone() });
                return;
            }

            inner
                .stats
                .record(SchedulerEvent::Completed { id: picked.id.clone() });
        }
        Ok(Err(task_error)) => {
            run_failure_handler(&inner, &task, &handle, &picked.id, task_error).await;
        }
        Err(payload) => {
            let message = panic_message(&payload);
            let task_error = TaskError(anyhow::anyhow!("task panicked: {message}"));
            run_failure_handler(&inner, &task, &handle, &picked.id, task_error).await;
        }
    }
}

async fn run_failure_handler(
    inner: &Arc<Inner>,
    task: &Arc<dyn dbsched_core::Task>,
    handle: &ExecutionHandle,
    id: &ExecutionId,
    error: TaskError,
) {
    if let Err(payload) = AssertUnwindSafe(task.on_failure(handle, &error))
        .catch_unwind()
        .await
    {
        tracing::error!(
            %id,
            panic = %panic_message(&payload),
            "failure handler panicked; execution left picked for dead-detection"
        );
        inner
            .stats
            .record(SchedulerEvent::FailureHandlerError { id: id.clone() });
        return;
    }

    inner.stats.record(SchedulerEvent::Failed { id: id.clone() });
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

struct ProcessingGuard<'a> {
    inner: &'a Arc<Inner>,
    id: ExecutionId,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if self.inner.currently_processing.lock().remove(&self.id).is_none() {
            tracing::error!(id = %self.id, "execution was missing from currentlyProcessing on removal");
            self.inner.stats.record(SchedulerEvent::UnexpectedError {
                context: format!("currentlyProcessing missing entry for {}", self.id),
            });
        }
    }
}

async fn run_dead_detect_loop(inner: Arc<Inner>) {
    loop {
        inner
            .dead_waiter
            .wait_for(inner.config.detect_dead_cadence())
            .await;

        if inner.state.is_shutting_down() {
            break;
        }

        let now = inner.clock.now();
        let threshold = now - chrono::Duration::from_std(inner.config.max_age_before_dead())
            .unwrap_or(chrono::Duration::zero());

        let dead = match inner.store.get_old_executions(threshold).await {
            Ok(dead) => dead,
            Err(e) => {
                tracing::warn!(error = %e, "dead-detection query failed, will retry next tick");
                inner.stats.record(SchedulerEvent::UnexpectedError {
                    context: format!("get_old_executions: {e}"),
                });
                continue;
            }
        };

        for execution in dead {
            let id = execution.id.clone();
            let Some(task) = inner.registry.resolve(execution.task_name()) else {
                tracing::warn!(%id, "dead execution's task is not registered; leaving as-is");
                inner.stats.record(SchedulerEvent::UnresolvedTask { id });
                continue;
            };

            let handle = ExecutionHandle::new(inner.store.clone(), execution);
            task.on_dead(&handle).await;
            inner.stats.record(SchedulerEvent::DeadExecution { id });
        }

        inner.stats.record(SchedulerEvent::RanDetectDead);
    }
}

async fn run_heartbeat_loop(inner: Arc<Inner>) {
    loop {
        inner
            .heartbeat_waiter
            .wait_for(inner.config.heartbeat_interval)
            .await;

        if inner.state.is_shutting_down() {
            break;
        }

        let now = inner.clock.now();
        let ids: Vec<ExecutionId> = inner.currently_processing.lock().keys().cloned().collect();
        let count = ids.len();

        for id in ids {
            if let Err(e) = inner.store.update_heartbeat(&id, now).await {
                tracing::warn!(%id, error = %e, "heartbeat update failed, continuing");
            }
        }

        inner.stats.record(SchedulerEvent::RanUpdateHeartbeats { count });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration as StdDuration;

    use chrono::Duration as ChronoDuration;
    use dbsched_core::store::memory::MemoryStore;
    use dbsched_core::{Execution, ExecutionId, ExecutionUpdate, FakeClock};

    use super::*;

    fn small_config() -> Config {
        Config {
            threadpool_size: 4,
            polling_limit: 10,
            heartbeat_interval: StdDuration::from_millis(20),
            shutdown_wait: StdDuration::from_secs(5),
            enable_immediate_execution: true,
        }
    }

    async fn wait_until<F: Fn() -> bool>(pred: F) {
        tokio::time::timeout(StdDuration::from_secs(2), async {
            while !pred() {
                tokio::time::sleep(StdDuration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition did not become true in time");
    }

    struct CountingTask {
        executed: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl dbsched_core::Task for CountingTask {
        async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_success(&self, handle: &ExecutionHandle) {
            handle.remove().await.expect("remove should succeed");
        }

        async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}
        async fn on_dead(&self, _handle: &ExecutionHandle) {}
    }

    struct FailingTask;

    #[async_trait::async_trait]
    impl dbsched_core::Task for FailingTask {
        async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
            Err(TaskError(anyhow::anyhow!("boom")))
        }

        async fn on_success(&self, _handle: &ExecutionHandle) {}

        async fn on_failure(&self, handle: &ExecutionHandle, _error: &TaskError) {
            let execution = handle.execution();
            let next = execution.execution_time + ChronoDuration::seconds(60);
            handle
                .reschedule(
                    next,
                    ExecutionUpdate {
                        consecutive_failures: Some(execution.consecutive_failures + 1),
                        ..Default::default()
                    },
                )
                .await
                .expect("reschedule should succeed");
        }

        async fn on_dead(&self, _handle: &ExecutionHandle) {}
    }

    struct PanickingTask {
        failure_handler_ran: AtomicBool,
    }

    #[async_trait::async_trait]
    impl dbsched_core::Task for PanickingTask {
        async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
            panic!("task body panicked");
        }

        async fn on_success(&self, _handle: &ExecutionHandle) {}

        async fn on_failure(&self, handle: &ExecutionHandle, _error: &TaskError) {
            self.failure_handler_ran.store(true, Ordering::SeqCst);
            handle.remove().await.expect("remove should succeed");
        }

        async fn on_dead(&self, _handle: &ExecutionHandle) {}
    }

    struct ReviveTask {
        revived: AtomicBool,
    }

    #[async_trait::async_trait]
    impl dbsched_core::Task for ReviveTask {
        async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
            Ok(())
        }

        async fn on_success(&self, _handle: &ExecutionHandle) {}
        async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}

        async fn on_dead(&self, handle: &ExecutionHandle) {
            self.revived.store(true, Ordering::SeqCst);
            let execution = handle.execution();
            let next = execution.execution_time + ChronoDuration::seconds(60);
            handle
                .reschedule(next, ExecutionUpdate::default())
                .await
                .expect("reschedule should succeed");
        }
    }

    #[tokio::test]
    async fn completes_a_due_execution_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(Utc::now()));
        let id = ExecutionId::new("counting", "a");
        store
            .create_if_not_exists(Execution::new(id.clone(), Vec::new(), clock.now()))
            .await
            .unwrap();

        let registry = TaskRegistry::builder()
            .register("counting", Arc::new(CountingTask { executed: AtomicUsize::new(0) }))
            .build();

        let scheduler = Scheduler::builder("node-a", store.clone(), registry)
            .clock(clock)
            .config(small_config())
            .due_poll_interval(StdDuration::from_millis(15))
            .build();

        scheduler.start().await.unwrap();
        wait_until(|| {
            futures_util::FutureExt::now_or_never(store.get(&id))
                .and_then(|r| r.ok())
                .flatten()
                .is_none()
        })
        .await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn failing_task_is_rescheduled_with_incremented_failure_count() {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(Utc::now()));
        let id = ExecutionId::new("failing", "a");
        store
            .create_if_not_exists(Execution::new(id.clone(), Vec::new(), clock.now()))
            .await
            .unwrap();

        let registry = TaskRegistry::builder()
            .register("failing", Arc::new(FailingTask))
            .build();

        let scheduler = Scheduler::builder("node-a", store.clone(), registry)
            .clock(clock)
            .config(small_config())
            .due_poll_interval(StdDuration::from_millis(15))
            .build();

        scheduler.start().await.unwrap();
        wait_until(|| {
            futures_util::FutureExt::now_or_never(store.get(&id))
                .and_then(|r| r.ok())
                .flatten()
                .is_some_and(|e| e.consecutive_failures == 1 && !e.picked)
        })
        .await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn panicking_task_body_is_routed_to_the_failure_handler() {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(Utc::now()));
        let id = ExecutionId::new("panicking", "a");
        store
            .create_if_not_exists(Execution::new(id.clone(), Vec::new(), clock.now()))
            .await
            .unwrap();

        let task = Arc::new(PanickingTask {
            failure_handler_ran: AtomicBool::new(false),
        });
        let registry = TaskRegistry::builder()
            .register("panicking", task.clone())
            .build();

        let scheduler = Scheduler::builder("node-a", store.clone(), registry)
            .clock(clock)
            .config(small_config())
            .due_poll_interval(StdDuration::from_millis(15))
            .build();

        scheduler.start().await.unwrap();
        wait_until(|| task.failure_handler_ran.load(Ordering::SeqCst)).await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn dead_detector_recovers_an_execution_with_a_stale_heartbeat() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let id = ExecutionId::new("revive", "a");
        let exec = Execution::new(id.clone(), Vec::new(), clock.now());
        store.create_if_not_exists(exec.clone()).await.unwrap();

        // Simulate another node having picked this execution and then
        // disappearing without ever sending a heartbeat update.
        store.pick(&exec, "some-other-node", clock.now()).await.unwrap();

        let task = Arc::new(ReviveTask {
            revived: AtomicBool::new(false),
        });
        let registry = TaskRegistry::builder()
            .register("revive", task.clone())
            .build();

        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let scheduler = Scheduler::builder("node-a", store.clone(), registry)
            .clock(clock_dyn)
            .config(small_config())
            .due_poll_interval(StdDuration::from_millis(15))
            .build();

        scheduler.start().await.unwrap();
        // heartbeat_interval = 20ms, so max_age_before_dead = 80ms.
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        clock.advance(StdDuration::from_millis(200));

        wait_until(|| task.revived.load(Ordering::SeqCst)).await;
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn start_twice_reports_already_started() {
        let store = Arc::new(MemoryStore::new());
        let registry = TaskRegistry::builder().build();
        let scheduler = Scheduler::builder("node-a", store, registry).build();

        scheduler.start().await.unwrap();
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyStarted)
        ));
        scheduler.stop().await;
    }

    struct SlowCountingTask {
        executed: AtomicUsize,
        sleep_for: StdDuration,
    }

    #[async_trait::async_trait]
    impl dbsched_core::Task for SlowCountingTask {
        async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
            tokio::time::sleep(self.sleep_for).await;
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_success(&self, handle: &ExecutionHandle) {
            handle.remove().await.expect("remove should succeed");
        }

        async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}
        async fn on_dead(&self, _handle: &ExecutionHandle) {}
    }

    #[derive(Default)]
    struct CountingSink {
        stale: AtomicUsize,
        completed: AtomicUsize,
    }

    impl dbsched_core::StatsSink for CountingSink {
        fn record(&self, event: dbsched_core::event::SchedulerEvent) {
            match event {
                dbsched_core::event::SchedulerEvent::Stale { .. } => {
                    self.stale.fetch_add(1, Ordering::SeqCst);
                }
                dbsched_core::event::SchedulerEvent::Completed { .. } => {
                    self.completed.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }
    }

    /// A single-worker pool throttled by a slow task body means the due-poller's
    /// second tick fires while most of the first batch's jobs are still queued
    /// behind the one running job. Those queued jobs must discard themselves as
    /// stale rather than picking rows the fresh poll already re-read, and every
    /// row must still end up executed exactly once.
    #[tokio::test]
    async fn queued_jobs_from_a_superseded_batch_are_discarded_as_stale() {
        let store = Arc::new(MemoryStore::new());
        let clock: Arc<dyn Clock> = Arc::new(FakeClock::new(Utc::now()));
        for i in 0..10 {
            store
                .create_if_not_exists(Execution::new(
                    ExecutionId::new("counting", &i.to_string()),
                    Vec::new(),
                    clock.now(),
                ))
                .await
                .unwrap();
        }

        let task = Arc::new(SlowCountingTask {
            executed: AtomicUsize::new(0),
            sleep_for: StdDuration::from_millis(50),
        });
        let registry = TaskRegistry::builder()
            .register("counting", task.clone())
            .build();
        let sink = Arc::new(CountingSink::default());

        let scheduler = Scheduler::builder("node-a", store.clone(), registry)
            .clock(clock)
            .config(Config {
                threadpool_size: 1,
                polling_limit: 10,
                heartbeat_interval: StdDuration::from_secs(60),
                shutdown_wait: StdDuration::from_secs(5),
                enable_immediate_execution: true,
            })
            .stats(sink.clone() as Arc<dyn StatsSink>)
            .due_poll_interval(StdDuration::from_millis(30))
            .build();

        scheduler.start().await.unwrap();

        tokio::time::timeout(StdDuration::from_secs(5), async {
            while task.executed.load(Ordering::SeqCst) < 10 {
                tokio::time::sleep(StdDuration::from_millis(10)).await;
            }
        })
        .await
        .expect("all ten rows should eventually execute");

        scheduler.stop().await;

        assert_eq!(
            task.executed.load(Ordering::SeqCst),
            10,
            "every row must execute exactly once across the generation boundary"
        );
        assert_eq!(sink.completed.load(Ordering::SeqCst), 10);
        assert!(
            sink.stale.load(Ordering::SeqCst) > 0,
            "the first batch's queued-but-not-yet-run jobs should have been discarded as stale"
        );
    }
}
