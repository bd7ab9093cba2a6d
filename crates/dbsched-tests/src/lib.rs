//! Shared helpers for integration tests that exercise `dbsched-runtime`
//! against a live Postgres database via `dbsched-postgres`.
//!
//! These tests require a reachable `DATABASE_URL` (loaded from `.env` via
//! `dotenvy`) and are skipped wherever no database is reachable.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use dbsched_core::{Execution, ExecutionHandle, ExecutionId, TaskError, TaskRegistry};
use dbsched_postgres::PostgresStore;
use dbsched_runtime::{Config, Scheduler};

pub fn test_config() -> Config {
    Config {
        threadpool_size: 4,
        polling_limit: 10,
        heartbeat_interval: StdDuration::from_millis(100),
        shutdown_wait: StdDuration::from_secs(5),
        enable_immediate_execution: true,
    }
}

pub fn scheduler_for(
    name: impl Into<String>,
    pool: sqlx::PgPool,
    registry: TaskRegistry,
    config: Config,
) -> Scheduler {
    scheduler_with_interval(name, pool, registry, config, StdDuration::from_millis(50))
}

pub fn scheduler_with_interval(
    name: impl Into<String>,
    pool: sqlx::PgPool,
    registry: TaskRegistry,
    config: Config,
    due_poll_interval: StdDuration,
) -> Scheduler {
    let store: Arc<dyn dbsched_core::store::ExecutionStore> = Arc::new(PostgresStore::new(pool));
    Scheduler::builder(name, store, registry)
        .config(config)
        .due_poll_interval(due_poll_interval)
        .build()
}

pub async fn insert_due(pool: &sqlx::PgPool, task_name: &str, instance_id: &str) -> ExecutionId {
    let id = ExecutionId::new(task_name, instance_id);
    let store = PostgresStore::new(pool.clone());
    dbsched_core::store::ExecutionStore::create_if_not_exists(
        &store,
        Execution::new(id.clone(), Vec::new(), Utc::now()),
    )
    .await
    .expect("insert due execution");
    id
}

/// A task whose `execute` always succeeds and whose completion handler
/// removes the row (a one-shot task), counting how many times it ran.
pub struct CountingTask {
    pub executed: std::sync::atomic::AtomicUsize,
}

impl Default for CountingTask {
    fn default() -> Self {
        Self {
            executed: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl dbsched_core::Task for CountingTask {
    async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
        self.executed
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        // Slow enough that a throttled pool can be observed mid-batch by
        // the stale-batch-discard scenario.
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        Ok(())
    }

    async fn on_success(&self, handle: &ExecutionHandle) {
        handle.remove().await.expect("remove should succeed");
    }

    async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}
    async fn on_dead(&self, _handle: &ExecutionHandle) {}
}

/// A task that reschedules itself on death, recording that it was revived.
pub struct ReviveTask {
    pub revived: std::sync::atomic::AtomicBool,
}

impl Default for ReviveTask {
    fn default() -> Self {
        Self {
            revived: std::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[async_trait::async_trait]
impl dbsched_core::Task for ReviveTask {
    async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
        Ok(())
    }

    async fn on_success(&self, _handle: &ExecutionHandle) {}
    async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}

    async fn on_dead(&self, handle: &ExecutionHandle) {
        self.revived
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let next = Utc::now() + chrono::Duration::seconds(60);
        handle
            .reschedule(next, dbsched_core::ExecutionUpdate::default())
            .await
            .expect("reschedule should succeed");
    }
}

/// Poll `pred` until it's true or `timeout` elapses, panicking on timeout.
pub async fn wait_until<F: Fn() -> bool>(timeout: StdDuration, pred: F) {
    tokio::time::timeout(timeout, async {
        while !pred() {
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition did not become true in time");
}

#[ctor::ctor]
fn setup_tracing() {
    use tracing_subscriber::prelude::*;

    let _ = dotenvy::dotenv();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
