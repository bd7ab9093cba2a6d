use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dbsched_core::{ExecutionHandle, Task, TaskError, TaskRegistry};
use dbsched_tests::{insert_due, scheduler_for, test_config};

struct SlowTask {
    completed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl Task for SlowTask {
    async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(())
    }

    async fn on_success(&self, handle: &ExecutionHandle) {
        handle.remove().await.expect("remove should succeed");
        self.completed.store(true, Ordering::SeqCst);
    }

    async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}
    async fn on_dead(&self, _handle: &ExecutionHandle) {}
}

/// `stop()` must wait out an in-flight job rather than abandon it: a long
/// running task started just before shutdown should still reach its
/// completion handler as long as it finishes within `shutdown_wait`.
#[sqlx::test(migrations = "../dbsched-postgres/migrations")]
async fn graceful_shutdown_waits_for_an_in_flight_task(pool: sqlx::PgPool) {
    insert_due(&pool, "slow", "a").await;

    let completed = Arc::new(AtomicBool::new(false));
    let registry = TaskRegistry::builder()
        .register(
            "slow",
            Arc::new(SlowTask {
                completed: completed.clone(),
            }),
        )
        .build();

    let mut config = test_config();
    config.shutdown_wait = Duration::from_secs(5);

    let scheduler = scheduler_for("node-a", pool, registry, config);
    scheduler.start().await.unwrap();

    // Give the due-poller a moment to pick the row and start the task
    // body's sleep before we ask for shutdown.
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop().await;

    assert!(completed.load(Ordering::SeqCst));
}
