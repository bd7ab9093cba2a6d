use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dbsched_core::{ExecutionHandle, Task, TaskError, TaskRegistry};
use dbsched_tests::{insert_due, scheduler_for, test_config, wait_until};

/// A task that marks itself done exactly once, so the assertion is that
/// *some* node executed the row, not that a specific one did.
struct MarkOnceTask {
    done: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Task for MarkOnceTask {
    async fn execute(&self, _handle: &ExecutionHandle) -> Result<(), TaskError> {
        self.done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_success(&self, handle: &ExecutionHandle) {
        handle.remove().await.expect("remove should succeed");
    }

    async fn on_failure(&self, _handle: &ExecutionHandle, _error: &TaskError) {}
    async fn on_dead(&self, _handle: &ExecutionHandle) {}
}

/// Two scheduler nodes polling the same row; the store's atomic `pick`
/// (a single conditional `UPDATE ... RETURNING`) must hand it to exactly
/// one of them, never both.
#[sqlx::test(migrations = "../dbsched-postgres/migrations")]
async fn two_nodes_racing_on_one_execution_yields_exactly_one_winner(pool: sqlx::PgPool) {
    insert_due(&pool, "mark-once", "a").await;

    let done = Arc::new(AtomicUsize::new(0));
    let registry_a = TaskRegistry::builder()
        .register("mark-once", Arc::new(MarkOnceTask { done: done.clone() }))
        .build();
    let registry_b = TaskRegistry::builder()
        .register("mark-once", Arc::new(MarkOnceTask { done: done.clone() }))
        .build();

    let scheduler_a = scheduler_for("node-a", pool.clone(), registry_a, test_config());
    let scheduler_b = scheduler_for("node-b", pool.clone(), registry_b, test_config());

    scheduler_a.start().await.unwrap();
    scheduler_b.start().await.unwrap();

    wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) >= 1).await;
    // Give the loser's poll a chance to observe the row gone before we
    // assert there was no double-execution.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(done.load(Ordering::SeqCst), 1);

    scheduler_a.stop().await;
    scheduler_b.stop().await;
}
