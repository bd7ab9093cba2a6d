use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dbsched_core::TaskRegistry;
use dbsched_tests::{insert_due, scheduler_for, test_config, wait_until, CountingTask};

#[sqlx::test(migrations = "../dbsched-postgres/migrations")]
async fn single_due_execution_executes_and_is_removed(pool: sqlx::PgPool) {
    let id = insert_due(&pool, "counting", "a").await;

    let task = Arc::new(CountingTask::default());
    let registry = TaskRegistry::builder()
        .register("counting", task.clone())
        .build();

    let scheduler = scheduler_for("node-a", pool.clone(), registry, test_config());
    scheduler.start().await.unwrap();

    wait_until(Duration::from_secs(5), || {
        task.executed.load(Ordering::SeqCst) == 1
    })
    .await;

    let store = dbsched_postgres::PostgresStore::new(pool);
    wait_until(Duration::from_secs(5), || {
        futures_util::FutureExt::now_or_never(dbsched_core::store::ExecutionStore::get(
            &store, &id,
        ))
        .and_then(|r| r.ok())
        .flatten()
        .is_none()
    })
    .await;

    scheduler.stop().await;
}
