use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dbsched_core::store::ExecutionStore;
use dbsched_core::{Execution, ExecutionId, TaskRegistry};
use dbsched_postgres::PostgresStore;
use dbsched_tests::{scheduler_for, test_config, wait_until, ReviveTask};

/// An execution picked by a node that vanished without ever sending a
/// heartbeat update looks, after `max_age_before_dead`, exactly like one
/// abandoned mid-crash. The dead detector on a surviving node must recover
/// it through `on_dead` rather than leave it picked forever.
#[sqlx::test(migrations = "../dbsched-postgres/migrations")]
async fn stale_heartbeat_is_recovered_by_the_dead_detector(pool: sqlx::PgPool) {
    let store = PostgresStore::new(pool.clone());
    let id = ExecutionId::new("revive", "a");
    let execution = Execution::new(id.clone(), Vec::new(), chrono::Utc::now());
    store.create_if_not_exists(execution.clone()).await.unwrap();

    // Simulate a node that picked the row, then crashed before its first
    // heartbeat: the row is left `picked` with a heartbeat old enough to
    // already be past `max_age_before_dead` for a short heartbeat_interval.
    let old_heartbeat = chrono::Utc::now() - chrono::Duration::seconds(10);
    store.pick(&execution, "dead-node", old_heartbeat).await.unwrap();

    let task = Arc::new(ReviveTask::default());
    let registry = TaskRegistry::builder()
        .register("revive", task.clone())
        .build();

    let mut config = test_config();
    config.heartbeat_interval = Duration::from_millis(50); // max_age_before_dead = 200ms

    let scheduler = scheduler_for("node-a", pool, registry, config);
    scheduler.start().await.unwrap();

    wait_until(Duration::from_secs(5), || task.revived.load(Ordering::SeqCst)).await;

    scheduler.stop().await;
}
