use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dbsched_core::TaskRegistry;
use dbsched_tests::{insert_due, scheduler_for, test_config, wait_until, CountingTask};

/// Restarting a scheduler under the same node name bumps its batch
/// generation; jobs queued against the previous generation must be
/// discarded rather than picked twice. The externally observable
/// consequence is that a row due at restart time still executes exactly
/// once, never zero or two times, across the generation boundary.
#[sqlx::test(migrations = "../dbsched-postgres/migrations")]
async fn restart_across_a_generation_boundary_executes_exactly_once(pool: sqlx::PgPool) {
    let task = Arc::new(CountingTask::default());
    let registry = TaskRegistry::builder()
        .register("counting", task.clone())
        .build();

    let scheduler = scheduler_for("node-a", pool.clone(), registry, test_config());
    scheduler.start().await.unwrap();

    insert_due(&pool, "counting", "a").await;

    // Tear the scheduler down and bring a fresh one up immediately,
    // racing the new generation's first poll against any work the old
    // generation's loop queued but hadn't yet run.
    scheduler.stop().await;

    let registry2 = TaskRegistry::builder()
        .register("counting", task.clone())
        .build();
    let scheduler2 = scheduler_for("node-a", pool, registry2, test_config());
    scheduler2.start().await.unwrap();

    wait_until(Duration::from_secs(5), || {
        task.executed.load(Ordering::SeqCst) >= 1
    })
    .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(task.executed.load(Ordering::SeqCst), 1);

    scheduler2.stop().await;
}
