use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dbsched_core::TaskRegistry;
use dbsched_runtime::Config;
use dbsched_tests::{insert_due, scheduler_with_interval, wait_until, CountingTask};

/// A due-poll that comes back full (`polling_limit` rows) is a hint there's
/// more work waiting. With a due-poll interval much longer than the time it
/// takes a small pool to chew through twice its own size of jobs, the only
/// way every job finishes well inside that interval is an early refill
/// triggered once half the pool frees up.
#[sqlx::test(migrations = "../dbsched-postgres/migrations")]
async fn a_full_poll_triggers_an_early_refill_before_the_next_interval(pool: sqlx::PgPool) {
    let threadpool_size = 4;
    for i in 0..(threadpool_size * 2) {
        insert_due(&pool, "counting", &format!("job-{i}")).await;
    }

    let task = Arc::new(CountingTask::default());
    let registry = TaskRegistry::builder()
        .register("counting", task.clone())
        .build();

    let config = Config {
        threadpool_size,
        polling_limit: threadpool_size,
        heartbeat_interval: Duration::from_secs(5),
        shutdown_wait: Duration::from_secs(5),
        enable_immediate_execution: true,
    };

    // Each CountingTask execution sleeps 30ms; with no early refill, the
    // second batch of `threadpool_size` jobs would sit unpicked until this
    // 3s interval next elapses.
    let scheduler =
        scheduler_with_interval("node-a", pool, registry, config, Duration::from_secs(3));
    scheduler.start().await.unwrap();

    wait_until(Duration::from_secs(2), || {
        task.executed.load(Ordering::SeqCst) == threadpool_size * 2
    })
    .await;

    scheduler.stop().await;
}
