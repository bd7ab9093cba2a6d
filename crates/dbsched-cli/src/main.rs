use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dbsched_core::event::TracingSink;
use dbsched_core::TaskRegistry;
use dbsched_postgres::PostgresStore;
use dbsched_runtime::{Config, Scheduler};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// A name identifying this scheduler node; recorded as `picked_by` on
    /// every execution this node picks. Defaults to the local hostname.
    #[arg(long, env = "DBSCHED_NODE_NAME")]
    node_name: Option<String>,

    /// Apply pending schema migrations before starting.
    #[arg(long)]
    migrate: bool,

    #[arg(long, env = "DBSCHED_THREADPOOL_SIZE", default_value_t = 10)]
    threadpool_size: usize,

    #[arg(long, env = "DBSCHED_POLLING_LIMIT", default_value_t = 100)]
    polling_limit: usize,

    #[arg(long, env = "DBSCHED_HEARTBEAT_INTERVAL", default_value = "5s")]
    heartbeat_interval: humantime::Duration,

    #[arg(long, env = "DBSCHED_SHUTDOWN_WAIT", default_value = "30m")]
    shutdown_wait: humantime::Duration,

    #[arg(long, env = "DBSCHED_DISABLE_IMMEDIATE_EXECUTION")]
    disable_immediate_execution: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_filter(tracing_subscriber::EnvFilter::from_default_env()),
        )
        .init();

    let args = Args::parse();
    let node_name = args
        .node_name
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| format!("dbsched-{}", uuid::Uuid::new_v4()));

    let options = sqlx::postgres::PgConnectOptions::from_str(&args.database_url)
        .context("failed to parse database url")?
        .application_name("dbsched");
    let pool = sqlx::pool::PoolOptions::new()
        .acquire_timeout(Duration::from_secs(60))
        .max_connections(args.threadpool_size as u32 + 5)
        .connect_with(options)
        .await
        .context("failed to connect to the database")?;

    let store = PostgresStore::new(pool);
    if args.migrate {
        store.migrate().await.context("failed to migrate database")?;
    }

    // No tasks are wired in by default: populating the registry is left to
    // the embedding application. This binary demonstrates node wiring;
    // production deployments link their own `TaskRegistry` in.
    let registry = TaskRegistry::builder().build();

    let config = Config {
        threadpool_size: args.threadpool_size,
        polling_limit: args.polling_limit,
        heartbeat_interval: args.heartbeat_interval.into(),
        shutdown_wait: args.shutdown_wait.into(),
        enable_immediate_execution: !args.disable_immediate_execution,
    };

    let scheduler = Arc::new(
        Scheduler::builder(node_name, Arc::new(store), registry)
            .config(config)
            .stats(Arc::new(TracingSink))
            .build(),
    );

    tracing::info!(name = %scheduler.name(), "dbsched starting up");
    scheduler.start().await.context("scheduler failed to start")?;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => (),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("received shutdown signal");
    scheduler.stop().await;

    Ok(())
}
