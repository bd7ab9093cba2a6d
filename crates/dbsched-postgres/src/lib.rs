//! A Postgres-backed [`dbsched_core::ExecutionStore`].
//!
//! Every contention-point operation (`pick`, `reschedule`, `remove`) is a
//! single `UPDATE ... WHERE version = $n RETURNING ...` or `DELETE ...
//! WHERE version = $n`, never a read followed by a write. Queries bind
//! through the untyped `sqlx::query`/`query_as` runtime API rather than the
//! compile-time-checked `sqlx::query!` macros, which would require a live
//! database reachable at build time.

mod row;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dbsched_core::store::{ExecutionStore, ListFilter};
use dbsched_core::{Execution, ExecutionId, ExecutionUpdate, StoreError};
use sqlx::{PgPool, QueryBuilder};

use crate::row::ExecutionRow;

/// Embedded schema migrations (`migrations/`), applied via
/// [`PostgresStore::migrate`].
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("migrations");

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations. Call once at startup before the
    /// scheduler begins polling.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        MIGRATOR.run(&self.pool).await
    }
}

fn transient(context: &'static str, error: sqlx::Error) -> StoreError {
    tracing::debug!(context, error = %error, "transient store error");
    StoreError::Transient(anyhow::anyhow!("{context}: {error}"))
}

fn fatal(context: &'static str, error: impl std::fmt::Display) -> StoreError {
    StoreError::Fatal(anyhow::anyhow!("{context}: {error}"))
}

#[async_trait]
impl ExecutionStore for PostgresStore {
    async fn create_if_not_exists(&self, execution: Execution) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO dbsched.execution
                (task_name, instance_id, data, execution_time, version)
             VALUES ($1, $2, $3, $4, 1)
             ON CONFLICT (task_name, instance_id) DO NOTHING",
        )
        .bind(execution.task_name())
        .bind(execution.instance_id())
        .bind(&execution.data)
        .bind(execution.execution_time)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("create_if_not_exists", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn get_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT task_name, instance_id, data, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, consecutive_failures, version
             FROM dbsched.execution
             WHERE NOT picked AND execution_time <= $1
             ORDER BY execution_time ASC
             LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| transient("get_due", e))?;

        Ok(rows.into_iter().map(Execution::from).collect())
    }

    async fn pick(
        &self,
        candidate: &Execution,
        picked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "UPDATE dbsched.execution
                SET picked = true,
                    picked_by = $1,
                    last_heartbeat = $2,
                    version = version + 1
              WHERE task_name = $3
                AND instance_id = $4
                AND version = $5
                AND NOT picked
             RETURNING task_name, instance_id, data, execution_time, picked, picked_by,
                       last_heartbeat, last_success, last_failure, consecutive_failures, version",
        )
        .bind(picked_by)
        .bind(now)
        .bind(candidate.task_name())
        .bind(candidate.instance_id())
        .bind(candidate.version as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| transient("pick", e))?;

        Ok(row.map(Execution::from))
    }

    async fn update_heartbeat(&self, id: &ExecutionId, now: DateTime<Utc>) -> Result<(), StoreError> {
        // Advisory: no version check, no version bump (so a long-running
        // execution's eventual remove/reschedule never loses its version race
        // against its own heartbeats), and no error on a row that's gone.
        let result = sqlx::query(
            "UPDATE dbsched.execution
                SET last_heartbeat = $1
              WHERE task_name = $2 AND instance_id = $3 AND picked",
        )
        .bind(now)
        .bind(&id.task_name)
        .bind(&id.instance_id)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("update_heartbeat", e))?;

        if result.rows_affected() == 0 {
            tracing::debug!(%id, "heartbeat update was a no-op: row missing or no longer picked");
        }

        Ok(())
    }

    async fn get_old_executions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT task_name, instance_id, data, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, consecutive_failures, version
             FROM dbsched.execution
             WHERE picked AND last_heartbeat < $1",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| transient("get_old_executions", e))?;

        Ok(rows.into_iter().map(Execution::from).collect())
    }

    async fn remove(&self, execution: &Execution) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM dbsched.execution WHERE task_name = $1 AND instance_id = $2 AND version = $3",
        )
        .bind(execution.task_name())
        .bind(execution.instance_id())
        .bind(execution.version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("remove", e))?;

        if result.rows_affected() == 0 {
            return Err(fatal(
                "remove",
                format_args!("execution {} was concurrently modified or no longer exists", execution.id),
            ));
        }

        Ok(())
    }

    async fn reschedule(
        &self,
        execution: &Execution,
        new_time: DateTime<Utc>,
        update: ExecutionUpdate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE dbsched.execution
                SET execution_time = $1,
                    picked = false,
                    picked_by = NULL,
                    last_heartbeat = NULL,
                    last_success = COALESCE($2, last_success),
                    last_failure = COALESCE($3, last_failure),
                    consecutive_failures = COALESCE($4, consecutive_failures),
                    version = version + 1
              WHERE task_name = $5 AND instance_id = $6 AND version = $7",
        )
        .bind(new_time)
        .bind(update.last_success)
        .bind(update.last_failure)
        .bind(update.consecutive_failures.map(|n| n as i32))
        .bind(execution.task_name())
        .bind(execution.instance_id())
        .bind(execution.version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| transient("reschedule", e))?;

        if result.rows_affected() == 0 {
            return Err(fatal(
                "reschedule",
                format_args!("execution {} was concurrently modified or no longer exists", execution.id),
            ));
        }

        Ok(())
    }

    async fn get_executions_failing_longer_than(
        &self,
        now: DateTime<Utc>,
        duration: chrono::Duration,
    ) -> Result<Vec<Execution>, StoreError> {
        let threshold = now - duration;
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT task_name, instance_id, data, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, consecutive_failures, version
             FROM dbsched.execution
             WHERE consecutive_failures > 0 AND last_failure <= $1",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| transient("get_executions_failing_longer_than", e))?;

        Ok(rows.into_iter().map(Execution::from).collect())
    }

    async fn get(&self, id: &ExecutionId) -> Result<Option<Execution>, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT task_name, instance_id, data, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, consecutive_failures, version
             FROM dbsched.execution
             WHERE task_name = $1 AND instance_id = $2",
        )
        .bind(&id.task_name)
        .bind(&id.instance_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| transient("get", e))?;

        Ok(row.map(Execution::from))
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Execution>, StoreError> {
        let mut query = QueryBuilder::new(
            "SELECT task_name, instance_id, data, execution_time, picked, picked_by,
                    last_heartbeat, last_success, last_failure, consecutive_failures, version
             FROM dbsched.execution WHERE true",
        );

        if let Some(task_name) = &filter.task_name {
            query.push(" AND task_name = ").push_bind(task_name);
        }

        if let Some(picked) = filter.picked {
            query.push(" AND picked = ").push_bind(picked);
        }

        query.push(" ORDER BY execution_time ASC");

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build_query_as::<ExecutionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| transient("list", e))?;

        Ok(rows.into_iter().map(Execution::from).collect())
    }
}
