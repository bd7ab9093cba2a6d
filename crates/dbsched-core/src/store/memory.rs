//! An in-memory [`ExecutionStore`] reference implementation.
//!
//! This is not a production persistence option — it exists so the
//! orchestrator and its concurrency properties can be exercised in tests
//! without a database, and so multiple `Scheduler` instances can be pointed
//! at one `Arc<MemoryStore>` to simulate several nodes racing over a shared
//! store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::execution::{Execution, ExecutionId, ExecutionUpdate};
use crate::store::{ExecutionStore, ListFilter};

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<ExecutionId, Execution>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict(id: &ExecutionId) -> StoreError {
        StoreError::Fatal(anyhow::anyhow!(
            "execution {id} was concurrently modified or no longer exists"
        ))
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_if_not_exists(&self, execution: Execution) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock();
        if rows.contains_key(&execution.id) {
            return Ok(false);
        }

        rows.insert(execution.id.clone(), execution);
        Ok(true)
    }

    async fn get_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = self.rows.lock();
        let mut due: Vec<Execution> = rows
            .values()
            .filter(|e| !e.picked && e.execution_time <= now)
            .cloned()
            .collect();

        due.sort_by_key(|e| e.execution_time);
        due.truncate(limit);
        Ok(due)
    }

    async fn pick(
        &self,
        candidate: &Execution,
        picked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Execution>, StoreError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&candidate.id) else {
            return Ok(None);
        };

        if row.picked || row.version != candidate.version {
            return Ok(None);
        }

        row.picked = true;
        row.picked_by = Some(picked_by.to_owned());
        row.last_heartbeat = Some(now);
        row.version += 1;

        Ok(Some(row.clone()))
    }

    async fn update_heartbeat(&self, id: &ExecutionId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows.get_mut(id) {
            row.last_heartbeat = Some(now);
        }

        // Advisory: does not bump `version` (so it can never conflict with the
        // completion/failure handler's version-checked remove/reschedule) and
        // missing rows (e.g. concurrently removed) are not an error either.
        Ok(())
    }

    async fn get_old_executions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|e| e.picked && e.last_heartbeat.is_some_and(|hb| hb < older_than))
            .cloned()
            .collect())
    }

    async fn remove(&self, execution: &Execution) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        match rows.get(&execution.id) {
            Some(row) if row.version == execution.version => {
                rows.remove(&execution.id);
                Ok(())
            }
            Some(_) => Err(Self::conflict(&execution.id)),
            None => Err(Self::conflict(&execution.id)),
        }
    }

    async fn reschedule(
        &self,
        execution: &Execution,
        new_time: DateTime<Utc>,
        update: ExecutionUpdate,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let Some(row) = rows.get_mut(&execution.id) else {
            return Err(Self::conflict(&execution.id));
        };

        if row.version != execution.version {
            return Err(Self::conflict(&execution.id));
        }

        row.execution_time = new_time;
        row.picked = false;
        row.picked_by = None;
        row.last_heartbeat = None;
        if let Some(last_success) = update.last_success {
            row.last_success = Some(last_success);
        }
        if let Some(last_failure) = update.last_failure {
            row.last_failure = Some(last_failure);
        }
        if let Some(consecutive_failures) = update.consecutive_failures {
            row.consecutive_failures = consecutive_failures;
        }
        row.version += 1;

        Ok(())
    }

    async fn get_executions_failing_longer_than(
        &self,
        now: DateTime<Utc>,
        duration: chrono::Duration,
    ) -> Result<Vec<Execution>, StoreError> {
        let rows = self.rows.lock();
        Ok(rows
            .values()
            .filter(|e| {
                e.consecutive_failures > 0
                    && e.last_failure.is_some_and(|lf| now - lf >= duration)
            })
            .cloned()
            .collect())
    }

    async fn get(&self, id: &ExecutionId) -> Result<Option<Execution>, StoreError> {
        Ok(self.rows.lock().get(id).cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<Execution>, StoreError> {
        let rows = self.rows.lock();
        let mut matching: Vec<Execution> = rows
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        matching.sort_by_key(|e| e.execution_time);
        if let Some(limit) = filter.limit {
            matching.truncate(limit);
        }

        Ok(matching)
    }
}
