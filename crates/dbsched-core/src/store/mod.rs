//! The durable repository of executions — the coordination surface between
//! every scheduler node sharing a database.
//!
//! The only operation that matters for correctness is
//! [`ExecutionStore::pick`]: it must be a single atomic, version-checked
//! conditional update, never a read followed by a write. Everything else
//! (heartbeats, reschedule, remove) either doesn't need exclusivity or is
//! already guarded by having come from a successful pick.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::execution::{Execution, ExecutionId, ExecutionUpdate};

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new execution. Returns `false` (not an error) if
    /// `(task_name, instance_id)` already exists (invariant I1).
    async fn create_if_not_exists(&self, execution: Execution) -> Result<bool, StoreError>;

    /// At most `limit` unpicked executions whose `execution_time <= now`,
    /// ordered by `execution_time` ascending. Never locks anything
    /// (invariant I4: a picked execution is never returned here).
    async fn get_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Execution>, StoreError>;

    /// The atomic contention point. Attempts to transfer ownership of
    /// `candidate` to `picked_by`, succeeding only if the persisted row still
    /// matches `candidate`'s `(id, version, picked = false)`. Returns the
    /// freshly-picked execution on success, `None` on lost race.
    async fn pick(
        &self,
        candidate: &Execution,
        picked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Execution>, StoreError>;

    /// Unconditionally stamp `last_heartbeat` for the identified execution.
    /// Heartbeats are advisory: they must not bump `version` (a long-running
    /// execution's eventual `remove`/`reschedule` checks its version against
    /// the snapshot taken at `pick` time, and a heartbeat landing in between
    /// must not invalidate that check), and if the row is gone or was
    /// concurrently rescheduled, this is a silent no-op rather than an error.
    async fn update_heartbeat(&self, id: &ExecutionId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Picked executions whose `last_heartbeat < older_than`, regardless of
    /// which node holds them.
    async fn get_old_executions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Execution>, StoreError>;

    /// Release the pick lock and delete the row. Version-checked.
    async fn remove(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Release the pick lock, set a new `execution_time`, and persist the
    /// given outcome fields. Version-checked.
    async fn reschedule(
        &self,
        execution: &Execution,
        new_time: DateTime<Utc>,
        update: ExecutionUpdate,
    ) -> Result<(), StoreError>;

    /// Diagnostics: executions with at least one failure whose
    /// `last_failure` is older than `now - duration`. Read-only.
    async fn get_executions_failing_longer_than(
        &self,
        now: DateTime<Utc>,
        duration: chrono::Duration,
    ) -> Result<Vec<Execution>, StoreError>;

    /// Look up one execution by identity, unpicked or not. Used by the
    /// client API for read-only enumeration and pre-flight checks.
    async fn get(&self, id: &ExecutionId) -> Result<Option<Execution>, StoreError>;

    /// Read-only enumeration of executions matching `filter`, ordered by
    /// `execution_time` ascending. Backs the client API's
    /// `getScheduledExecutions`; never locks anything.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<Execution>, StoreError>;
}

/// Filter for [`ExecutionStore::list`].
///
/// All fields are conjunctive (AND'd together); `None` means "no constraint
/// on this field".
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    pub task_name: Option<String>,
    pub picked: Option<bool>,
    pub limit: Option<usize>,
}

impl ListFilter {
    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(task_name) = &self.task_name {
            if execution.task_name() != task_name {
                return false;
            }
        }

        if let Some(picked) = self.picked {
            if execution.picked != picked {
                return false;
            }
        }

        true
    }
}
