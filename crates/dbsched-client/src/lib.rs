//! The client-facing scheduling API: `schedule`, `reschedule`, `cancel`, and
//! read-only enumeration of scheduled executions.
//!
//! This crate is deliberately thin — it has no opinion on the worker
//! topology or the task bodies themselves, only on how application code
//! gets executions into (and out of) the store that `dbsched-runtime`'s
//! `Scheduler` polls. It wraps the store in a cheaply-clonable handle so
//! the same client can be passed around freely and works against any
//! `dbsched_core::ExecutionStore` implementation, including the in-memory
//! store used in tests.

mod error;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dbsched_core::store::{ExecutionStore, ListFilter};
use dbsched_core::{Clock, Execution, ExecutionId, ExecutionUpdate, SystemClock};
use dbsched_runtime::WakeDue;

pub use error::ClientError;

/// A task instance ready to be scheduled: its identity and opaque payload.
///
/// Serialization of the payload is an external collaborator concern; this
/// crate only ever moves `Vec<u8>` around.
#[derive(Clone, Debug)]
pub struct TaskInstance {
    pub id: ExecutionId,
    pub data: Vec<u8>,
}

impl TaskInstance {
    pub fn new(task_name: impl Into<String>, instance_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: ExecutionId::new(task_name, instance_id),
            data,
        }
    }
}

/// A read-only view of a persisted execution, returned by
/// [`SchedulerClient::get_scheduled_executions`].
#[derive(Clone, Debug)]
pub struct ScheduledExecution {
    pub id: ExecutionId,
    pub execution_time: DateTime<Utc>,
    pub picked: bool,
    pub picked_by: Option<String>,
    pub consecutive_failures: u32,
}

impl From<Execution> for ScheduledExecution {
    fn from(e: Execution) -> Self {
        Self {
            id: e.id,
            execution_time: e.execution_time,
            picked: e.picked,
            picked_by: e.picked_by,
            consecutive_failures: e.consecutive_failures,
        }
    }
}

/// Filter for [`SchedulerClient::get_scheduled_executions`]. Re-exported
/// from `dbsched-core` so callers don't need that crate as a direct
/// dependency just to build one.
pub type ExecutionFilter = ListFilter;

/// A cheaply-clonable handle application code uses to schedule, reschedule,
/// and cancel executions, and to enumerate what's currently scheduled.
///
/// Construct one with [`SchedulerClient::new`], then optionally wire it to a
/// running `Scheduler`'s [`WakeDue`] capability with
/// [`SchedulerClient::with_wake_due`] so that `schedule` can trigger an
/// immediate due-poll instead of waiting for the next periodic tick.
#[derive(Clone)]
pub struct SchedulerClient {
    store: Arc<dyn ExecutionStore>,
    clock: Arc<dyn Clock>,
    wake_due: Option<WakeDue>,
    enable_immediate_execution: bool,
}

impl SchedulerClient {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            wake_due: None,
            enable_immediate_execution: false,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wire this client to a scheduler's due-poller.
    ///
    /// When `enable_immediate_execution` is set, `schedule` wakes the
    /// due-poller immediately for any call whose `execution_time <= now`.
    /// This never fires for a future `execution_time` — only already-due
    /// work gets an early wake.
    pub fn with_wake_due(mut self, wake_due: WakeDue, enable_immediate_execution: bool) -> Self {
        self.wake_due = Some(wake_due);
        self.enable_immediate_execution = enable_immediate_execution;
        self
    }

    /// Create the execution if `(task_name, instance_id)` doesn't already
    /// exist. Returns `false` (not an error) on a duplicate identity — a
    /// silent no-op rather than an upsert or a failure.
    pub async fn schedule(
        &self,
        instance: TaskInstance,
        execution_time: DateTime<Utc>,
    ) -> Result<bool, ClientError> {
        let created = self
            .store
            .create_if_not_exists(Execution::new(instance.id.clone(), instance.data, execution_time))
            .await?;

        if created {
            tracing::debug!(id = %instance.id, %execution_time, "scheduled execution");

            if self.enable_immediate_execution && execution_time <= self.clock.now() {
                if let Some(wake_due) = &self.wake_due {
                    wake_due.wake();
                }
            }
        }

        Ok(created)
    }

    /// Move an unpicked execution to a new `execution_time`.
    ///
    /// # Errors
    /// Returns [`ClientError::NotFound`] if the identity doesn't exist, or
    /// [`ClientError::CurrentlyPicked`] if a scheduler node currently holds
    /// it — rescheduling out from under an in-flight execution would race
    /// with whatever that node's completion handler is about to do.
    pub async fn reschedule(&self, id: &ExecutionId, at: DateTime<Utc>) -> Result<(), ClientError> {
        let current = self.require_unpicked(id).await?;
        self.store
            .reschedule(&current, at, ExecutionUpdate::default())
            .await?;
        Ok(())
    }

    /// Release and delete an unpicked execution.
    ///
    /// Same picked-row restriction as [`SchedulerClient::reschedule`].
    pub async fn cancel(&self, id: &ExecutionId) -> Result<(), ClientError> {
        let current = self.require_unpicked(id).await?;
        self.store.remove(&current).await?;
        Ok(())
    }

    /// Read-only enumeration of scheduled executions matching `filter`.
    pub async fn get_scheduled_executions(
        &self,
        filter: ExecutionFilter,
    ) -> Result<Vec<ScheduledExecution>, ClientError> {
        let executions = self.store.list(&filter).await?;
        Ok(executions.into_iter().map(ScheduledExecution::from).collect())
    }

    async fn require_unpicked(&self, id: &ExecutionId) -> Result<Execution, ClientError> {
        let current = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ClientError::NotFound(id.clone()))?;

        if current.picked {
            return Err(ClientError::CurrentlyPicked(id.clone()));
        }

        Ok(current)
    }
}
