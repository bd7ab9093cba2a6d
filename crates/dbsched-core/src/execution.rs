//! The persistent [`Execution`] record and its stable identity.

use chrono::{DateTime, Utc};

/// The stable identity of an execution: `(task_name, instance_id)`.
///
/// This pair is unique across the store (invariant I1 of the execution
/// model) and never changes for the lifetime of an execution.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ExecutionId {
    pub task_name: String,
    pub instance_id: String,
}

impl ExecutionId {
    pub fn new(task_name: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            instance_id: instance_id.into(),
        }
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.task_name, self.instance_id)
    }
}

/// One persisted occurrence of a task instance scheduled for a specific time.
///
/// This is the atomic unit of work the scheduler operates on. Every
/// `ExecutionStore` implementation must uphold the same invariants around
/// identity, versioning, and the pick lock.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Execution {
    pub id: ExecutionId,
    pub data: Vec<u8>,
    pub execution_time: DateTime<Utc>,
    pub picked: bool,
    pub picked_by: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Optimistic-concurrency token. Starts at 1 and is incremented on every
    /// successful `pick`/`remove`/`reschedule` (invariant I3). Heartbeats are
    /// advisory and never bump this, so a long-running execution's eventual
    /// completion still checks against the version its `pick` observed.
    pub version: u64,
}

impl Execution {
    /// Construct a brand-new, unpicked execution ready for `createIfNotExists`.
    pub fn new(id: ExecutionId, data: Vec<u8>, execution_time: DateTime<Utc>) -> Self {
        Self {
            id,
            data,
            execution_time,
            picked: false,
            picked_by: None,
            last_heartbeat: None,
            last_success: None,
            last_failure: None,
            consecutive_failures: 0,
            version: 1,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.id.task_name
    }

    pub fn instance_id(&self) -> &str {
        &self.id.instance_id
    }
}

/// The fields a completion/failure handler is permitted to change when
/// releasing the pick lock.
///
/// Used by [`crate::store::ExecutionStore::reschedule`] and
/// [`crate::store::ExecutionStore::remove`] to express "persist this outcome
/// and release the lock" as a single version-checked operation rather than a
/// read-modify-write pair.
#[derive(Clone, Debug, Default)]
pub struct ExecutionUpdate {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: Option<u32>,
}
