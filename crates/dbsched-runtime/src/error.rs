//! Errors specific to the orchestrator's own lifecycle (not the store or the
//! task body — those use `dbsched_core::{StoreError, TaskError}`).

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler was already started")]
    AlreadyStarted,
}
