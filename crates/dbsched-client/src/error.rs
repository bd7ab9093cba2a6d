//! Errors surfaced by [`crate::SchedulerClient`].

use dbsched_core::{ExecutionId, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no scheduled execution found for {0}")]
    NotFound(ExecutionId),

    /// `reschedule`/`cancel` only operate on unpicked rows; a currently
    /// picked execution is owned by some scheduler node and must run to
    /// completion (or be recovered by dead-detection) before it can be
    /// rescheduled or cancelled out from under it.
    #[error("execution {0} is currently picked and cannot be rescheduled or cancelled")]
    CurrentlyPicked(ExecutionId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
