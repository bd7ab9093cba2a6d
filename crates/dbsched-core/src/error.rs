//! Error types shared across the `dbsched` crates.

/// An error returned by an [`crate::store::ExecutionStore`] implementation.
///
/// The scheduler's periodic loops treat [`StoreError::Transient`] as an
/// expected, retry-next-tick condition: it is logged and the loop continues
/// on its normal cadence. [`StoreError::Fatal`] indicates the store itself
/// is in an unexpected state and is propagated instead.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(#[source] anyhow::Error),

    #[error("fatal store error: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// An error raised by user task code, routed to that task's failure handler.
#[derive(Debug, thiserror::Error)]
#[error("task execution failed: {0}")]
pub struct TaskError(#[from] pub anyhow::Error);
