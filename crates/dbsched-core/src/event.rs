//! Statistics events emitted by the scheduler and the pluggable sink they are
//! delivered to.
//!
//! This is deliberately a closed, flat enum rather than a trait-per-event
//! design: the set of events that must be observable is fixed, and a sink
//! only ever needs to pattern-match on them (for counters, dashboards, or
//! test assertions).

use crate::execution::ExecutionId;

/// One observable event in the scheduler's lifecycle.
#[derive(Clone, Debug)]
pub enum SchedulerEvent {
    /// The due-poller completed one tick.
    RanExecuteDue { found: usize },
    /// The dead-detector completed one tick.
    RanDetectDead,
    /// The heartbeat loop completed one tick.
    RanUpdateHeartbeats { count: usize },
    /// A dead execution was found and handed to its `on_dead` handler.
    DeadExecution { id: ExecutionId },
    /// A `CompletionHandler` (the success path of `Task::execute`) raised an
    /// error while persisting its outcome.
    CompletionHandlerError { id: ExecutionId },
    /// A `FailureHandler` raised an error while persisting its outcome.
    FailureHandlerError { id: ExecutionId },
    /// An unexpected, non-task-specific error occurred (store error,
    /// bookkeeping invariant violation, etc).
    UnexpectedError { context: String },

    /// A queued `PickAndExecute` job discarded itself because its batch had
    /// been superseded by a fresher due-poll.
    Stale { id: ExecutionId },
    /// A worker lost the race to pick an execution.
    AlreadyPicked { id: ExecutionId },
    /// A worker won the pick and is about to run the task body.
    Executed { id: ExecutionId },

    /// A task's execution completed successfully.
    Completed { id: ExecutionId },
    /// A task's execution completed with a failure.
    Failed { id: ExecutionId },

    /// A task name could not be resolved in the registry. The execution is
    /// left exactly as it was found.
    UnresolvedTask { id: ExecutionId },
}

/// Destination for [`SchedulerEvent`]s.
///
/// The default [`NoopSink`] discards everything. [`TracingSink`] logs each
/// event at a severity appropriate to what it represents. A metrics-backed
/// sink can be layered on top by implementing this trait directly.
pub trait StatsSink: Send + Sync {
    fn record(&self, event: SchedulerEvent);
}

/// A sink that discards every event. The default when none is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl StatsSink for NoopSink {
    fn record(&self, _event: SchedulerEvent) {}
}

/// A sink that logs every event via `tracing`, at a severity matched to how
/// actionable the event is.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl StatsSink for TracingSink {
    fn record(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::RanExecuteDue { found } => {
                tracing::debug!(found, "ran due-poll")
            }
            SchedulerEvent::RanDetectDead => tracing::trace!("ran dead-detection"),
            SchedulerEvent::RanUpdateHeartbeats { count } => {
                tracing::trace!(count, "updated heartbeats")
            }
            SchedulerEvent::DeadExecution { id } => {
                tracing::warn!(%id, "recovered dead execution")
            }
            SchedulerEvent::CompletionHandlerError { id } => {
                tracing::error!(%id, "completion handler failed")
            }
            SchedulerEvent::FailureHandlerError { id } => {
                tracing::error!(%id, "failure handler failed")
            }
            SchedulerEvent::UnexpectedError { context } => {
                tracing::error!(context, "unexpected scheduler error")
            }
            SchedulerEvent::Stale { id } => tracing::debug!(%id, "discarded stale batch job"),
            SchedulerEvent::AlreadyPicked { id } => {
                tracing::trace!(%id, "lost the pick race")
            }
            SchedulerEvent::Executed { id } => tracing::debug!(%id, "executing"),
            SchedulerEvent::Completed { id } => tracing::debug!(%id, "completed"),
            SchedulerEvent::Failed { id } => tracing::warn!(%id, "failed"),
            SchedulerEvent::UnresolvedTask { id } => {
                tracing::warn!(%id, "task name not found in registry")
            }
        }
    }
}
