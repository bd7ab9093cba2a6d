//! Task lookup: name → executable unit.
//!
//! `TaskRegistry` only fixes the name-to-implementation lookup contract;
//! anything about how a concrete `Task` is constructed, configured, or
//! wired to application state is left to the embedder. The builder below
//! accumulates registrations and produces an immutable registry with a
//! single `build()` call, the same shape `SchedulerBuilder` uses elsewhere
//! in this workspace.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{StoreError, TaskError};
use crate::execution::{Execution, ExecutionUpdate};
use crate::store::ExecutionStore;

/// A capability object scoped to one specific execution.
///
/// Handlers receive this instead of the whole store, so a handler
/// implementation can't accidentally mutate an unrelated row.
pub struct ExecutionHandle {
    store: Arc<dyn ExecutionStore>,
    execution: Execution,
}

impl ExecutionHandle {
    pub fn new(store: Arc<dyn ExecutionStore>, execution: Execution) -> Self {
        Self { store, execution }
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Release the pick lock and remove the execution (one-shot tasks).
    pub async fn remove(&self) -> Result<(), StoreError> {
        self.store.remove(&self.execution).await
    }

    /// Release the pick lock, schedule the next run, and persist the given
    /// outcome fields (recurring tasks, or a dead-execution recovery).
    pub async fn reschedule(
        &self,
        next_run: DateTime<Utc>,
        update: ExecutionUpdate,
    ) -> Result<(), StoreError> {
        self.store
            .reschedule(&self.execution, next_run, update)
            .await
    }
}

/// The extension surface: code that knows how to run executions of one
/// task name and how to react to their completion, failure, and death.
#[async_trait::async_trait]
pub trait Task: Send + Sync {
    /// Run the task body for one execution. Must not mutate the store;
    /// persistence of the outcome happens in `on_success`/`on_failure`.
    async fn execute(&self, handle: &ExecutionHandle) -> Result<(), TaskError>;

    /// The completion handler: called after `execute` returns `Ok(())`.
    /// Decides what happens to the row — typically `handle.remove()` for a
    /// one-shot task or `handle.reschedule(..)` for a recurring one.
    async fn on_success(&self, handle: &ExecutionHandle);

    /// The failure handler: called when `execute` returns `Err`. Decides
    /// reschedule policy (e.g. backoff based on `consecutive_failures`).
    async fn on_failure(&self, handle: &ExecutionHandle, error: &TaskError);

    /// Called by the dead-detector for an execution whose heartbeat is too
    /// old. Typically reschedules immediately or bumps failure counters.
    async fn on_dead(&self, handle: &ExecutionHandle);
}

/// Name → `Task` lookup, built once at construction time and never mutated
/// afterwards.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<HashMap<String, Arc<dyn Task>>>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::default()
    }

    /// Resolve a task name to its implementation.
    ///
    /// Returns `None` for unresolved names. This is an expected operational
    /// condition during rolling deploys that add new task names; callers
    /// log and skip, leaving the execution persisted.
    pub fn resolve(&self, task_name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_name).cloned()
    }
}

#[derive(Default)]
pub struct TaskRegistryBuilder {
    tasks: HashMap<String, Arc<dyn Task>>,
}

impl TaskRegistryBuilder {
    pub fn register(mut self, task_name: impl Into<String>, task: Arc<dyn Task>) -> Self {
        self.tasks.insert(task_name.into(), task);
        self
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            tasks: Arc::new(self.tasks),
        }
    }
}
