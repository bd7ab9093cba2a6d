//! Core traits and the persistent data model shared by every `dbsched` crate.
//!
//! This crate has no opinion on how executions are actually stored or how
//! tasks are actually run; it only fixes the contracts (`ExecutionStore`,
//! `TaskRegistry`, `Clock`, `Waiter`, `StatsSink`) that the orchestrator in
//! `dbsched-runtime` is built against. Keeping these free of any concrete
//! backend means the orchestrator can be exercised against the in-memory
//! `store::memory::MemoryStore` in tests without a database.

pub mod clock;
pub mod error;
pub mod event;
pub mod execution;
pub mod registry;
pub mod store;
pub mod waiter;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{StoreError, TaskError};
pub use event::{SchedulerEvent, StatsSink};
pub use execution::{Execution, ExecutionId, ExecutionUpdate};
pub use registry::{ExecutionHandle, Task, TaskRegistry, TaskRegistryBuilder};
pub use store::{ExecutionStore, ListFilter};
pub use waiter::Waiter;
