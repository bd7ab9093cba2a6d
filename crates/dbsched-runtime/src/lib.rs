//! The task scheduler orchestrator: periodic due-poll, dead-detect, and
//! heartbeat loops running against a pluggable [`dbsched_core::ExecutionStore`].
//!
//! This crate has no opinion on storage backend or transport; it is built
//! entirely against `dbsched-core`'s traits, so it can be driven by the
//! in-memory store in tests and by a Postgres-backed store in production.

pub mod batch;
pub mod config;
pub mod error;
pub mod pool;
pub mod scheduler;
pub mod state;

pub use batch::{BatchGuard, BatchTracker};
pub use config::Config;
pub use error::SchedulerError;
pub use pool::WorkerPool;
pub use scheduler::{Scheduler, SchedulerBuilder, WakeDue};
pub use state::{Lifecycle, SchedulerState};
