//! The scheduler's one-way lifecycle.
//!
//! `SchedulerState` is a three-value monotonic state machine rather than a
//! boolean flag: a tagged variant with one-shot transitions reads better at
//! call sites than a pair of booleans that could otherwise disagree. An
//! atomic integer guards the state and transitions are one-shot
//! compare-and-swaps, not plain stores.

use std::sync::atomic::{AtomicU8, Ordering};

const CREATED: u8 = 0;
const STARTED: u8 = 1;
const SHUTTING_DOWN: u8 = 2;

/// `{CREATED → STARTED → SHUTTING_DOWN}`. Transitions only ever move
/// forward; attempting to move backward or skip a state is a no-op.
#[derive(Debug, Default)]
pub struct SchedulerState {
    state: AtomicU8,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Lifecycle {
    Created,
    Started,
    ShuttingDown,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CREATED),
        }
    }

    pub fn get(&self) -> Lifecycle {
        match self.state.load(Ordering::Acquire) {
            CREATED => Lifecycle::Created,
            STARTED => Lifecycle::Started,
            _ => Lifecycle::ShuttingDown,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.load(Ordering::Acquire) == SHUTTING_DOWN
    }

    /// `CREATED → STARTED`. Returns `false` if the scheduler was already
    /// started or is shutting down.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(CREATED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `{CREATED, STARTED} → SHUTTING_DOWN`. Returns `false` if shutdown had
    /// already been requested (the caller should treat this as idempotent).
    pub fn request_shutdown(&self) -> bool {
        self.state.swap(SHUTTING_DOWN, Ordering::AcqRel) != SHUTTING_DOWN
    }
}
