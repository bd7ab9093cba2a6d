use std::time::Duration;

use crate::pool::DEFAULT_SHUTDOWN_WAIT;

/// Tunables controlling the scheduler's periodic loops and worker pool.
///
/// `detect_dead_cadence` and `max_age_before_dead` are derived from
/// `heartbeat_interval` rather than independently configurable (2x and 4x
/// respectively).
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers in the bounded pool that runs `PickAndExecute`
    /// jobs. Also used to size `BatchTracker`'s early-refill threshold.
    pub threadpool_size: usize,

    /// The maximum number of due executions fetched per due-poll tick. A
    /// poll that returns exactly this many is treated as a hint that more
    /// due work may exist (`poll_was_full`).
    pub polling_limit: usize,

    /// The cadence at which the heartbeat loop stamps `last_heartbeat` for
    /// every execution this node currently holds.
    pub heartbeat_interval: Duration,

    /// How long the worker pool is given to drain in-flight jobs during a
    /// graceful `stop()` before the shutdown proceeds anyway.
    pub shutdown_wait: Duration,

    /// Whether `Client::schedule` should wake the due-poller immediately
    /// when the scheduled time is already due (`execution_time <= now`).
    /// The wake never fires for a future `execution_time`.
    pub enable_immediate_execution: bool,
}

impl Config {
    pub fn detect_dead_cadence(&self) -> Duration {
        self.heartbeat_interval * 2
    }

    pub fn max_age_before_dead(&self) -> Duration {
        self.heartbeat_interval * 4
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threadpool_size: 10,
            polling_limit: 100,
            heartbeat_interval: Duration::from_secs(5),
            shutdown_wait: DEFAULT_SHUTDOWN_WAIT,
            enable_immediate_execution: true,
        }
    }
}
