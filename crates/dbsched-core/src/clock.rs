//! Clock abstraction for testability.
//!
//! The scheduler never calls `chrono::Utc::now()` or `tokio::time::sleep`
//! directly; every time read and every sleep goes through a [`Clock`] so that
//! tests can run the due-poller, the dead-detector, and the heartbeat loop
//! against a controlled, advanceable clock instead of real wall time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Controls the scheduler's view of time.
///
/// In production, [`SystemClock`] delegates to `chrono::Utc::now()` and
/// `tokio::time::sleep`. Tests typically pair a fake implementation of this
/// trait with `tokio::time::pause()`/`advance()` so that heartbeat expiry and
/// dead-execution detection become deterministic.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// The current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// The default clock, backed by real system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}

/// A controllable clock for tests: time only changes when explicitly
/// advanced via [`advance`](FakeClock::advance) or [`set`](FakeClock::set).
///
/// `sleep` completes as soon as the clock is advanced past its deadline, so
/// tests can make heartbeat expiry and dead-execution detection deterministic
/// without depending on real wall-clock delay.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    notify: Notify,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            notify: Notify::new(),
        }
    }

    /// Move the clock forward and wake any pending sleepers whose deadline
    /// has passed.
    pub fn advance(&self, duration: Duration) {
        *self.now.lock() += duration;
        self.notify.notify_waiters();
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock() = time;
        self.notify.notify_waiters();
    }
}

#[async_trait::async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }

        let deadline = self.now() + duration;
        loop {
            if self.now() >= deadline {
                return;
            }
            self.notify.notified().await;
        }
    }
}
