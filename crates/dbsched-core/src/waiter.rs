//! A parkable wait primitive with early-wake, used to pace the scheduler's
//! periodic loops.
//!
//! Modeled on the `ShutdownFlag`/`ShutdownFuture` pair used elsewhere in this
//! codebase: the same early-check-before-subscribe trick is needed here to
//! avoid a lost wakeup between checking whether a wake is already pending
//! and constructing the `Notified` future that would observe it.

use std::time::Duration;

use tokio::sync::Notify;

/// A cadence timer that can be interrupted by an out-of-band `wake()`.
///
/// Multiple concurrent `wake()` calls made while nothing is waiting, or made
/// within one `wait_for` window, coalesce into a single release — this is
/// exactly `tokio::sync::Notify`'s single-permit semantics, which is why the
/// implementation doesn't need to do anything cleverer than wrap it.
#[derive(Default)]
pub struct Waiter {
    notify: Notify,
}

impl Waiter {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Sleep for up to `duration`, returning early if [`Waiter::wake`] is
    /// called (or was already pending) before the duration elapses.
    pub async fn wait_for(&self, duration: Duration) {
        tokio::select! {
            biased;

            _ = self.notify.notified() => (),
            _ = tokio::time::sleep(duration) => (),
        }
    }

    /// Wake any current or next `wait_for` call early. Idempotent: calling
    /// this any number of times before the next `wait_for` window still
    /// results in exactly one early release.
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}
