//! Scheduled-task capability.
//!
//! The engine's only suspension-point analog: "invoke this every N seconds
//! until cancelled." Cancellation is structural - dropping the guard aborts
//! the task - so a torn-down view cannot leak its timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Handle to a spawned periodic task; aborts the task on drop.
#[derive(Debug)]
pub struct TaskGuard {
    handle: JoinHandle<()>,
}

impl TaskGuard {
    /// Spawns `future` onto the current runtime.
    #[must_use]
    pub fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Stops the task immediately. Dropping the guard does the same.
    pub fn abort(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A tick interval that does not burst to catch up after suspension; tick
/// deltas are measured against the wall clock by the consumers themselves.
#[must_use]
pub fn poll_interval(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
