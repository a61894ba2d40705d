//! Scheduler that runs work synchronously on the calling thread.

use std::thread;
use std::time::SystemTime;

use crate::core::scheduler::invoke;
use crate::core::{Action, DueTime, ScheduleHandle, Scheduler, SchedulerError};

/// Runs every action inline before `schedule` returns.
///
/// A delayed submission blocks the caller for the delay. Action failures are
/// returned to the caller instead of being routed to a handler.
///
/// ```rust
/// use prometheus_sequencer::core::SchedulerExt;
/// use prometheus_sequencer::runtime::ImmediateScheduler;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&ran);
/// ImmediateScheduler::new().spawn(move || flag.store(true, Ordering::SeqCst))?;
/// assert!(ran.load(Ordering::SeqCst));
/// # Ok::<(), prometheus_sequencer::core::SchedulerError>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    /// Create the scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        if let Some(due) = due {
            let delay = due.delay_from(SystemTime::now());
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        invoke(action, self)
    }
}
