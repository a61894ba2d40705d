//! Cancellation handle returned by every `schedule` call.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type CancelFn = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Slots {
    inner: Option<ScheduleHandle>,
    on_cancel: Option<CancelFn>,
}

struct HandleState {
    cancelled: AtomicBool,
    slots: Mutex<Slots>,
}

/// Handle to a unit of scheduled work.
///
/// Cancelling prevents work that has not started yet from running; it has no
/// effect on work already executing. A handle can be re-pointed at the handle of
/// a later stage ([`assign`](Self::assign)), so one caller-facing handle covers a
/// delayed submission, its queue entry and whatever the action itself returns.
/// Assigning into a cancelled handle cancels the assigned handle immediately.
#[derive(Clone)]
pub struct ScheduleHandle {
    state: Arc<HandleState>,
}

impl ScheduleHandle {
    /// Create a fresh, uncancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(HandleState {
                cancelled: AtomicBool::new(false),
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// Handle for work that already finished; cancelling it does nothing useful.
    #[must_use]
    pub fn empty() -> Self {
        Self::new()
    }

    /// Handle that runs `on_cancel` the first time it is cancelled.
    #[must_use]
    pub fn from_fn<F>(on_cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = Self::new();
        handle.state.slots.lock().on_cancel = Some(Box::new(on_cancel));
        handle
    }

    /// Cancel the handle and whatever it currently points at. Idempotent.
    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let slots = std::mem::take(&mut *self.state.slots.lock());
        if let Some(on_cancel) = slots.on_cancel {
            on_cancel();
        }
        if let Some(inner) = slots.inner {
            inner.cancel();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Point this handle at `inner`, replacing any previous target.
    pub fn assign(&self, inner: Self) {
        if Arc::ptr_eq(&self.state, &inner.state) {
            return;
        }
        {
            let mut slots = self.state.slots.lock();
            if !self.state.cancelled.load(Ordering::SeqCst) {
                slots.inner = Some(inner);
                return;
            }
        }
        inner.cancel();
    }
}

impl Default for ScheduleHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
