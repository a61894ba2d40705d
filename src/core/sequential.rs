//! Sequential scheduler: many producers, one drain loop at a time.
//!
//! Submissions are pushed onto an unbounded lock-free queue. The submitter that
//! manages to open the [`Gate`] schedules a drain loop on the underlying
//! scheduler; every other submitter just leaves its item in the queue. The loop
//! runs items strictly in FIFO order, one at a time, without owning a thread.
//!
//! # Handoff
//!
//! The loop closes the gate once the queue looks empty and then re-checks the
//! pending count. A submission that raced in between "queue empty" and "gate
//! closed" is picked up either by that re-check or by the submitter's own
//! `try_open`, whichever wins the gate. Both sides use sequentially consistent
//! operations, so at least one of them sees the other.

use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::core::scheduler::invoke;
use crate::core::{Action, DueTime, ErrorHandler, Gate, ScheduleHandle, Scheduler, SchedulerError};

/// A queued unit of work and the caller's handle to it.
pub(crate) struct WorkItem {
    pub(crate) handle: ScheduleHandle,
    pub(crate) action: Action,
}

struct Inner {
    gate: Gate,
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
    /// Items pushed but not yet popped. May dip below zero transiently because the
    /// increment follows the push.
    pending: AtomicIsize,
    scheduler: Arc<dyn Scheduler>,
    on_error: ErrorHandler,
}

/// Runs submitted work one item at a time, in submission order, on an underlying scheduler.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct SequentialScheduler {
    inner: Arc<Inner>,
}

impl SequentialScheduler {
    /// Create a scheduler draining onto `scheduler`, routing item failures to `on_error`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, on_error: ErrorHandler) -> Self {
        let (tx, rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                gate: Gate::new(),
                tx,
                rx,
                pending: AtomicIsize::new(0),
                scheduler,
                on_error,
            }),
        }
    }

    /// Create a scheduler whose item failures are logged.
    #[must_use]
    pub fn with_default_handler(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::new(scheduler, ErrorHandler::logging("sequential_scheduler"))
    }

    /// Number of outstanding work items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    /// Whether no work is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    /// Whether a drain loop currently owns the queue. Advisory only.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.gate.is_opened()
    }

    fn enqueue(&self, handle: ScheduleHandle, action: Action) {
        // The receiver lives as long as `inner`, so the channel never disconnects.
        if self.inner.tx.send(WorkItem { handle, action }).is_err() {
            return;
        }
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.try_start_loop();
    }

    fn try_start_loop(&self) {
        if !self.inner.gate.try_open() {
            return;
        }

        let this = self.clone();
        let drain: Action = Box::new(move |_: &dyn Scheduler| {
            this.drain();
            Ok(ScheduleHandle::empty())
        });

        if let Err(err) = self.inner.scheduler.schedule(None, drain) {
            // Release ownership so the next submission can retry; queued items stay put.
            self.inner.gate.try_close();
            warn!(error = %err, pending = self.len(), "underlying scheduler refused drain loop");
            self.inner.on_error.handle(err);
        }
    }

    fn drain(&self) {
        trace!("sequential drain loop started");
        loop {
            while let Ok(item) = self.inner.rx.try_recv() {
                self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                self.run(item);
            }

            let released = self.inner.gate.try_close();
            debug_assert!(released, "drain loop must own the gate");

            if self.inner.pending.load(Ordering::SeqCst) <= 0 || !self.inner.gate.try_open() {
                break;
            }
            debug!("work raced in after drain, resuming loop");
        }
        trace!("sequential drain loop finished");
    }

    fn run(&self, item: WorkItem) {
        if item.handle.is_cancelled() {
            trace!("skipping cancelled work item");
            return;
        }
        match invoke(item.action, self) {
            Ok(result) => item.handle.assign(result),
            Err(err) => self.inner.on_error.handle(err),
        }
    }
}

impl Scheduler for SequentialScheduler {
    fn now(&self) -> Result<SystemTime, SchedulerError> {
        self.inner.scheduler.now()
    }

    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        let handle = ScheduleHandle::new();

        match due {
            None => self.enqueue(handle.clone(), action),
            Some(due) => {
                // Only the submission waits for `due`; once queued the item drains in order.
                let this = self.clone();
                let item_handle = handle.clone();
                let timer = self.inner.scheduler.schedule(
                    Some(due),
                    Box::new(move |_: &dyn Scheduler| {
                        this.enqueue(item_handle, action);
                        Ok(ScheduleHandle::empty())
                    }),
                )?;
                handle.assign(timer);
            }
        }

        Ok(handle)
    }
}

impl fmt::Debug for SequentialScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialScheduler")
            .field("len", &self.len())
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}
