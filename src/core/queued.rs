//! Queued scheduler: a pausable front for an underlying scheduler.
//!
//! While disabled, submissions accumulate in a FIFO queue. Enabling starts a
//! single drain loop (same gate protocol as [`SequentialScheduler`]) that forwards
//! the backlog to the underlying scheduler in order. Once the backlog is gone the
//! scheduler switches to direct mode and forwards new submissions straight through.
//!
//! Disabling is a pause: direct mode is switched off, the running loop (if any)
//! stops after the item it is forwarding and releases the gate itself, and the
//! remaining backlog is drained on the next enable.
//!
//! [`SequentialScheduler`]: crate::core::SequentialScheduler

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::core::sequential::WorkItem;
use crate::core::{Action, AppResult, DueTime, ErrorHandler, Gate, ScheduleHandle, Scheduler, SchedulerError};

struct Inner {
    direct: AtomicBool,
    enabled: AtomicBool,
    gate: Gate,
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
    pending: AtomicIsize,
    scheduler: Arc<dyn Scheduler>,
    on_error: ErrorHandler,
}

/// Scheduler whose work is held back until it is enabled.
#[derive(Clone)]
pub struct QueuedScheduler {
    inner: Arc<Inner>,
}

impl QueuedScheduler {
    /// Create a disabled scheduler forwarding to `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>, on_error: ErrorHandler) -> Self {
        let (tx, rx) = unbounded();
        Self {
            inner: Arc::new(Inner {
                direct: AtomicBool::new(false),
                enabled: AtomicBool::new(false),
                gate: Gate::new(),
                tx,
                rx,
                pending: AtomicIsize::new(0),
                scheduler,
                on_error,
            }),
        }
    }

    /// Number of queued work items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.rx.len()
    }

    /// Whether the backlog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.rx.is_empty()
    }

    /// Whether queued work is being released.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Whether submissions currently bypass the queue.
    #[must_use]
    pub fn is_direct(&self) -> bool {
        self.inner.direct.load(Ordering::SeqCst)
    }

    /// Enable or disable the scheduler.
    pub fn set_enabled(&self, value: bool) {
        if self.inner.enabled.load(Ordering::SeqCst) == value {
            return;
        }

        self.inner.enabled.store(value, Ordering::SeqCst);
        self.inner.direct.store(false, Ordering::SeqCst);
        debug!(enabled = value, backlog = self.len(), "queued scheduler toggled");

        if value {
            self.try_start_loop();
        }
    }

    /// Enable the scheduler.
    pub fn start(&self) {
        self.set_enabled(true);
    }

    /// Disable the scheduler.
    pub fn stop(&self) {
        self.set_enabled(false);
    }

    fn submit(&self, handle: ScheduleHandle, action: Action) -> Result<(), SchedulerError> {
        if self.inner.direct.load(Ordering::SeqCst) {
            let forwarded = self.inner.scheduler.schedule(None, action)?;
            handle.assign(forwarded);
            return Ok(());
        }

        if self.inner.tx.send(WorkItem { handle, action }).is_err() {
            return Err(SchedulerError::Shutdown);
        }
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        self.try_start_loop();
        Ok(())
    }

    fn try_start_loop(&self) {
        if !self.enabled() || !self.inner.gate.try_open() {
            return;
        }

        let this = self.clone();
        let drain: Action = Box::new(move |_: &dyn Scheduler| {
            this.drain();
            Ok(ScheduleHandle::empty())
        });

        if let Err(err) = self.inner.scheduler.schedule(None, drain) {
            self.inner.gate.try_close();
            warn!(error = %err, backlog = self.len(), "underlying scheduler refused drain loop");
            self.inner.on_error.handle(err);
        }
    }

    fn drain(&self) {
        trace!("queued drain loop started");
        loop {
            while self.enabled() {
                let Ok(item) = self.inner.rx.try_recv() else {
                    break;
                };
                self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                self.forward(item);
            }

            // Direct mode only makes sense while enabled.
            self.inner.direct.store(self.enabled(), Ordering::SeqCst);

            let released = self.inner.gate.try_close();
            debug_assert!(released, "drain loop must own the gate");

            if !self.enabled()
                || self.inner.pending.load(Ordering::SeqCst) <= 0
                || !self.inner.gate.try_open()
            {
                break;
            }
            // Backlog appeared while switching to direct mode: keep it ordered.
            self.inner.direct.store(false, Ordering::SeqCst);
            debug!("work raced in after drain, resuming loop");
        }
        // A disable may have landed between reading `enabled` and storing `direct`.
        if !self.enabled() {
            self.inner.direct.store(false, Ordering::SeqCst);
        }
        trace!("queued drain loop finished");
    }

    fn forward(&self, item: WorkItem) {
        if item.handle.is_cancelled() {
            trace!("skipping cancelled work item");
            return;
        }
        match self.inner.scheduler.schedule(None, item.action) {
            Ok(forwarded) => item.handle.assign(forwarded),
            Err(err) => self.inner.on_error.handle(err),
        }
    }
}

impl Scheduler for QueuedScheduler {
    fn now(&self) -> Result<SystemTime, SchedulerError> {
        self.inner.scheduler.now()
    }

    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        let handle = ScheduleHandle::new();

        match due {
            None => self.submit(handle.clone(), action)?,
            Some(due) => {
                let this = self.clone();
                let item_handle = handle.clone();
                let timer = self.inner.scheduler.schedule(
                    Some(due),
                    Box::new(move |_: &dyn Scheduler| -> AppResult<ScheduleHandle> {
                        if item_handle.is_cancelled() {
                            return Ok(ScheduleHandle::empty());
                        }
                        this.submit(item_handle, action)?;
                        Ok(ScheduleHandle::empty())
                    }),
                )?;
                handle.assign(timer);
            }
        }

        Ok(handle)
    }
}

impl fmt::Debug for QueuedScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedScheduler")
            .field("len", &self.len())
            .field("enabled", &self.enabled())
            .field("direct", &self.is_direct())
            .finish_non_exhaustive()
    }
}
