//! Exclusive resource pool.
//!
//! A fixed number of resources, each wrapped in an [`ExclusiveSlot`], shared by
//! any number of concurrent callers. Every scheduled action leases one slot for
//! its whole duration, so no resource is ever used by two actions at once.
//!
//! # Lifecycle of a lease
//!
//! 1. `schedule` submits a job to the internal cancellable scheduler.
//! 2. The job blocks its worker (never the caller) until a slot is available or
//!    the pool is disposed.
//! 3. The action runs through the slot's private scheduler.
//! 4. The [`SlotLease`] guard returns the slot to the pool when the action exits
//!    by any path, or releases the resource if the pool was disposed meanwhile.
//!
//! Slot accounting is done under the pool mutex, so
//! `available + leased + released == maximum_instance_count` holds in every
//! [`PoolStats`] snapshot.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    Action, AppResult, CancellableScheduler, CancellationCheckpoints, CancellationRegistration, CancellationSource,
    ErrorHandler, Exclusive, ExclusiveAction, ExclusiveSlot, Release, ScheduleHandle, Scheduler,
    SchedulerError, ThreadPoolScheduler,
};

/// Snapshot of slot accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Fixed number of slots created at construction.
    pub maximum_instance_count: usize,
    /// Slots waiting in the pool.
    pub available: usize,
    /// Slots leased to an action.
    pub leased: usize,
    /// Slots whose resource was released during shutdown.
    pub released: usize,
}

struct SlotState<T> {
    available: Vec<Arc<ExclusiveSlot<T>>>,
    leased: usize,
    released: usize,
}

struct PoolShared<T> {
    id: Uuid,
    maximum_instance_count: usize,
    state: Mutex<SlotState<T>>,
    slot_returned: Condvar,
    source: CancellationSource,
    on_error: ErrorHandler,
}

impl<T: Release> PoolShared<T> {
    /// Block until a slot is free. Fails once the pool is disposed.
    fn take(&self) -> Result<Arc<ExclusiveSlot<T>>, SchedulerError> {
        let mut state = self.state.lock();
        loop {
            if self.source.is_cancellation_requested() {
                return Err(SchedulerError::CancellationRequested);
            }
            if let Some(slot) = state.available.pop() {
                state.leased += 1;
                return Ok(slot);
            }
            self.slot_returned.wait(&mut state);
        }
    }

    fn give_back(&self, slot: Arc<ExclusiveSlot<T>>) {
        let mut state = self.state.lock();
        state.leased -= 1;
        if self.source.is_cancellation_requested() {
            state.released += 1;
            drop(state);
            debug!(pool_id = %self.id, "pool disposed during lease, releasing slot");
            self.release_slot(&slot);
        } else {
            state.available.push(slot);
            drop(state);
            self.slot_returned.notify_one();
        }
    }

    fn release_slot(&self, slot: &ExclusiveSlot<T>) {
        if let Err(err) = slot.release() {
            warn!(pool_id = %self.id, error = %err, "failed to release pooled resource");
            self.on_error.handle(err);
        }
    }

    fn wake_waiters(&self) {
        let _state = self.state.lock();
        self.slot_returned.notify_all();
    }
}

/// Returns its slot to the pool when dropped, whether or not the action ran.
struct SlotLease<T: Release> {
    shared: Arc<PoolShared<T>>,
    slot: Option<Arc<ExclusiveSlot<T>>>,
}

impl<T: Release> Drop for SlotLease<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.shared.give_back(slot);
        }
    }
}

/// Outcome of one pooled action.
#[derive(Debug)]
pub struct PoolTicket {
    handle: ScheduleHandle,
    outcome: Receiver<Result<(), SchedulerError>>,
}

impl PoolTicket {
    /// Handle to the scheduled action.
    #[must_use]
    pub const fn handle(&self) -> &ScheduleHandle {
        &self.handle
    }

    /// Skip the action if it has not started yet.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Wait for the action to finish.
    ///
    /// # Errors
    ///
    /// - `CancellationRequested` if the action was abandoned (ticket cancelled or
    ///   pool disposed before it ran)
    /// - `ActionPanicked` if the action panicked
    /// - `Timeout` if nothing happened within `timeout`
    pub fn wait(&self, timeout: Duration) -> Result<(), SchedulerError> {
        match self.outcome.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(SchedulerError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SchedulerError::CancellationRequested),
        }
    }
}

/// Fixed-size pool granting each scheduled action exclusive use of one resource.
pub struct ExclusiveResourcePool<T: Release> {
    shared: Arc<PoolShared<T>>,
    scheduler: CancellableScheduler,
    owned_workers: Option<ThreadPoolScheduler>,
    disposed: AtomicBool,
    _wake_on_cancel: CancellationRegistration,
}

impl<T: Release> ExclusiveResourcePool<T> {
    /// Create a pool of `maximum_instance_count` resources backed by a dedicated thread pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `maximum_instance_count` is zero.
    pub fn new<F>(factory: F, maximum_instance_count: usize) -> Result<Self, SchedulerError>
    where
        F: FnMut() -> T,
    {
        let workers = ThreadPoolScheduler::with_worker_count(num_cpus::get().max(2))?;
        let pool = Self::with_scheduler(
            factory,
            maximum_instance_count,
            Arc::new(workers.clone()),
            ErrorHandler::logging("exclusive_resource_pool"),
        )?;
        Ok(pool.with_owned_workers(workers))
    }

    /// Create a pool running its jobs on `scheduler`.
    ///
    /// The scheduler should be thread-pool-like: each job blocks its worker while
    /// waiting for a free slot.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `maximum_instance_count` is zero.
    pub fn with_scheduler<F>(
        factory: F,
        maximum_instance_count: usize,
        scheduler: Arc<dyn Scheduler>,
        on_error: ErrorHandler,
    ) -> Result<Self, SchedulerError>
    where
        F: FnMut() -> T,
    {
        Self::assemble(
            factory,
            maximum_instance_count,
            scheduler,
            CancellationCheckpoints::ON_EXECUTE,
            on_error,
        )
    }

    pub(crate) fn assemble<F>(
        mut factory: F,
        maximum_instance_count: usize,
        scheduler: Arc<dyn Scheduler>,
        checkpoints: CancellationCheckpoints,
        on_error: ErrorHandler,
    ) -> Result<Self, SchedulerError>
    where
        F: FnMut() -> T,
    {
        if !checkpoints.contains(CancellationCheckpoints::ON_EXECUTE) {
            return Err(SchedulerError::InvalidConfig(
                "pool scheduler checkpoints must include ON_EXECUTE".into(),
            ));
        }
        if maximum_instance_count == 0 {
            return Err(SchedulerError::InvalidConfig(
                "maximum_instance_count must be greater than 0".into(),
            ));
        }

        let available = (0..maximum_instance_count)
            .map(|_| Arc::new(ExclusiveSlot::new(factory(), on_error.clone())))
            .collect();

        let source = CancellationSource::new();
        let token = source.token();
        let shared = Arc::new(PoolShared {
            id: Uuid::new_v4(),
            maximum_instance_count,
            state: Mutex::new(SlotState {
                available,
                leased: 0,
                released: 0,
            }),
            slot_returned: Condvar::new(),
            source,
            on_error,
        });

        let weak: Weak<PoolShared<T>> = Arc::downgrade(&shared);
        let wake_on_cancel = token.register(move || {
            if let Some(shared) = weak.upgrade() {
                shared.wake_waiters();
            }
        });
        let scheduler = CancellableScheduler::new(scheduler, token, checkpoints)?;

        info!(
            pool_id = %shared.id,
            maximum_instance_count = maximum_instance_count,
            "exclusive resource pool initialized"
        );

        Ok(Self {
            shared,
            scheduler,
            owned_workers: None,
            disposed: AtomicBool::new(false),
            _wake_on_cancel: wake_on_cancel,
        })
    }

    /// Hand ownership of `workers` to the pool; they are closed on dispose.
    pub(crate) fn with_owned_workers(mut self, workers: ThreadPoolScheduler) -> Self {
        self.owned_workers = Some(workers);
        self
    }

    /// Schedule `action` to run with exclusive access to one pooled resource.
    ///
    /// # Errors
    ///
    /// Returns `CancellationRequested` once the pool has been disposed, or the
    /// internal scheduler's refusal.
    pub fn schedule<F>(&self, action: F) -> Result<PoolTicket, SchedulerError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.shared.source.token().error_if_cancellation_requested()?;

        let handle = ScheduleHandle::new();
        let (tx, outcome) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let job_handle = handle.clone();

        let job: Action = Box::new(move |_: &dyn Scheduler| -> AppResult<ScheduleHandle> {
            let slot = match shared.take() {
                Ok(slot) => slot,
                Err(err) => {
                    // Receiver may be gone; the caller stopped caring.
                    let _ = tx.send(Err(err));
                    return Ok(ScheduleHandle::empty());
                }
            };
            let lease = SlotLease {
                shared: Arc::clone(&shared),
                slot: Some(Arc::clone(&slot)),
            };
            if job_handle.is_cancelled() {
                return Ok(ScheduleHandle::empty());
            }

            // A leased slot is idle, so the action runs inline and the resource
            // lock is free again by the time the lease is dropped.
            let ran = Arc::new(Mutex::new(None));
            let ran_in_slot = Arc::clone(&ran);
            let scheduled = slot.schedule(move |resource| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(resource)))
                    .map_err(|payload| SchedulerError::from_panic(payload.as_ref()));
                *ran_in_slot.lock() = Some(outcome);
            });
            drop(lease);

            let outcome = ran.lock().take().unwrap_or(Err(SchedulerError::CancellationRequested));
            if let Err(SchedulerError::ActionPanicked(message)) = &outcome {
                shared.on_error.handle(SchedulerError::ActionPanicked(message.clone()));
            }
            let _ = tx.send(outcome);
            Ok(scheduled?)
        });

        let scheduled = self.scheduler.schedule(None, job).map_err(|err| self.refusal(err))?;
        handle.assign(scheduled);
        Ok(PoolTicket { handle, outcome })
    }

    // Owned workers are closed by dispose, so a concurrent dispose surfaces as `Shutdown`.
    fn refusal(&self, err: SchedulerError) -> SchedulerError {
        match err {
            SchedulerError::Shutdown if self.shared.source.is_cancellation_requested() => {
                SchedulerError::CancellationRequested
            }
            other => other,
        }
    }

    /// Shut the pool down. Idempotent.
    ///
    /// Blocked waits fail with `CancellationRequested`, idle resources are
    /// released in parallel, and leased resources are released as their actions
    /// finish.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.source.cancel();

        let idle: Vec<_> = {
            let mut state = self.shared.state.lock();
            let idle: Vec<_> = state.available.drain(..).collect();
            state.released += idle.len();
            idle
        };

        info!(
            pool_id = %self.shared.id,
            releasing = idle.len(),
            "disposing exclusive resource pool"
        );

        std::thread::scope(|scope| {
            for slot in &idle {
                let shared = &self.shared;
                scope.spawn(move || shared.release_slot(slot));
            }
        });

        if let Some(workers) = &self.owned_workers {
            workers.close();
        }
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Current slot accounting.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            maximum_instance_count: self.shared.maximum_instance_count,
            available: state.available.len(),
            leased: state.leased,
            released: state.released,
        }
    }

    /// Identifier used in log output.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }
}

impl<T: Release> Exclusive<T> for ExclusiveResourcePool<T> {
    fn schedule_exclusive(&self, action: ExclusiveAction<T>) -> Result<ScheduleHandle, SchedulerError> {
        self.schedule(action).map(|ticket| ticket.handle)
    }
}

impl<T: Release> Drop for ExclusiveResourcePool<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Release> fmt::Debug for ExclusiveResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveResourcePool")
            .field("id", &self.shared.id)
            .field("stats", &self.stats())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
