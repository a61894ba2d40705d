//! The time-capable scheduler contract.
//!
//! Every component in this crate both consumes and implements [`Scheduler`]: the
//! sequential and queued schedulers drain onto an underlying scheduler, the
//! cancellable scheduler decorates one, and the thread-pool, immediate and tokio
//! schedulers are the leaves that actually run work.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::core::{AppResult, CancellationToken, ScheduleHandle, SchedulerError};

/// A scheduled unit of work.
///
/// The action receives the scheduler that is running it, so it can schedule
/// follow-up work on the same scheduler. Whatever handle it returns is linked to
/// the caller's handle.
pub type Action = Box<dyn FnOnce(&dyn Scheduler) -> AppResult<ScheduleHandle> + Send + 'static>;

/// When a unit of work becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueTime {
    /// Relative to the moment of submission.
    After(Duration),
    /// Absolute wall-clock time.
    At(SystemTime),
}

impl DueTime {
    /// Remaining delay given the scheduler's notion of `now`. Past times yield zero.
    #[must_use]
    pub fn delay_from(self, now: SystemTime) -> Duration {
        match self {
            Self::After(delay) => delay,
            Self::At(at) => at.duration_since(now).unwrap_or(Duration::ZERO),
        }
    }
}

impl From<Duration> for DueTime {
    fn from(delay: Duration) -> Self {
        Self::After(delay)
    }
}

impl From<SystemTime> for DueTime {
    fn from(at: SystemTime) -> Self {
        Self::At(at)
    }
}

/// Time-capable work submission interface.
pub trait Scheduler: Send + Sync {
    /// The scheduler's notion of current time.
    ///
    /// # Errors
    ///
    /// Decorators may refuse to answer, e.g. with `CancellationRequested`.
    fn now(&self) -> Result<SystemTime, SchedulerError> {
        Ok(SystemTime::now())
    }

    /// Submit `action` to run once `due` has passed (`None` = as soon as possible).
    ///
    /// # Errors
    ///
    /// Returns an error when the scheduler refuses the submission.
    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError>;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn now(&self) -> Result<SystemTime, SchedulerError> {
        (**self).now()
    }

    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        (**self).schedule(due, action)
    }
}

/// Convenience methods over any [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Run a plain closure as soon as possible.
    ///
    /// # Errors
    ///
    /// Propagates the scheduler's refusal.
    fn spawn<F>(&self, work: F) -> Result<ScheduleHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(None, plain(work))
    }

    /// Run a plain closure after `delay`.
    ///
    /// # Errors
    ///
    /// Propagates the scheduler's refusal.
    fn spawn_after<F>(&self, delay: Duration, work: F) -> Result<ScheduleHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Some(DueTime::After(delay)), plain(work))
    }

    /// Run a plain closure at an absolute time.
    ///
    /// # Errors
    ///
    /// Propagates the scheduler's refusal.
    fn spawn_at<F>(&self, at: SystemTime, work: F) -> Result<ScheduleHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(Some(DueTime::At(at)), plain(work))
    }

    /// Decorate with a cancellation signal checked at every checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the token can never be cancelled.
    fn with_cancellation(
        self,
        token: CancellationToken,
    ) -> Result<crate::core::CancellableScheduler, SchedulerError>
    where
        Self: Sized + 'static,
    {
        crate::core::CancellableScheduler::new(
            Arc::new(self),
            token,
            crate::core::CancellationCheckpoints::all(),
        )
    }

    /// Decorate with a cancellation signal checked at the given checkpoints.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the token can never be cancelled.
    fn with_cancellation_checkpoints(
        self,
        token: CancellationToken,
        checkpoints: crate::core::CancellationCheckpoints,
    ) -> Result<crate::core::CancellableScheduler, SchedulerError>
    where
        Self: Sized + 'static,
    {
        crate::core::CancellableScheduler::new(Arc::new(self), token, checkpoints)
    }

    /// Run `action` now and then every `interval` until the returned handle is cancelled.
    ///
    /// Each tick is rescheduled on the scheduler running it, `interval` minus the
    /// time the tick took. A tick that overruns the interval is followed
    /// immediately by the next one. `on_complete` runs once, when the handle is
    /// cancelled. A panicking or refused tick ends the timer without calling it.
    ///
    /// The scheduler must run delayed work asynchronously; an inline scheduler
    /// would never return from the first tick.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero interval, or the scheduler's refusal of
    /// the first tick.
    fn schedule_timer<F, C>(
        &self,
        interval: Duration,
        action: F,
        on_complete: C,
    ) -> Result<ScheduleHandle, SchedulerError>
    where
        F: FnMut() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidConfig("timer interval must be greater than zero".into()));
        }
        let timer = ScheduleHandle::from_fn(on_complete);
        // Not assigned: a fast first tick may already have pointed `timer` at its successor.
        self.schedule(None, tick(timer.clone(), interval, action))?;
        Ok(timer)
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}

fn plain<F>(work: F) -> Action
where
    F: FnOnce() + Send + 'static,
{
    Box::new(move |_: &dyn Scheduler| {
        work();
        Ok(ScheduleHandle::empty())
    })
}

fn tick<F>(timer: ScheduleHandle, interval: Duration, mut action: F) -> Action
where
    F: FnMut() + Send + 'static,
{
    Box::new(move |scheduler: &dyn Scheduler| -> AppResult<ScheduleHandle> {
        let next = loop {
            if timer.is_cancelled() {
                return Ok(ScheduleHandle::empty());
            }
            let started = Instant::now();
            action();
            let next = interval.saturating_sub(started.elapsed());
            if !next.is_zero() {
                break next;
            }
        };
        if timer.is_cancelled() {
            return Ok(ScheduleHandle::empty());
        }
        let step = scheduler.schedule(Some(DueTime::After(next)), tick(timer.clone(), interval, action))?;
        timer.assign(step);
        Ok(ScheduleHandle::empty())
    })
}

/// Run an action, converting errors and panics into [`SchedulerError`].
pub(crate) fn invoke(action: Action, scheduler: &dyn Scheduler) -> Result<ScheduleHandle, SchedulerError> {
    match panic::catch_unwind(AssertUnwindSafe(move || action(scheduler))) {
        Ok(Ok(handle)) => Ok(handle),
        Ok(Err(err)) => Err(SchedulerError::ActionFailed(err)),
        Err(payload) => Err(SchedulerError::from_panic(payload.as_ref())),
    }
}
