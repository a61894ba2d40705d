//! Cancellation-aware scheduler decorator.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::core::{Action, CancellationToken, DueTime, ScheduleHandle, Scheduler, SchedulerError};

bitflags::bitflags! {
    /// Points in the scheduling protocol at which the cancellation token is consulted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CancellationCheckpoints: u8 {
        /// Checked when the scheduler is asked for the current time.
        const ON_NOW = 1;
        /// Checked when work is submitted.
        const ON_SCHEDULE = 2;
        /// Checked right before submitted work runs.
        const ON_EXECUTE = 4;
    }
}

impl Default for CancellationCheckpoints {
    fn default() -> Self {
        Self::all()
    }
}

/// Decorates a scheduler with a cancellation token.
///
/// `ON_NOW` and `ON_SCHEDULE` fail fast with [`SchedulerError::CancellationRequested`];
/// `ON_EXECUTE` turns work that becomes due after cancellation into a no-op.
#[derive(Clone)]
pub struct CancellableScheduler {
    scheduler: Arc<dyn Scheduler>,
    checkpoints: CancellationCheckpoints,
    token: CancellationToken,
}

impl CancellableScheduler {
    /// Wrap `scheduler`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] when `token` is neither cancelled nor
    /// able to be cancelled; such a wrapper could never cancel anything.
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        token: CancellationToken,
        checkpoints: CancellationCheckpoints,
    ) -> Result<Self, SchedulerError> {
        if !token.is_cancellation_requested() && !token.can_be_cancelled() {
            return Err(SchedulerError::InvalidConfig(
                "token can not be cancelled, so the scheduler can not support cancellation".into(),
            ));
        }
        Ok(Self {
            scheduler,
            checkpoints,
            token,
        })
    }

    /// Active checkpoints.
    #[must_use]
    pub const fn checkpoints(&self) -> CancellationCheckpoints {
        self.checkpoints
    }

    /// Token consulted at the checkpoints.
    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    fn check(&self, checkpoint: CancellationCheckpoints) -> Result<(), SchedulerError> {
        if self.checkpoints.contains(checkpoint) {
            self.token.error_if_cancellation_requested()
        } else {
            Ok(())
        }
    }
}

impl Scheduler for CancellableScheduler {
    fn now(&self) -> Result<SystemTime, SchedulerError> {
        self.check(CancellationCheckpoints::ON_NOW)?;
        self.scheduler.now()
    }

    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        self.check(CancellationCheckpoints::ON_SCHEDULE)?;

        if !self.checkpoints.contains(CancellationCheckpoints::ON_EXECUTE) {
            return self.scheduler.schedule(due, action);
        }

        let this = self.clone();
        self.scheduler.schedule(
            due,
            Box::new(move |_: &dyn Scheduler| {
                if this.token.is_cancellation_requested() {
                    trace!("cancellation observed at execution, dropping action");
                    return Ok(ScheduleHandle::empty());
                }
                action(&this)
            }),
        )
    }
}

impl fmt::Debug for CancellableScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableScheduler")
            .field("checkpoints", &self.checkpoints)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
