//! Tokio runtime scheduler implementation.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::core::scheduler::invoke;
use crate::core::{Action, DueTime, ErrorHandler, ScheduleHandle, Scheduler, SchedulerError};

/// Runtime created by [`TokioScheduler::with_worker_threads`].
///
/// The last clone may be dropped on one of the runtime's own threads, where a
/// blocking shutdown is not allowed.
struct OwnedRuntime(Option<tokio::runtime::Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

/// Scheduler that runs actions on a Tokio runtime's blocking pool.
///
/// Delays use `tokio::time::sleep`, so the runtime must have its time driver
/// enabled. Cancelling a handle aborts a pending delay; an action that already
/// started runs to completion.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Arc<tokio::runtime::Handle>,
    runtime: Option<Arc<OwnedRuntime>>,
    on_error: ErrorHandler,
}

impl TokioScheduler {
    /// Create a scheduler from an existing runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
            runtime: None,
            on_error: ErrorHandler::logging("tokio_scheduler"),
        }
    }

    /// Create a scheduler owning a new multi-threaded runtime with the given worker threads.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while building the runtime.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("ps-tokio")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: Arc::new(runtime.handle().clone()),
            runtime: Some(Arc::new(OwnedRuntime(Some(runtime)))),
            on_error: ErrorHandler::logging("tokio_scheduler"),
        })
    }

    /// Route action failures to `on_error` instead of the logging handler.
    #[must_use]
    pub fn with_error_handler(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = on_error;
        self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        let delay = due.map(|due| due.delay_from(SystemTime::now()));
        let result = ScheduleHandle::new();
        let task_result = result.clone();
        let context = self.clone();

        let task = self.handle.spawn(async move {
            if let Some(delay) = delay.filter(|d| !d.is_zero()) {
                tokio::time::sleep(delay).await;
            }
            if task_result.is_cancelled() {
                debug!("skipping cancelled action");
                return;
            }
            let on_error = context.on_error.clone();
            let outcome = tokio::task::spawn_blocking(move || invoke(action, &context)).await;
            match outcome {
                Ok(Ok(handle)) => task_result.assign(handle),
                Ok(Err(err)) => on_error.handle(err),
                Err(join_err) => on_error.handle(SchedulerError::ActionPanicked(join_err.to_string())),
            }
        });

        let abort = task.abort_handle();
        Ok(ScheduleHandle::from_fn(move || {
            abort.abort();
            result.cancel();
        }))
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("owns_runtime", &self.runtime.is_some())
            .finish_non_exhaustive()
    }
}
