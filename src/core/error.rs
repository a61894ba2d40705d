//! Error types and the injected error handler for scheduler components.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A gate was asked to move into the state it is already in.
    #[error("invalid gate transition: gate is already {0}")]
    InvalidTransition(&'static str),
    /// The operation was abandoned because cancellation was requested.
    #[error("cancellation requested")]
    CancellationRequested,
    /// A scheduled action returned an error.
    #[error("scheduled action failed: {0}")]
    ActionFailed(#[source] anyhow::Error),
    /// A scheduled action panicked.
    #[error("scheduled action panicked: {0}")]
    ActionPanicked(String),
    /// Releasing a pooled resource failed during shutdown.
    #[error("resource disposal failed: {0}")]
    ResourceDisposal(#[source] anyhow::Error),
    /// Construction-time contract violation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The scheduler no longer accepts work.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// A wait elapsed before the outcome was known.
    #[error("operation timed out")]
    Timeout,
}

impl SchedulerError {
    /// True for the cancellation variant.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::CancellationRequested)
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::ActionPanicked(panic_message(payload))
    }
}

/// Application-facing result using anyhow for user actions and resource release.
pub type AppResult<T> = Result<T, anyhow::Error>;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Callback receiving failures that are contained at a drain-loop or worker boundary.
///
/// Handlers are not expected to panic. If one does, the panic is swallowed and
/// both failures are logged, so a broken handler can never take down a drain loop.
#[derive(Clone)]
pub struct ErrorHandler {
    component: &'static str,
    handler: Arc<dyn Fn(SchedulerError) + Send + Sync>,
}

impl ErrorHandler {
    /// Wrap a callback. `component` names the owner in log output.
    pub fn new<F>(component: &'static str, handler: F) -> Self
    where
        F: Fn(SchedulerError) + Send + Sync + 'static,
    {
        Self {
            component,
            handler: Arc::new(handler),
        }
    }

    /// Handler that only logs the failure at error level.
    #[must_use]
    pub fn logging(component: &'static str) -> Self {
        Self::new(component, move |err| {
            tracing::error!(component = component, error = %err, "unhandled scheduler failure");
        })
    }

    /// Shared process-wide logging handler.
    ///
    /// Offered for convenience only; components always receive their handler explicitly.
    #[must_use]
    pub fn default_handler() -> Self {
        static DEFAULT: OnceLock<ErrorHandler> = OnceLock::new();
        DEFAULT.get_or_init(|| Self::logging("prometheus_sequencer")).clone()
    }

    /// Name of the component this handler was created for.
    #[must_use]
    pub const fn component(&self) -> &'static str {
        self.component
    }

    /// Route a failure to the callback.
    pub fn handle(&self, err: SchedulerError) {
        let description = err.to_string();
        let handler = Arc::clone(&self.handler);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || handler(err))) {
            tracing::error!(
                component = self.component,
                error = %description,
                handler_panic = %panic_message(payload.as_ref()),
                "error handler panicked while handling failure"
            );
        }
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}
