//! Cancellation signal shared between a source and any number of tokens.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::SchedulerError;

type Callback = Box<dyn FnOnce() + Send>;

struct Shared {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<Vec<(u64, Callback)>>,
}

/// Owner side of a cancellation signal.
pub struct CancellationSource {
    shared: Arc<Shared>,
}

impl CancellationSource {
    /// Create a source that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                cancelled: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Token observing this source.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            shared: Some(Arc::clone(&self.shared)),
        }
    }

    /// Request cancellation and run registered callbacks once.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let callbacks = std::mem::take(&mut *self.shared.callbacks.lock());
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancellation_requested(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}

/// Observer side of a cancellation signal.
///
/// [`CancellationToken::none`] yields a token that can never be cancelled.
#[derive(Clone)]
pub struct CancellationToken {
    shared: Option<Arc<Shared>>,
}

impl CancellationToken {
    /// Token that is never cancelled.
    #[must_use]
    pub const fn none() -> Self {
        Self { shared: None }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancellation_requested(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.cancelled.load(Ordering::SeqCst))
    }

    /// Whether this token is attached to a source and so may be cancelled.
    pub const fn can_be_cancelled(&self) -> bool {
        self.shared.is_some()
    }

    /// Fail with [`SchedulerError::CancellationRequested`] if cancelled.
    ///
    /// # Errors
    ///
    /// Returns `CancellationRequested` once the source has been cancelled.
    pub fn error_if_cancellation_requested(&self) -> Result<(), SchedulerError> {
        if self.is_cancellation_requested() {
            Err(SchedulerError::CancellationRequested)
        } else {
            Ok(())
        }
    }

    /// Run `callback` on cancellation.
    ///
    /// If cancellation was already requested the callback runs immediately on the
    /// calling thread. Dropping the returned registration unregisters the callback.
    pub fn register<F>(&self, callback: F) -> CancellationRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(shared) = &self.shared else {
            return CancellationRegistration { entry: None };
        };

        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut callbacks = shared.callbacks.lock();
            if !shared.cancelled.load(Ordering::SeqCst) {
                callbacks.push((id, Box::new(callback)));
                return CancellationRegistration {
                    entry: Some((Arc::clone(shared), id)),
                };
            }
        }

        callback();
        CancellationRegistration { entry: None }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("can_be_cancelled", &self.can_be_cancelled())
            .field("cancelled", &self.is_cancellation_requested())
            .finish()
    }
}

/// Keeps a cancellation callback registered while alive.
#[must_use = "dropping the registration unregisters the callback"]
pub struct CancellationRegistration {
    entry: Option<(Arc<Shared>, u64)>,
}

impl Drop for CancellationRegistration {
    fn drop(&mut self) {
        if let Some((shared, id)) = self.entry.take() {
            shared.callbacks.lock().retain(|(entry_id, _)| *entry_id != id);
        }
    }
}
