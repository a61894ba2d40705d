//! Values with exclusive, serialized access.
//!
//! An [`ExclusiveSlot`] pairs one resource with a private [`SequentialScheduler`]
//! that runs inline on whichever thread submits while the slot is idle. Actions
//! scheduled against the slot therefore never overlap, and each receives `&mut`
//! access to the resource.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{AppResult, ErrorHandler, ScheduleHandle, Scheduler, SchedulerError, SequentialScheduler};
use crate::runtime::ImmediateScheduler;

/// A resource that must be released explicitly when its owner shuts down.
pub trait Release: Send + 'static {
    /// Free whatever the resource holds.
    ///
    /// # Errors
    ///
    /// Any failure is reported to the owner's error handler; it never stops the
    /// release of sibling resources.
    fn release(self) -> AppResult<()>;
}

type DisposeFn<T> = Box<dyn FnOnce(T) -> AppResult<()> + Send>;

/// A value paired with the routine that disposes of it.
pub struct DisposableValue<T> {
    value: T,
    dispose: Option<DisposeFn<T>>,
}

impl<T> DisposableValue<T> {
    /// Pair `value` with a dispose routine.
    pub fn new<F>(value: T, dispose: F) -> Self
    where
        F: FnOnce(T) -> AppResult<()> + Send + 'static,
    {
        Self {
            value,
            dispose: Some(Box::new(dispose)),
        }
    }

    /// Wrap a value whose release is just `drop`.
    pub const fn plain(value: T) -> Self {
        Self { value, dispose: None }
    }

    /// Borrow the wrapped value.
    pub const fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for DisposableValue<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for DisposableValue<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Send + 'static> Release for DisposableValue<T> {
    fn release(self) -> AppResult<()> {
        match self.dispose {
            Some(dispose) => dispose(self.value),
            None => Ok(()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for DisposableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableValue")
            .field("value", &self.value)
            .field("has_dispose", &self.dispose.is_some())
            .finish()
    }
}

/// Action run with exclusive access to a value.
pub type ExclusiveAction<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// Something that runs actions with exclusive access to a `T`.
pub trait Exclusive<T>: Send + Sync {
    /// Schedule `action` to run with exclusive access. Cancel the handle to skip it.
    ///
    /// # Errors
    ///
    /// Returns an error if the owner no longer accepts work.
    fn schedule_exclusive(&self, action: ExclusiveAction<T>) -> Result<ScheduleHandle, SchedulerError>;
}

/// One resource plus the private scheduler that serializes access to it.
pub struct ExclusiveSlot<T> {
    value: Arc<Mutex<Option<T>>>,
    scheduler: SequentialScheduler,
}

impl<T: Release> ExclusiveSlot<T> {
    /// Wrap `value`; failures inside the private scheduler go to `on_error`.
    pub fn new(value: T, on_error: ErrorHandler) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(value))),
            scheduler: SequentialScheduler::new(Arc::new(ImmediateScheduler::new()), on_error),
        }
    }

    /// Schedule `action` against the resource.
    ///
    /// When the slot is idle the action runs on the calling thread before this
    /// returns; otherwise it queues behind the running action and executes on the
    /// thread that owns the slot's drain loop.
    ///
    /// # Errors
    ///
    /// Propagates a refusal of the private scheduler.
    pub fn schedule<F>(&self, action: F) -> Result<ScheduleHandle, SchedulerError>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let value = Arc::clone(&self.value);
        self.scheduler.schedule(
            None,
            Box::new(move |_: &dyn Scheduler| {
                let mut guard = value.lock();
                let Some(resource) = guard.as_mut() else {
                    return Err(SchedulerError::CancellationRequested.into());
                };
                action(resource);
                Ok(ScheduleHandle::empty())
            }),
        )
    }

    /// Release the resource. Later actions fail with `CancellationRequested`.
    ///
    /// Returns `Ok(false)` if it was already released.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ResourceDisposal`] if the resource failed to release.
    pub fn release(&self) -> Result<bool, SchedulerError> {
        let taken = self.value.lock().take();
        match taken {
            Some(resource) => resource
                .release()
                .map(|()| true)
                .map_err(SchedulerError::ResourceDisposal),
            None => Ok(false),
        }
    }

    /// Whether the resource has been released.
    pub fn is_released(&self) -> bool {
        self.value.lock().is_none()
    }
}

impl<T: Release> Exclusive<T> for ExclusiveSlot<T> {
    fn schedule_exclusive(&self, action: ExclusiveAction<T>) -> Result<ScheduleHandle, SchedulerError> {
        self.schedule(action)
    }
}

impl<T> fmt::Debug for ExclusiveSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveSlot")
            .field("queued", &self.scheduler.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted(releases: &Arc<AtomicUsize>) -> DisposableValue<Vec<u32>> {
        let releases = Arc::clone(releases);
        DisposableValue::new(Vec::new(), move |_| {
            releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_slot_runs_action_with_mutable_access() {
        let releases = Arc::new(AtomicUsize::new(0));
        let slot = ExclusiveSlot::new(counted(&releases), ErrorHandler::logging("slot_test"));

        slot.schedule(|value| value.push(1)).unwrap();
        slot.schedule(|value| value.push(2)).unwrap();

        let (tx, rx) = crossbeam_channel::bounded(1);
        slot.schedule(move |value| tx.send(value.clone()).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_release_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let slot = ExclusiveSlot::new(counted(&releases), ErrorHandler::logging("slot_test"));

        assert!(slot.release().unwrap());
        assert!(!slot.release().unwrap());
        assert!(slot.is_released());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_action_after_release_is_reported() {
        let failures = Arc::new(AtomicUsize::new(0));
        let failures_clone = Arc::clone(&failures);
        let slot = ExclusiveSlot::new(
            DisposableValue::plain(0_u32),
            ErrorHandler::new("slot_test", move |_| {
                failures_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        slot.release().unwrap();

        slot.schedule(|value| **value += 1).unwrap();
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_failure_maps_to_disposal_error() {
        let slot = ExclusiveSlot::new(
            DisposableValue::new((), |()| Err(anyhow::anyhow!("stuck handle"))),
            ErrorHandler::logging("slot_test"),
        );
        assert!(matches!(slot.release(), Err(SchedulerError::ResourceDisposal(_))));
    }

    #[test]
    fn test_disposable_value_deref() {
        let mut value = DisposableValue::plain(String::from("gpu-0"));
        value.push_str("-ready");
        assert_eq!(value.as_str(), "gpu-0-ready");
        assert_eq!(value.value(), "gpu-0-ready");
    }
}
