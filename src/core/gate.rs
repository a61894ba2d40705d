//! Two-state atomic latch.
//!
//! A [`Gate`] elects a single drain-loop owner without blocking: whoever moves it
//! from closed to open owns the loop until it closes the gate again.
//!
//! ```
//! use prometheus_sequencer::core::Gate;
//!
//! let gate = Gate::new();
//! assert!(gate.try_open());
//! assert!(!gate.try_open());
//! gate.close().unwrap();
//! assert!(gate.try_open());
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use crate::core::SchedulerError;

const CLOSED: u8 = 0;
const OPENED: u8 = 1;

/// Lock-free boolean latch manipulated by compare-and-swap.
#[derive(Debug)]
pub struct Gate {
    state: AtomicU8,
}

impl Gate {
    /// Create a closed gate.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_state(false)
    }

    /// Create a gate in the given state.
    #[must_use]
    pub const fn with_state(opened: bool) -> Self {
        Self {
            state: AtomicU8::new(if opened { OPENED } else { CLOSED }),
        }
    }

    /// Move closed→open. Returns whether this call performed the transition.
    pub fn try_open(&self) -> bool {
        self.state
            .compare_exchange(CLOSED, OPENED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Move open→closed. Returns whether this call performed the transition.
    pub fn try_close(&self) -> bool {
        self.state
            .compare_exchange(OPENED, CLOSED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Open the gate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTransition`] if the gate is already open.
    pub fn open(&self) -> Result<(), SchedulerError> {
        if self.try_open() {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition("open"))
        }
    }

    /// Close the gate.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidTransition`] if the gate is already closed.
    pub fn close(&self) -> Result<(), SchedulerError> {
        if self.try_close() {
            Ok(())
        } else {
            Err(SchedulerError::InvalidTransition("closed"))
        }
    }

    /// Snapshot of the current state. Advisory only.
    pub fn is_opened(&self) -> bool {
        self.state.load(Ordering::SeqCst) == OPENED
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
