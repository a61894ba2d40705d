//! Leaf schedulers that actually run work: inline on the caller's thread, or
//! on a Tokio runtime.

pub mod immediate;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_scheduler;

pub use immediate::ImmediateScheduler;
#[cfg(feature = "tokio-runtime")]
pub use tokio_scheduler::TokioScheduler;
