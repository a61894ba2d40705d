//! Core scheduling abstractions: the gate, the scheduler contract and its
//! decorators, cancellation, and exclusive resource pooling.

pub mod cancellable;
pub mod cancellation;
pub mod error;
pub mod exclusive;
pub mod gate;
pub mod handle;
pub mod queued;
pub mod resource_pool;
pub mod scheduler;
pub mod sequential;
pub mod worker_pool;

pub use cancellable::{CancellableScheduler, CancellationCheckpoints};
pub use cancellation::{CancellationRegistration, CancellationSource, CancellationToken};
pub use error::{AppResult, ErrorHandler, SchedulerError};
pub use exclusive::{DisposableValue, Exclusive, ExclusiveAction, ExclusiveSlot, Release};
pub use gate::Gate;
pub use handle::ScheduleHandle;
pub use queued::QueuedScheduler;
pub use resource_pool::{ExclusiveResourcePool, PoolStats, PoolTicket};
pub use scheduler::{Action, DueTime, Scheduler, SchedulerExt};
pub use sequential::SequentialScheduler;
pub use worker_pool::{default_scheduler, ThreadPoolScheduler};
