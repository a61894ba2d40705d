//! Thread-pool-backed time-capable scheduler.
//!
//! [`ThreadPoolScheduler`] is the default leaf scheduler: dedicated OS worker
//! threads pull jobs from a channel, and a timer thread hands delayed jobs over
//! when they become due.
//!
//! # Key Features
//!
//! - **No polling**: workers block on channel recv; the timer waits on a Condvar
//! - **Clean shutdown**: dropping the sender unblocks workers naturally
//! - **Contained failures**: action errors and panics go to the error handler
//!
//! # Example
//!
//! ```rust,no_run
//! use prometheus_sequencer::config::ThreadPoolConfig;
//! use prometheus_sequencer::core::{SchedulerExt, ThreadPoolScheduler};
//! use std::time::Duration;
//!
//! let pool = ThreadPoolScheduler::new(ThreadPoolConfig::new().with_worker_count(4))?;
//! pool.spawn(|| println!("now"))?;
//! pool.spawn_after(Duration::from_millis(50), || println!("later"))?;
//! pool.shutdown();
//! # Ok::<(), prometheus_sequencer::core::SchedulerError>(())
//! ```

mod native;
mod timer;

use std::sync::OnceLock;

pub use native::ThreadPoolScheduler;

/// Process-wide thread pool, created on first use.
///
/// Never used implicitly by the schedulers in this crate; pass it explicitly.
///
/// # Panics
///
/// Panics if the operating system refuses to spawn the worker threads.
#[must_use]
pub fn default_scheduler() -> ThreadPoolScheduler {
    static DEFAULT: OnceLock<ThreadPoolScheduler> = OnceLock::new();
    DEFAULT
        .get_or_init(|| {
            ThreadPoolScheduler::new(crate::config::ThreadPoolConfig::new())
                .unwrap_or_else(|err| panic!("failed to start default thread pool: {err}"))
        })
        .clone()
}
