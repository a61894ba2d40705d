//! # Prometheus Sequencer
//!
//! Cooperative single-flight scheduling primitives for thread-pool based
//! services.
//!
//! Work is expressed as actions submitted to a [`Scheduler`](core::Scheduler).
//! The crate layers serialization, pausing and cancellation on top of any
//! scheduler that can actually run work, and uses those layers to give callers
//! exclusive access to a fixed set of expensive resources.
//!
//! ## Core Problem Solved
//!
//! Many resources tolerate only one user at a time: a GPU context, a database
//! connection, a model session. Wrapping each in a lock blocks threads while
//! they wait. Instead, this crate queues work and elects a single drain loop
//! per queue, so nothing runs concurrently on a protected resource and no pool
//! thread parks on a lock in the common path.
//!
//! ## Key Features
//!
//! - **Gate**: a lock-free two-state latch that elects the one drain loop
//! - **`SequentialScheduler`**: FIFO, one action at a time, on any underlying scheduler
//! - **`QueuedScheduler`**: holds work while disabled and forwards it once enabled
//! - **`CancellableScheduler`**: checks a cancellation token at configurable checkpoints
//! - **`ExclusiveResourcePool`**: hands each action one pooled resource, exclusively
//! - **`ThreadPoolScheduler`**: dedicated OS worker threads with a timer for delays
//!
//! ## Example
//!
//! ```rust,no_run
//! use prometheus_sequencer::core::{ExclusiveResourcePool, DisposableValue};
//! use std::time::Duration;
//!
//! let pool = ExclusiveResourcePool::new(|| DisposableValue::plain(Vec::<u32>::new()), 2)?;
//! let ticket = pool.schedule(|log: &mut DisposableValue<Vec<u32>>| log.push(1))?;
//! ticket.wait(Duration::from_secs(1))?;
//! pool.dispose();
//! # Ok::<(), prometheus_sequencer::core::SchedulerError>(())
//! ```
//!
//! For complete examples, see `tests/resource_pool_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Builders to construct schedulers and resource pools from configuration.
pub mod builders;
/// Configuration models for thread pools and resource pools.
pub mod config;
/// Core scheduling abstractions.
pub mod core;
/// Leaf schedulers backed by the calling thread or a Tokio runtime.
pub mod runtime;
/// Shared utilities.
pub mod util;
