//! Native implementation of `ThreadPoolScheduler` using OS threads.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on `recv`, the timer on a Condvar deadline
//! - **Weak back-references**: workers hold only a `Weak` to the pool, so dropping
//!   the last `ThreadPoolScheduler` handle shuts the pool down
//! - **Clean shutdown**: dropping the sender unblocks workers; jobs still in the
//!   channel are dropped without running so their captured state is released

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ThreadPoolConfig;
use crate::core::scheduler::invoke;
use crate::core::sequential::WorkItem;
use crate::core::{Action, DueTime, ErrorHandler, ScheduleHandle, Scheduler, SchedulerError};

use super::timer::Timer;

struct Inner {
    config: ThreadPoolConfig,
    /// Job sender. `None` once shut down.
    job_tx: Mutex<Option<Sender<WorkItem>>>,
    timer: Arc<Timer>,
    shutdown: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn signal_shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.job_tx.lock().take();
        self.timer.shutdown();
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Don't join here: the last handle may be dropped on a worker thread.
        if self.signal_shutdown() {
            debug!("ThreadPoolScheduler dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Scheduler running work on dedicated OS threads.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ThreadPoolScheduler {
    inner: Arc<Inner>,
}

impl ThreadPoolScheduler {
    /// Start a pool with the given configuration and a logging error handler.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an invalid configuration or if a thread could not be spawned.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, SchedulerError> {
        Self::with_error_handler(config, ErrorHandler::logging("thread_pool_scheduler"))
    }

    /// Start a pool with `worker_count` workers and default settings otherwise.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_worker_count(worker_count: usize) -> Result<Self, SchedulerError> {
        Self::new(ThreadPoolConfig::new().with_worker_count(worker_count))
    }

    /// Start a pool routing action failures to `on_error`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_error_handler(config: ThreadPoolConfig, on_error: ErrorHandler) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let (job_tx, job_rx) = unbounded::<WorkItem>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (timer, timer_thread) = Timer::start(format!("{}-timer", config.thread_name_prefix), job_tx.clone())
            .map_err(|e| SchedulerError::InvalidConfig(format!("failed to spawn timer thread: {e}")))?;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let mut threads = Vec::with_capacity(config.worker_count + 1);
            threads.push(timer_thread);
            for worker_id in 0..config.worker_count {
                match spawn_worker(worker_id, &config, job_rx.clone(), weak.clone(), Arc::clone(&shutdown), on_error.clone()) {
                    Ok(handle) => threads.push(handle),
                    Err(err) => {
                        // Keep whatever started; a smaller pool still makes progress.
                        warn!(worker_id = worker_id, error = %err, "failed to spawn worker thread");
                    }
                }
            }
            Inner {
                config: config.clone(),
                job_tx: Mutex::new(Some(job_tx)),
                timer,
                shutdown: Arc::clone(&shutdown),
                threads: Mutex::new(threads),
            }
        });

        let started = inner.threads.lock().len() - 1;
        if started == 0 {
            inner.signal_shutdown();
            return Err(SchedulerError::InvalidConfig("no worker thread could be spawned".into()));
        }

        info!(
            worker_count = started,
            thread_name_prefix = %config.thread_name_prefix,
            "ThreadPoolScheduler initialized with dedicated OS threads"
        );

        Ok(Self { inner })
    }

    /// Number of worker threads configured.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.config.worker_count
    }

    /// Whether shutdown has been signaled.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same pool.
    #[must_use]
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stop accepting work and let the threads wind down without waiting for them.
    pub fn close(&self) {
        if self.inner.signal_shutdown() {
            info!("ThreadPoolScheduler closed");
        }
    }

    /// Stop accepting work and join the threads, waiting up to 2 seconds per thread.
    ///
    /// Threads that don't exit within the timeout are detached to prevent hangs.
    pub fn shutdown(&self) {
        self.close();

        let current = thread::current().id();
        let threads: Vec<_> = self.inner.threads.lock().drain(..).collect();
        let count = threads.len();

        for (idx, handle) in threads.into_iter().enumerate() {
            if handle.thread().id() == current {
                // Called from inside the pool; joining ourselves would deadlock.
                continue;
            }
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let _ = tx.send(handle.join().is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(thread_idx = idx, "Pool thread joined successfully"),
                Ok(false) => warn!(thread_idx = idx, "Pool thread panicked"),
                Err(_) => {
                    warn!(thread_idx = idx, "Pool thread did not exit within timeout - detaching");
                    continue;
                }
            }
            let _ = join_thread.join();
        }

        info!(thread_count = count, "ThreadPoolScheduler shut down complete");
    }

    fn submit(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        if self.is_shut_down() {
            return Err(SchedulerError::Shutdown);
        }

        let handle = ScheduleHandle::new();
        let job = WorkItem {
            handle: handle.clone(),
            action,
        };

        let delay = due.map_or(Duration::ZERO, |due| due.delay_from(SystemTime::now()));
        if delay.is_zero() {
            let job_tx = self.inner.job_tx.lock();
            let Some(job_tx) = job_tx.as_ref() else {
                return Err(SchedulerError::Shutdown);
            };
            job_tx.send(job).map_err(|_| SchedulerError::Shutdown)?;
        } else if !self.inner.timer.push(Instant::now() + delay, job) {
            return Err(SchedulerError::Shutdown);
        }

        Ok(handle)
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        self.submit(due, action)
    }
}

impl fmt::Debug for ThreadPoolScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolScheduler")
            .field("worker_count", &self.worker_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// The scheduler handed to actions running on a worker.
///
/// Holds only a weak reference so in-flight work never keeps the pool alive.
struct WorkerContext {
    pool: Weak<Inner>,
}

impl Scheduler for WorkerContext {
    fn schedule(&self, due: Option<DueTime>, action: Action) -> Result<ScheduleHandle, SchedulerError> {
        let inner = self.pool.upgrade().ok_or(SchedulerError::Shutdown)?;
        ThreadPoolScheduler { inner }.submit(due, action)
    }
}

/// Spawn a worker thread.
fn spawn_worker(
    worker_id: usize,
    config: &ThreadPoolConfig,
    job_rx: Receiver<WorkItem>,
    pool: Weak<Inner>,
    shutdown: Arc<AtomicBool>,
    on_error: ErrorHandler,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-{worker_id}", config.thread_name_prefix))
        .stack_size(config.stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");
            let context = WorkerContext { pool };

            // When every sender is dropped, recv returns Err and the worker exits.
            while let Ok(job) = job_rx.recv() {
                if shutdown.load(Ordering::Acquire) {
                    // Drain without running so captured state is released.
                    continue;
                }
                if job.handle.is_cancelled() {
                    continue;
                }
                match invoke(job.action, &context) {
                    Ok(result) => job.handle.assign(result),
                    Err(err) => on_error.handle(err),
                }
            }

            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}
