//! Builders to construct thread pools and resource pools from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ResourcePoolConfig, SequencerConfig, ThreadPoolConfig};
use crate::core::{ErrorHandler, ExclusiveResourcePool, Release, Scheduler, SchedulerError, ThreadPoolScheduler};

/// Build a thread pool scheduler from configuration.
///
/// # Errors
///
/// Returns `InvalidConfig` if the configuration is invalid or no worker could be spawned.
pub fn build_thread_pool(cfg: &ThreadPoolConfig) -> Result<ThreadPoolScheduler, SchedulerError> {
    ThreadPoolScheduler::new(cfg.clone())
}

/// Builder for a single named [`ExclusiveResourcePool`].
///
/// Without an explicit scheduler the pool gets dedicated workers: the
/// configured `worker_count`, or one per CPU.
pub struct ResourcePoolBuilder {
    name: String,
    config: ResourcePoolConfig,
    scheduler: Option<Arc<dyn Scheduler>>,
    on_error: Option<ErrorHandler>,
}

impl ResourcePoolBuilder {
    /// Create a builder for the pool called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ResourcePoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            scheduler: None,
            on_error: None,
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &ResourcePoolConfig {
        &self.config
    }

    /// Run pool jobs on `scheduler` instead of dedicated workers.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Route pool failures to `on_error`.
    #[must_use]
    pub fn with_error_handler(mut self, on_error: ErrorHandler) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Build the pool, calling `factory` once per resource.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an invalid configuration or if the dedicated
    /// workers could not be started.
    pub fn build<T, F>(self, factory: F) -> Result<ExclusiveResourcePool<T>, SchedulerError>
    where
        T: Release,
        F: FnMut() -> T,
    {
        self.config
            .validate()
            .map_err(|e| SchedulerError::InvalidConfig(format!("resource pool `{}` invalid: {e}", self.name)))?;

        let on_error = self.on_error.unwrap_or_else(|| ErrorHandler::logging("exclusive_resource_pool"));

        let pool = if let Some(scheduler) = self.scheduler {
            ExclusiveResourcePool::assemble(
                factory,
                self.config.maximum_instance_count,
                scheduler,
                self.config.checkpoints,
                on_error,
            )?
        } else {
            let worker_count = self
                .config
                .worker_count
                .unwrap_or_else(|| num_cpus::get().max(2));
            let workers = ThreadPoolScheduler::with_error_handler(
                ThreadPoolConfig::new()
                    .with_worker_count(worker_count)
                    .with_thread_name_prefix(format!("ps-{}", self.name)),
                on_error.clone(),
            )?;
            ExclusiveResourcePool::assemble(
                factory,
                self.config.maximum_instance_count,
                Arc::new(workers.clone()),
                self.config.checkpoints,
                on_error,
            )?
            .with_owned_workers(workers)
        };

        info!(
            pool = %self.name,
            pool_id = %pool.id(),
            maximum_instance_count = self.config.maximum_instance_count,
            "resource pool built"
        );
        Ok(pool)
    }
}

/// Resource pools built from a [`SequencerConfig`], plus the shared thread pool
/// that runs every pool without its own `worker_count`.
pub struct ResourcePools<T: Release> {
    thread_pool: ThreadPoolScheduler,
    pools: HashMap<String, ExclusiveResourcePool<T>>,
}

impl<T: Release> ResourcePools<T> {
    /// Pool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExclusiveResourcePool<T>> {
        self.pools.get(name)
    }

    /// Names of all pools.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Shared thread pool.
    #[must_use]
    pub const fn thread_pool(&self) -> &ThreadPoolScheduler {
        &self.thread_pool
    }

    /// Dispose every pool, then shut the shared thread pool down.
    pub fn dispose(&self) {
        for pool in self.pools.values() {
            pool.dispose();
        }
        self.thread_pool.close();
    }
}

impl<T: Release> std::fmt::Debug for ResourcePools<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePools")
            .field("thread_pool", &self.thread_pool)
            .field("pools", &self.pools)
            .finish()
    }
}

/// Build every configured resource pool.
///
/// `factory` is called with the pool name once per resource. Pools without a
/// `worker_count` share one thread pool built from `cfg.thread_pool`; a job
/// waiting for a resource occupies a shared worker, so pools with long waits
/// should get dedicated workers.
///
/// # Errors
///
/// Returns `InvalidConfig` if the configuration is invalid or a thread pool
/// could not be started.
pub fn build_resource_pools<T, F>(
    cfg: &SequencerConfig,
    mut factory: F,
    on_error: ErrorHandler,
) -> Result<ResourcePools<T>, SchedulerError>
where
    T: Release,
    F: FnMut(&str) -> T,
{
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;

    let thread_pool = ThreadPoolScheduler::with_error_handler(cfg.thread_pool.clone(), on_error.clone())?;
    let shared: Arc<dyn Scheduler> = Arc::new(thread_pool.clone());

    let mut pools = HashMap::new();
    for (name, pool_cfg) in &cfg.resource_pools {
        let mut builder = ResourcePoolBuilder::new(name.clone(), pool_cfg.clone()).with_error_handler(on_error.clone());
        if pool_cfg.worker_count.is_none() {
            builder = builder.with_scheduler(Arc::clone(&shared));
        }
        let pool = builder.build(|| factory(name))?;
        pools.insert(name.clone(), pool);
    }

    Ok(ResourcePools { thread_pool, pools })
}
