//! Thread pool and resource pool configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::CancellationCheckpoints;

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const ENV_PREFIX: &str = "PROMETHEUS_SEQUENCER_";

fn default_worker_count() -> usize {
    num_cpus::get().max(2)
}

fn default_thread_name_prefix() -> String {
    "ps-worker".into()
}

const fn default_stack_size() -> usize {
    DEFAULT_STACK_SIZE
}

/// Configuration for a [`ThreadPoolScheduler`](crate::core::ThreadPoolScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of worker threads.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Prefix for worker thread names; workers are suffixed with their index.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
    /// Stack size of each worker thread in bytes.
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
}

impl ThreadPoolConfig {
    /// Defaults: one worker per CPU (at least two), 2 MiB stacks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            worker_count: default_worker_count(),
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        if self.stack_size < 64 * 1024 {
            return Err("stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for one [`ExclusiveResourcePool`](crate::core::ExclusiveResourcePool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePoolConfig {
    /// Number of resources created up front.
    pub maximum_instance_count: usize,
    /// Worker threads dedicated to the pool; `None` uses the shared thread pool settings.
    #[serde(default)]
    pub worker_count: Option<usize>,
    /// Checkpoints applied by the pool's internal scheduler.
    #[serde(default = "default_pool_checkpoints")]
    pub checkpoints: CancellationCheckpoints,
}

const fn default_pool_checkpoints() -> CancellationCheckpoints {
    CancellationCheckpoints::ON_EXECUTE
}

impl ResourcePoolConfig {
    /// Pool of `maximum_instance_count` resources with default settings.
    #[must_use]
    pub const fn new(maximum_instance_count: usize) -> Self {
        Self {
            maximum_instance_count,
            worker_count: None,
            checkpoints: default_pool_checkpoints(),
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.maximum_instance_count == 0 {
            return Err("maximum_instance_count must be greater than 0".into());
        }
        if self.worker_count == Some(0) {
            return Err("worker_count must be greater than 0".into());
        }
        if !self.checkpoints.contains(CancellationCheckpoints::ON_EXECUTE) {
            return Err("checkpoints must include ON_EXECUTE so disposal skips queued work".into());
        }
        Ok(())
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Shared thread pool settings.
    #[serde(default)]
    pub thread_pool: ThreadPoolConfig,
    /// Named resource pools.
    #[serde(default)]
    pub resource_pools: HashMap<String, ResourcePoolConfig>,
}

impl SequencerConfig {
    /// Validate the thread pool and every resource pool.
    ///
    /// # Errors
    ///
    /// Returns a description naming the invalid section.
    pub fn validate(&self) -> Result<(), String> {
        self.thread_pool
            .validate()
            .map_err(|e| format!("thread_pool invalid: {e}"))?;
        for (name, pool) in &self.resource_pools {
            pool.validate()
                .map_err(|e| format!("resource pool `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error description.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build the thread pool section from `PROMETHEUS_SEQUENCER_*` environment
    /// variables, loading a `.env` file first if one exists.
    ///
    /// Recognized: `WORKER_COUNT`, `THREAD_NAME_PREFIX`, `STACK_SIZE`. Unset
    /// variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable numbers or invalid values.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<L>(lookup: L) -> Result<Self, String>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut thread_pool = ThreadPoolConfig::new();

        if let Some(value) = var("WORKER_COUNT") {
            thread_pool.worker_count = value
                .parse()
                .map_err(|e| format!("{ENV_PREFIX}WORKER_COUNT: {e}"))?;
        }
        if let Some(value) = var("THREAD_NAME_PREFIX") {
            thread_pool.thread_name_prefix = value;
        }
        if let Some(value) = var("STACK_SIZE") {
            thread_pool.stack_size = value
                .parse()
                .map_err(|e| format!("{ENV_PREFIX}STACK_SIZE: {e}"))?;
        }

        let cfg = Self {
            thread_pool,
            resource_pools: HashMap::new(),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}
