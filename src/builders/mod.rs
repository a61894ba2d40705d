//! Builders to construct schedulers and resource pools from configuration.

pub mod pool_builder;

pub use pool_builder::{build_resource_pools, build_thread_pool, ResourcePoolBuilder, ResourcePools};
