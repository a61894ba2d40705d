//! Configuration models for thread pools and resource pools.

pub mod pool;

pub use pool::{ResourcePoolConfig, SequencerConfig, ThreadPoolConfig};
