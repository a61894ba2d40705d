//! Tests for builder modules

use prometheus_sequencer::builders::{build_resource_pools, build_thread_pool, ResourcePoolBuilder};
use prometheus_sequencer::config::{ResourcePoolConfig, SequencerConfig, ThreadPoolConfig};
use prometheus_sequencer::core::{DisposableValue, ErrorHandler, SchedulerError, SchedulerExt};
use prometheus_sequencer::runtime::ImmediateScheduler;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_build_thread_pool() {
    let pool = build_thread_pool(&ThreadPoolConfig::new().with_worker_count(2)).unwrap();
    assert_eq!(pool.worker_count(), 2);

    let (tx, rx) = crossbeam_channel::bounded(1);
    pool.spawn(move || tx.send(7).unwrap()).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    pool.shutdown();
}

#[test]
fn test_build_thread_pool_rejects_invalid_config() {
    let result = build_thread_pool(&ThreadPoolConfig::new().with_worker_count(0));
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_resource_pool_builder_accessors() {
    let builder = ResourcePoolBuilder::new("gpu", ResourcePoolConfig::new(2));
    assert_eq!(builder.name(), "gpu");
    assert_eq!(builder.config().maximum_instance_count, 2);
}

#[test]
fn test_resource_pool_builder_with_dedicated_workers() {
    let mut cfg = ResourcePoolConfig::new(2);
    cfg.worker_count = Some(2);
    let pool = ResourcePoolBuilder::new("gpu", cfg)
        .build(|| DisposableValue::plain(0_u32))
        .unwrap();

    let ticket = pool.schedule(|value| **value += 1).unwrap();
    ticket.wait(Duration::from_secs(5)).unwrap();
    assert_eq!(pool.stats().maximum_instance_count, 2);
    pool.dispose();
}

#[test]
fn test_resource_pool_builder_rejects_invalid_config() {
    let result = ResourcePoolBuilder::new("gpu", ResourcePoolConfig::new(0)).build(|| DisposableValue::plain(()));
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(ref msg)) if msg.contains("gpu")));
}

#[test]
fn test_resource_pool_builder_with_scheduler() {
    let pool = ResourcePoolBuilder::new("inline", ResourcePoolConfig::new(1))
        .with_scheduler(Arc::new(ImmediateScheduler::new()))
        .with_error_handler(ErrorHandler::logging("test"))
        .build(|| DisposableValue::plain(String::new()))
        .unwrap();

    // Runs inline, so the outcome is ready immediately.
    let ticket = pool.schedule(|value| value.push_str("done")).unwrap();
    ticket.wait(Duration::from_millis(1)).unwrap();
}

#[test]
fn test_build_resource_pools_from_config() {
    let mut resource_pools = HashMap::new();
    resource_pools.insert("gpu".to_string(), ResourcePoolConfig::new(1));
    let mut db = ResourcePoolConfig::new(3);
    db.worker_count = Some(2);
    resource_pools.insert("db".to_string(), db);
    let cfg = SequencerConfig {
        thread_pool: ThreadPoolConfig::new().with_worker_count(2),
        resource_pools,
    };

    let created = Arc::new(AtomicUsize::new(0));
    let created_clone = Arc::clone(&created);
    let pools = build_resource_pools(
        &cfg,
        move |name| {
            created_clone.fetch_add(1, Ordering::SeqCst);
            DisposableValue::plain(name.to_string())
        },
        ErrorHandler::logging("test"),
    )
    .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 4);
    let mut names: Vec<_> = pools.names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["db", "gpu"]);

    let (tx, rx) = crossbeam_channel::bounded(1);
    let ticket = pools
        .get("gpu")
        .unwrap()
        .schedule(move |name| tx.send(name.to_string()).unwrap())
        .unwrap();
    ticket.wait(Duration::from_secs(5)).unwrap();
    assert_eq!(rx.recv().unwrap(), "gpu");

    pools.dispose();
    assert!(pools.get("db").unwrap().is_disposed());
    assert!(pools.thread_pool().is_shut_down());
}
