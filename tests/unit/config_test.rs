//! Tests for configuration validation

use prometheus_sequencer::config::{ResourcePoolConfig, SequencerConfig, ThreadPoolConfig};
use prometheus_sequencer::core::CancellationCheckpoints;

#[test]
fn test_thread_pool_config_defaults_are_valid() {
    let cfg = ThreadPoolConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.worker_count >= 2);
    assert_eq!(cfg.thread_name_prefix, "ps-worker");
}

#[test]
fn test_thread_pool_config_rejects_bad_values() {
    assert!(ThreadPoolConfig::new().with_worker_count(0).validate().is_err());
    assert!(ThreadPoolConfig::new().with_thread_name_prefix("").validate().is_err());
    assert!(ThreadPoolConfig::new().with_stack_size(1024).validate().is_err());
}

#[test]
fn test_resource_pool_config_validation() {
    assert!(ResourcePoolConfig::new(4).validate().is_ok());
    assert!(ResourcePoolConfig::new(0).validate().is_err());

    let mut no_execute = ResourcePoolConfig::new(2);
    no_execute.checkpoints = CancellationCheckpoints::ON_SCHEDULE;
    assert!(no_execute.validate().is_err());

    let mut zero_workers = ResourcePoolConfig::new(2);
    zero_workers.worker_count = Some(0);
    assert!(zero_workers.validate().is_err());
}

#[test]
fn test_sequencer_config_from_json() {
    let json = r#"{
        "thread_pool": { "worker_count": 3 },
        "resource_pools": {
            "gpu": { "maximum_instance_count": 2, "worker_count": 2 },
            "db": { "maximum_instance_count": 8, "checkpoints": "ON_NOW | ON_SCHEDULE | ON_EXECUTE" }
        }
    }"#;

    let cfg = SequencerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.thread_pool.worker_count, 3);
    assert_eq!(cfg.thread_pool.thread_name_prefix, "ps-worker");
    assert_eq!(cfg.resource_pools["gpu"].worker_count, Some(2));
    assert_eq!(cfg.resource_pools["gpu"].checkpoints, CancellationCheckpoints::ON_EXECUTE);
    assert_eq!(cfg.resource_pools["db"].checkpoints, CancellationCheckpoints::all());
}

#[test]
fn test_sequencer_config_rejects_invalid_pool() {
    let json = r#"{ "resource_pools": { "gpu": { "maximum_instance_count": 0 } } }"#;
    let err = SequencerConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("gpu"));

    assert!(SequencerConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}
