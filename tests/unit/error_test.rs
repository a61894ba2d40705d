//! Tests for error types and error handlers

use prometheus_sequencer::core::{ErrorHandler, SchedulerError};
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_scheduler_error_display() {
    assert_eq!(SchedulerError::Shutdown.to_string(), "scheduler has been shut down");
    assert_eq!(SchedulerError::Timeout.to_string(), "operation timed out");
    assert_eq!(
        SchedulerError::InvalidConfig("worker_count must be greater than 0".into()).to_string(),
        "invalid configuration: worker_count must be greater than 0"
    );
}

#[test]
fn test_action_failure_keeps_source() {
    let err = SchedulerError::ActionFailed(anyhow::anyhow!("device lost"));
    assert!(err.source().is_some());
    assert!(!err.is_cancellation());
    assert!(SchedulerError::CancellationRequested.is_cancellation());
}

#[test]
fn test_error_converts_into_anyhow() {
    fn fails() -> anyhow::Result<()> {
        Err(SchedulerError::CancellationRequested)?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::CancellationRequested)
    ));
}

#[test]
fn test_handler_clones_share_callback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let handler = ErrorHandler::new("pool", move |_| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    });
    let clone = handler.clone();

    handler.handle(SchedulerError::Timeout);
    clone.handle(SchedulerError::Shutdown);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(clone.component(), "pool");
}

#[test]
fn test_default_handler_is_logging_only() {
    let handler = ErrorHandler::default_handler();
    handler.handle(SchedulerError::Timeout);
    assert_eq!(handler.component(), "prometheus_sequencer");
}
