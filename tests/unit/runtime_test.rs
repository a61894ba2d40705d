//! Tests for the Tokio-backed scheduler

use prometheus_sequencer::core::{ErrorHandler, SchedulerExt, SequentialScheduler};
use prometheus_sequencer::runtime::TokioScheduler;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_scheduler_spawn() {
    let scheduler = TokioScheduler::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    scheduler
        .spawn(move || {
            tx.send(123).unwrap();
        })
        .unwrap();

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_scheduler_cancel_before_due() {
    let scheduler = TokioScheduler::new(tokio::runtime::Handle::current());
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);

    let handle = scheduler
        .spawn_after(Duration::from_millis(50), move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    handle.cancel();

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_scheduler_routes_panics() {
    let failures = Arc::new(AtomicUsize::new(0));
    let failures_clone = Arc::clone(&failures);
    let scheduler = TokioScheduler::new(tokio::runtime::Handle::current()).with_error_handler(ErrorHandler::new(
        "test",
        move |_| {
            failures_clone.fetch_add(1, Ordering::SeqCst);
        },
    ));

    scheduler.spawn(|| panic!("blocking task failed")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sequential_over_owned_runtime() {
    let scheduler = TokioScheduler::with_worker_threads(2).unwrap();
    let sequential = SequentialScheduler::with_default_handler(Arc::new(scheduler));
    let (tx, rx) = crossbeam_channel::unbounded();

    for i in 0..20 {
        let tx = tx.clone();
        sequential.spawn(move || tx.send(i).unwrap()).unwrap();
    }

    let seen: Vec<i32> = (0..20).map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
}
