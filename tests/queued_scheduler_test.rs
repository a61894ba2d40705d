//! Integration tests for `QueuedScheduler` under concurrent toggling.

use parking_lot::Mutex;
use prometheus_sequencer::core::{ErrorHandler, QueuedScheduler, SchedulerExt, ThreadPoolScheduler};
use prometheus_sequencer::runtime::ImmediateScheduler;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn test_random_toggling_runs_everything_exactly_once() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 250;

    let workers = ThreadPoolScheduler::with_worker_count(4).unwrap();
    let queued = QueuedScheduler::new(Arc::new(workers.clone()), ErrorHandler::logging("test"));
    let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..PRODUCERS * PER_PRODUCER).map(|_| AtomicUsize::new(0)).collect());

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let queued = queued.clone();
            let counts = Arc::clone(&counts);
            scope.spawn(move || {
                let mut rng = rand::rng();
                for i in 0..PER_PRODUCER {
                    if rng.random_bool(0.1) {
                        queued.set_enabled(rng.random_bool(0.5));
                    }
                    let counts = Arc::clone(&counts);
                    let id = producer * PER_PRODUCER + i;
                    queued
                        .spawn(move || {
                            counts[id].fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            });
        }
    });

    queued.start();

    let total = || counts.iter().map(|c| c.load(Ordering::SeqCst)).sum::<usize>();
    assert!(wait_until(Duration::from_secs(10), || total() == PRODUCERS * PER_PRODUCER));
    thread::sleep(Duration::from_millis(50));
    assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    assert!(queued.is_empty());

    workers.shutdown();
}

#[test]
fn test_pause_holds_work_and_resume_releases_in_order() {
    let queued = QueuedScheduler::new(Arc::new(ImmediateScheduler::new()), ErrorHandler::logging("test"));
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = Arc::clone(&order);
        queued.spawn(move || order.lock().push(i)).unwrap();
    }
    assert_eq!(queued.len(), 3);
    assert!(order.lock().is_empty());

    queued.start();
    assert_eq!(*order.lock(), vec![0, 1, 2]);
    assert!(queued.is_direct());

    queued.stop();
    assert!(!queued.is_direct());
    let held = Arc::clone(&order);
    queued.spawn(move || held.lock().push(3)).unwrap();
    assert_eq!(order.lock().len(), 3);

    queued.start();
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_cancelled_backlog_item_is_not_forwarded() {
    let queued = QueuedScheduler::new(Arc::new(ImmediateScheduler::new()), ErrorHandler::logging("test"));
    let ran = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let ran = Arc::clone(&ran);
            queued.spawn(move || ran.lock().push(i)).unwrap()
        })
        .collect();
    handles[0].cancel();

    queued.start();
    assert_eq!(*ran.lock(), vec![1, 2]);
}

#[test]
fn test_stop_racing_a_drain_never_leaves_direct_mode_on() {
    const ROUNDS: usize = 50;
    const BACKLOG: usize = 8;

    let workers = ThreadPoolScheduler::with_worker_count(4).unwrap();
    let queued = QueuedScheduler::new(Arc::new(workers.clone()), ErrorHandler::logging("test"));
    let ran = Arc::new(AtomicUsize::new(0));
    let mut submitted = 0;

    for _ in 0..ROUNDS {
        for _ in 0..BACKLOG {
            let ran = Arc::clone(&ran);
            queued.spawn(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            submitted += 1;
        }

        thread::scope(|scope| {
            let stopper = queued.clone();
            scope.spawn(move || stopper.stop());
            queued.start();
        });
        queued.stop();
        thread::sleep(Duration::from_millis(10));

        assert!(!queued.enabled());
        assert!(!queued.is_direct());

        // Disabled means held, even right after a drain loop wound down.
        let before = queued.len();
        let ran_clone = Arc::clone(&ran);
        queued.spawn(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        submitted += 1;
        assert_eq!(queued.len(), before + 1);
    }

    queued.start();
    assert!(wait_until(Duration::from_secs(10), || ran.load(Ordering::SeqCst) == submitted));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(ran.load(Ordering::SeqCst), submitted);

    workers.shutdown();
}
