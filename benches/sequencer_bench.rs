//! Benchmarks for the sequencing primitives.
//!
//! Benchmarks cover:
//! - Gate open/close cycles
//! - SequentialScheduler throughput inline and on a thread pool
//! - ExclusiveResourcePool round trips

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_sequencer::core::{
    DisposableValue, ExclusiveResourcePool, Gate, SchedulerExt, SequentialScheduler, ThreadPoolScheduler,
};
use prometheus_sequencer::runtime::ImmediateScheduler;

// ============================================================================
// Gate
// ============================================================================

fn bench_gate_cycle(c: &mut Criterion) {
    let gate = Gate::new();
    c.bench_function("gate_open_close", |b| {
        b.iter(|| {
            black_box(gate.try_open());
            black_box(gate.try_close());
        });
    });
}

// ============================================================================
// SequentialScheduler
// ============================================================================

fn bench_sequential_inline(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_inline");

    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let sequential = SequentialScheduler::with_default_handler(Arc::new(ImmediateScheduler::new()));
            let counter = Arc::new(AtomicU64::new(0));
            b.iter(|| {
                for _ in 0..size {
                    let counter = Arc::clone(&counter);
                    sequential
                        .spawn(move || {
                            counter.fetch_add(1, Ordering::Relaxed);
                        })
                        .unwrap();
                }
            });
            black_box(counter.load(Ordering::Relaxed));
        });
    }

    group.finish();
}

fn bench_sequential_thread_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_thread_pool");
    let workers = ThreadPoolScheduler::with_worker_count(4).unwrap();

    for size in [100_u64, 1_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let sequential = SequentialScheduler::with_default_handler(Arc::new(workers.clone()));
            b.iter(|| {
                let (tx, rx) = crossbeam_channel::bounded(1);
                for i in 0..size {
                    let tx = tx.clone();
                    sequential
                        .spawn(move || {
                            if i == size - 1 {
                                tx.send(()).unwrap();
                            }
                        })
                        .unwrap();
                }
                rx.recv_timeout(Duration::from_secs(10)).unwrap();
            });
        });
    }

    group.finish();
    workers.shutdown();
}

// ============================================================================
// ExclusiveResourcePool
// ============================================================================

fn bench_pool_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("exclusive_pool_round_trip");

    for slots in [1_usize, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(slots), &slots, |b, &slots| {
            let pool = ExclusiveResourcePool::new(|| DisposableValue::plain(0_u64), slots).unwrap();
            b.iter(|| {
                let ticket = pool.schedule(|value| **value += 1).unwrap();
                ticket.wait(Duration::from_secs(10)).unwrap();
            });
            pool.dispose();
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_gate_cycle,
    bench_sequential_inline,
    bench_sequential_thread_pool,
    bench_pool_round_trip
);
criterion_main!(benches);
