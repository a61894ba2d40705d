//! Timer thread releasing delayed jobs to the worker channel.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::sequential::WorkItem;

struct TimerEntry {
    due: Instant,
    seq: u64,
    job: WorkItem,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed: BinaryHeap is a max-heap and the earliest entry must surface first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    shutdown: bool,
}

pub(super) struct Timer {
    queue: Mutex<TimerQueue>,
    wake: Condvar,
}

impl Timer {
    pub(super) fn start(name: String, ready: Sender<WorkItem>) -> std::io::Result<(Arc<Self>, JoinHandle<()>)> {
        let timer = Arc::new(Self {
            queue: Mutex::new(TimerQueue::default()),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&timer);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker.run(&ready))?;
        Ok((timer, handle))
    }

    pub(super) fn push(&self, due: Instant, job: WorkItem) -> bool {
        let mut queue = self.queue.lock();
        if queue.shutdown {
            return false;
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(TimerEntry { due, seq, job });
        drop(queue);
        self.wake.notify_one();
        true
    }

    pub(super) fn shutdown(&self) {
        let mut queue = self.queue.lock();
        queue.shutdown = true;
        let abandoned = std::mem::take(&mut queue.heap);
        drop(queue);
        self.wake.notify_all();
        // Dropped outside the lock: job destructors may schedule again.
        drop(abandoned);
    }

    fn run(&self, ready: &Sender<WorkItem>) {
        let mut queue = self.queue.lock();
        loop {
            if queue.shutdown {
                break;
            }
            let Some(due) = queue.heap.peek().map(|entry| entry.due) else {
                self.wake.wait(&mut queue);
                continue;
            };
            if due > Instant::now() {
                self.wake.wait_until(&mut queue, due);
                continue;
            }
            if let Some(entry) = queue.heap.pop() {
                if ready.send(entry.job).is_err() {
                    break;
                }
            }
        }
        debug!("timer thread exiting");
    }
}
