//! Priority queue of dispatch-ready tasks, ordered (priority ascending,
//! arrival-sequence ascending) so critical-before-normal-before-low holds
//! and ties break FIFO. Bounded by `max_size`; a push past capacity returns
//! `queue_full` and leaves the queue unchanged.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::task::RankedTask;

pub const DEFAULT_MAX_SIZE: usize = 1000;

/// `BinaryHeap` is a max-heap; wrapping the sort key in `Reverse` turns
/// "smallest priority discriminant, smallest arrival-sequence" into "popped
/// first", matching `Priority`'s critical-is-strongest-and-smallest
/// ordering.
struct Entry {
    key: Reverse<(crate::priority::Priority, u64)>,
    task: RankedTask,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

pub struct RankedQueue {
    heap: Mutex<BinaryHeap<Entry>>,
    next_arrival_sequence: AtomicU64,
    max_size: usize,
}

impl RankedQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_arrival_sequence: AtomicU64::new(0),
            max_size,
        }
    }

    /// Assigns the next arrival-sequence and pushes. Returns `Err(())` —
    /// queue_full — without mutating the queue or consuming a sequence
    /// number when at capacity.
    pub fn push(&self, mut task: RankedTask) -> Result<(), RankedTask> {
        let mut heap = self.heap.lock();
        if heap.len() >= self.max_size {
            return Err(task);
        }
        let seq = self.next_arrival_sequence.fetch_add(1, Ordering::Relaxed);
        task.arrival_sequence = seq;
        let key = Reverse((task.priority, seq));
        heap.push(Entry { key, task });
        Ok(())
    }

    pub fn pop_best(&self) -> Option<RankedTask> {
        self.heap.lock().pop().map(|e| e.task)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
