//! Time-ordered queue of deferred actions.
//!
//! [`DeferredQueue`] is a min-heap keyed by trigger time, with insertion
//! order breaking ties. A domain drains it once per tick with
//! [`take_due`](DeferredQueue::take_due), which removes every entry due at
//! the tick's time in one step. Entries scheduled while that batch executes
//! wait for the next drain even if they are already due, so a drain always
//! terminates.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ember_core::SimTime;

struct Scheduled<A> {
    time: SimTime,
    seq: u64,
    action: A,
}

// Reversed so that `BinaryHeap` (a max-heap) pops the earliest entry first.
impl<A> Ord for Scheduled<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<A> PartialOrd for Scheduled<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> PartialEq for Scheduled<A> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<A> Eq for Scheduled<A> {}

/// Min-heap of actions keyed by simulation time.
pub struct DeferredQueue<A> {
    heap: BinaryHeap<Scheduled<A>>,
    next_seq: u64,
}

impl<A> DeferredQueue<A> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Pending entries.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Trigger time of the earliest entry.
    pub fn next_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|s| s.time)
    }

    /// Schedule `action` at absolute time `time`.
    pub fn schedule_at(&mut self, time: SimTime, action: A) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { time, seq, action });
    }

    /// Remove and return every entry with trigger time `<= now`, in
    /// nondecreasing time order (insertion order among equal times).
    pub fn take_due(&mut self, now: SimTime) -> Vec<(SimTime, A)> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|s| s.time <= now) {
            if let Some(s) = self.heap.pop() {
                due.push((s.time, s.action));
            }
        }
        due
    }

    /// Drop every pending entry.
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

impl<A> Default for DeferredQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for DeferredQueue<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.heap.len())
            .field("next_time", &self.next_time())
            .finish()
    }
}
