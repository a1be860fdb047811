//! Timer queue for hosts
//!
//! A min-heap of deadlines with lazy cancellation: cancelling removes the
//! payload and leaves the heap entry behind, which is skipped when it
//! comes up.

use mapscript_core::{IdGenerator, Tick, TimerId};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Pending timers ordered by deadline, then by scheduling order
pub struct TimerQueue<T> {
    heap: BinaryHeap<Reverse<(Tick, TimerId)>>,
    pending: HashMap<TimerId, T>,
    ids: IdGenerator<TimerId>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            ids: IdGenerator::new(),
        }
    }

    pub fn schedule(&mut self, at: Tick, item: T) -> TimerId {
        let id = self.ids.next_id();
        self.heap.push(Reverse((at, id)));
        self.pending.insert(id, item);
        id
    }

    /// Remove a timer that has not fired yet
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.pending.remove(&id)
    }

    /// Earliest timer due at or before `now`
    pub fn pop_due(&mut self, now: Tick) -> Option<(TimerId, T)> {
        while let Some(&Reverse((at, id))) = self.heap.peek() {
            if at > now {
                return None;
            }
            self.heap.pop();
            if let Some(item) = self.pending.remove(&id) {
                return Some((id, item));
            }
        }
        None
    }

    /// Deadline of the earliest live timer
    pub fn next_due(&mut self) -> Option<Tick> {
        while let Some(&Reverse((at, id))) = self.heap.peek() {
            if self.pending.contains_key(&id) {
                return Some(at);
            }
            self.heap.pop();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
