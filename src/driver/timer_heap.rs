//! The timer heap.
//!
//! A 4-ary min-heap of `(deadline, order, signal)` entries. Ordering is
//! lexicographic: earlier deadline first, ties broken by insertion order
//! with the wraparound-safe [`Seq`] comparison.
//!
//! Abandoned timers are the interesting problem. A cancelled race leaves
//! its timeout signal in the heap with no listeners; with enough of
//! those the heap would be dominated by dead entries. Two culling
//! mechanisms keep it small: the driver lazily drops emptied entries
//! from the root before consulting the deadline, and once the heap holds
//! [`CULL_THRESHOLD`] entries every push probes a pseudo-random slot,
//! evicting it if its signal is empty and probing again.

use crate::signal::Signal;
use crate::time::Time;
use crate::util::{DetRng, Seq};

/// Heap fan-out. Four children per node keeps sift-down shallow while
/// the root keeps three children under the index scheme below.
const ARITY: usize = 4;

/// Heap size at which random culling starts probing on every push.
const CULL_THRESHOLD: usize = 32;

#[derive(Debug)]
struct Entry {
    when: Time,
    order: Seq,
    signal: Signal,
}

impl Entry {
    fn precedes(&self, other: &Self) -> bool {
        self.when < other.when || (self.when == other.when && self.order.precedes(other.order))
    }
}

/// Min-heap of pending time-triggered signals.
#[derive(Debug)]
pub(crate) struct TimerHeap {
    entries: Vec<Entry>,
    order: Seq,
    cull_rng: DetRng,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            order: Seq::ZERO,
            cull_rng: DetRng::new(0x1FED),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The earliest pending deadline.
    pub(crate) fn next_deadline(&self) -> Option<Time> {
        self.entries.first().map(|entry| entry.when)
    }

    /// Inserts a signal to be triggered at `when`, then runs the random
    /// cull policy.
    pub(crate) fn push(&mut self, when: Time, signal: Signal) {
        let order = self.order;
        self.order = self.order.next();
        self.entries.push(Entry {
            when,
            order,
            signal,
        });
        self.sift_up(self.entries.len() - 1);

        // When the heap is largish, check a random slot on each push; if
        // that entry's signal has no listeners, evict it and probe again.
        while self.entries.len() >= CULL_THRESHOLD {
            let pos = self.cull_rng.next_usize(self.entries.len());
            if !self.entries[pos].signal.empty() {
                break;
            }
            self.remove(pos);
        }
    }

    /// Removes and returns the root signal.
    ///
    /// # Panics
    ///
    /// Panics on an empty heap.
    pub(crate) fn pop(&mut self) -> Signal {
        assert!(!self.entries.is_empty(), "pop from an empty timer heap");
        self.remove(0).signal
    }

    /// Drops emptied entries from the root so `next_deadline` reflects a
    /// signal somebody still waits for.
    pub(crate) fn cull(&mut self) {
        while self
            .entries
            .first()
            .is_some_and(|entry| entry.signal.empty())
        {
            self.remove(0);
        }
    }

    /// Empties the heap, returning the signals in slot order. Used at
    /// teardown, where every remaining timer is triggered so its waiters
    /// wake and unwind.
    pub(crate) fn drain(&mut self) -> Vec<Signal> {
        self.entries.drain(..).map(|entry| entry.signal).collect()
    }

    fn parent(pos: usize) -> usize {
        pos / ARITY
    }

    fn first_child(pos: usize) -> usize {
        pos * ARITY + usize::from(pos == 0)
    }

    fn last_child(&self, pos: usize) -> usize {
        (pos * ARITY + ARITY).min(self.entries.len())
    }

    fn remove(&mut self, pos: usize) -> Entry {
        let last = self.entries.len() - 1;
        self.entries.swap(pos, last);
        let entry = self.entries.pop().expect("heap is nonempty");
        if pos < self.entries.len() {
            if pos > 0 && self.entries[pos].precedes(&self.entries[Self::parent(pos)]) {
                self.sift_up(pos);
            } else {
                self.sift_down(pos);
            }
        }
        entry
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos != 0 {
            let parent = Self::parent(pos);
            if !self.entries[pos].precedes(&self.entries[parent]) {
                break;
            }
            self.entries.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let mut smallest = pos;
            for child in Self::first_child(pos)..self.last_child(pos) {
                if self.entries[child].precedes(&self.entries[smallest]) {
                    smallest = child;
                }
            }
            if smallest == pos {
                break;
            }
            self.entries.swap(pos, smallest);
            pos = smallest;
        }
    }
}
