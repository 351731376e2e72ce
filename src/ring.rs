//! Bounded lock-free single-producer/single-consumer ring.
//!
//! The sole handoff between the gateway's reactor and its aggregation
//! thread. Full means the producer drops, never blocks and never overwrites;
//! empty means the consumer backs off. One slot is kept unused so full and
//! empty states stay distinguishable.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Ring<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// One thread writes slots behind `tail`, one thread reads behind `head`; the
// release/acquire pair on the indices publishes slot contents between them.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Ring holding up to `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        let slots: Vec<UnsafeCell<Option<T>>> =
            (0..capacity + 1).map(|_| UnsafeCell::new(None)).collect();
        Self {
            slots: slots.into_boxed_slice(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Producer side. Returns false when full; the entry is discarded.
    pub fn push(&self, v: T) -> bool {
        let t = self.tail.load(Ordering::Relaxed);
        let next = (t + 1) % self.slots.len();
        if next == self.head.load(Ordering::Acquire) {
            return false;
        }
        // Slot `t` is invisible to the consumer until the tail store below.
        unsafe { *self.slots[t].get() = Some(v) };
        self.tail.store(next, Ordering::Release);
        true
    }

    /// Consumer side. Returns `None` when empty.
    pub fn pop(&self) -> Option<T> {
        let h = self.head.load(Ordering::Relaxed);
        if h == self.tail.load(Ordering::Acquire) {
            return None;
        }
        let v = unsafe { (*self.slots[h].get()).take() };
        self.head.store((h + 1) % self.slots.len(), Ordering::Release);
        v
    }

    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Entries currently queued. Approximate under concurrent use.
    pub fn len(&self) -> usize {
        let h = self.head.load(Ordering::Acquire);
        let t = self.tail.load(Ordering::Acquire);
        (t + self.slots.len() - h) % self.slots.len()
    }
}
