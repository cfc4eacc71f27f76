//! Single-producer/single-consumer bounded ring.
//!
//! Shared building block between the submission and reaping sides of every
//! AIO backend. Capacity must be a power of two so the index-to-slot
//! mapping collapses to a bitwise AND.
//!
//! # Safety contract
//!
//! Exactly one thread may call [`SpscRing::push`] and exactly one thread
//! (possibly a different one) may call [`SpscRing::pop`]. Concurrent calls
//! to `push` from two threads, or to `pop` from two threads, are undefined
//! behavior from a correctness standpoint (the ring will not panic or
//! corrupt memory beyond its own slots, but pushed/popped values may be
//! lost or duplicated).
//!
//! # Ordering
//!
//! The producer loads `read_index` with `Acquire` before overwriting a slot,
//! then publishes `write_index` with `Release`. The consumer loads
//! `write_index` with `Acquire` before reading a slot, then publishes
//! `read_index` with `Release`. Narrowed from a multi-producer CAS-based
//! ring to a single producer — no CAS needed, since the producer owns
//! `write_index` outright.

use core::cell::UnsafeCell;
use core::fmt;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Error returned when the ring has no room for another item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full;

impl fmt::Display for Full {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring full")
    }
}

/// Error returned when the ring has nothing to pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring empty")
    }
}

/// Errors returned when constructing a ring with an invalid capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpscRingError {
    /// Capacity was below the minimum of 2.
    TooSmall,
    /// Capacity was not a power of two.
    NotPowerOfTwo,
}

impl fmt::Display for SpscRingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpscRingError::TooSmall => write!(f, "ring capacity must be at least 2"),
            SpscRingError::NotPowerOfTwo => write!(f, "ring capacity must be a power of two"),
        }
    }
}

impl std::error::Error for SpscRingError {}

#[repr(align(64))]
struct AlignedIndex(AtomicUsize);

/// A lock-free bounded SPSC queue.
pub struct SpscRing<T> {
    write_index: AlignedIndex,
    read_index: AlignedIndex,
    mask: usize,
    capacity: usize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

// Safety: the push/pop contract above ensures only one thread ever writes
// or reads a given slot at a time; `T: Send` is sufficient to move values
// across the producer/consumer thread boundary.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// Create a new ring. `capacity` must be a power of two and at least 2.
    pub fn new(capacity: usize) -> Result<Self, SpscRingError> {
        if capacity < 2 {
            return Err(SpscRingError::TooSmall);
        }
        if capacity & (capacity - 1) != 0 {
            return Err(SpscRingError::NotPowerOfTwo);
        }

        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        Ok(Self {
            write_index: AlignedIndex(AtomicUsize::new(0)),
            read_index: AlignedIndex(AtomicUsize::new(0)),
            mask: capacity - 1,
            capacity,
            slots: slots.into_boxed_slice(),
        })
    }

    /// Ring capacity (power of two).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently occupying the ring.
    pub fn len(&self) -> usize {
        let w = self.write_index.0.load(Ordering::Acquire);
        let r = self.read_index.0.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    /// Whether the ring holds no items.
    pub fn empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer-only: push an item. Fails with [`Full`] if occupancy equals
    /// capacity; the item is returned via `Err` so the caller doesn't lose it.
    pub fn push(&self, item: T) -> Result<(), (T, Full)> {
        let w = self.write_index.0.load(Ordering::Relaxed);
        let r = self.read_index.0.load(Ordering::Acquire);

        if w.wrapping_sub(r) >= self.capacity {
            return Err((item, Full));
        }

        let idx = w & self.mask;
        unsafe {
            (*self.slots[idx].get()).write(item);
        }

        // Double-check fullness didn't change underneath us concurrently
        // with the consumer advancing read_index; this can only ever make
        // more room, never less, since there is a single producer, so the
        // slot write above is always valid once we got past the check.
        self.write_index.0.store(w.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer-only: pop the oldest item, or [`Empty`] if none is available.
    pub fn pop(&self) -> Result<T, Empty> {
        let r = self.read_index.0.load(Ordering::Relaxed);
        let w = self.write_index.0.load(Ordering::Acquire);

        if r == w {
            return Err(Empty);
        }

        let idx = r & self.mask;
        let item = unsafe { (*self.slots[idx].get()).assume_init_read() };

        self.read_index.0.store(r.wrapping_add(1), Ordering::Release);
        Ok(item)
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Drain any remaining initialized items so `T`'s destructor runs.
        while self.pop().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rejects_bad_capacity() {
        assert_eq!(SpscRing::<u32>::new(0).unwrap_err(), SpscRingError::TooSmall);
        assert_eq!(SpscRing::<u32>::new(1).unwrap_err(), SpscRingError::TooSmall);
        assert_eq!(SpscRing::<u32>::new(3).unwrap_err(), SpscRingError::NotPowerOfTwo);
        assert_eq!(SpscRing::<u32>::new(5).unwrap_err(), SpscRingError::NotPowerOfTwo);
        assert!(SpscRing::<u32>::new(2).is_ok());
    }

    #[test]
    fn push_pop_single_thread() {
        let ring = SpscRing::new(4).unwrap();
        assert!(ring.empty());
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pop().unwrap(), 1);
        assert_eq!(ring.pop().unwrap(), 2);
        assert!(ring.pop().is_err());
    }

    #[test]
    fn full_when_at_capacity() {
        let ring = SpscRing::new(2).unwrap();
        ring.push(1).unwrap();
        ring.push(2).unwrap();
        let (item, _) = ring.push(3).unwrap_err();
        assert_eq!(item, 3);
    }

    #[test]
    fn wrap_around() {
        let ring = SpscRing::new(4).unwrap();
        for round in 0..4 {
            for i in 0..4 {
                ring.push(round * 10 + i).unwrap();
            }
            for i in 0..4 {
                assert_eq!(ring.pop().unwrap(), round * 10 + i);
            }
            assert!(ring.empty());
        }
    }

    #[test]
    fn concurrent_producer_consumer_preserves_order() {
        const N: usize = 200_000;
        let ring = Arc::new(SpscRing::<usize>::new(1024).unwrap());

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut i = 0;
                while i < N {
                    if ring.push(i).is_ok() {
                        i += 1;
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };

        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut out = Vec::with_capacity(N);
                while out.len() < N {
                    match ring.pop() {
                        Ok(v) => out.push(v),
                        Err(_) => thread::yield_now(),
                    }
                }
                out
            })
        };

        producer.join().unwrap();
        let out = consumer.join().unwrap();
        assert_eq!(out.len(), N);
        assert!(out.windows(2).all(|w| w[1] == w[0] + 1));
        assert!(ring.empty());
    }
}
