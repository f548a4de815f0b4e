//! # Tapioca pool: bounded portion buffer plus a cooking admission gate.
//!
//! Tokens represent cooked tapioca portions. The toppings stage consumes
//! them, cooking batches replenish them, and the pool caps how many batches
//! may cook at once so the expensive operation stays bounded even when every
//! cooking worker notices low stock at the same time.
//!
//! ```text
//!  cooking batches ──(3 portions each)──►  ┌──────────────┐
//!        ▲  admission: CAS slot < 3        │ portion queue │──► toppings
//!        └── tick sees len <= 5            └──────────────┘
//! ```
//!
//! Portions are consumed before the stage outcome is known and are never
//! refunded on rework or failure; that mirrors real ingredient consumption.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::queue::BoundedQueue;

/// Ceiling on simultaneously cooking batches.
pub const MAX_CONCURRENT_COOKING: u32 = 3;
/// Stock level at or below which a new batch is started.
pub const LOW_STOCK_THRESHOLD: usize = 5;
/// Portions seeded at startup, clamped by the pool capacity.
pub const INITIAL_PORTIONS: usize = 10;
/// Portions yielded by one successful batch.
pub const PORTIONS_PER_BATCH: usize = 3;

/// Shared tapioca portion pool.
#[derive(Debug)]
pub struct TapiocaPool {
    portions: BoundedQueue<()>,
    cooking: AtomicU32,
}

impl TapiocaPool {
    /// Creates the pool and seeds the initial portions. Seeding is
    /// best-effort: with a capacity below the initial stock the excess
    /// enqueues quietly fail.
    pub fn new(capacity: usize) -> Self {
        let portions = BoundedQueue::new("tapioca", capacity);
        for _ in 0..INITIAL_PORTIONS {
            let _ = portions.try_enqueue(());
        }
        Self {
            portions,
            cooking: AtomicU32::new(0),
        }
    }

    /// Portions currently in stock.
    pub fn portions(&self) -> usize {
        self.portions.len()
    }

    pub fn capacity(&self) -> usize {
        self.portions.capacity()
    }

    pub fn is_low(&self) -> bool {
        self.portions() <= LOW_STOCK_THRESHOLD
    }

    /// Batches cooking right now.
    pub fn active_batches(&self) -> u32 {
        self.cooking.load(Ordering::Acquire)
    }

    /// Claims a cooking slot. Spins on compare-exchange so the ceiling holds
    /// under races between cooking workers; `false` when all slots are busy.
    pub fn try_begin_batch(&self) -> bool {
        let mut current = self.cooking.load(Ordering::Acquire);
        loop {
            if current >= MAX_CONCURRENT_COOKING {
                return false;
            }
            match self.cooking.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Releases a cooking slot. Must pair with a successful
    /// [`try_begin_batch`](Self::try_begin_batch).
    pub fn finish_batch(&self) {
        self.cooking.fetch_sub(1, Ordering::AcqRel);
    }

    /// Adds one cooked portion; `false` when the pool is full.
    pub fn add_portion(&self) -> bool {
        self.portions.try_enqueue(()).is_ok()
    }

    /// Takes up to `count` portions, best-effort, and returns how many were
    /// actually taken. Callers that need all-or-nothing check
    /// [`portions`](Self::portions) first and retry later.
    pub fn take(&self, count: usize) -> usize {
        let mut taken = 0;
        for _ in 0..count {
            if self.portions.try_dequeue().is_some() {
                taken += 1;
            }
        }
        taken
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_initial_stock_clamped_to_capacity() {
        let pool = TapiocaPool::new(15);
        assert_eq!(pool.portions(), INITIAL_PORTIONS);

        let small = TapiocaPool::new(4);
        assert_eq!(small.portions(), 4);
        assert_eq!(small.capacity(), 4);
    }

    #[test]
    fn cooking_gate_enforces_the_ceiling() {
        let pool = TapiocaPool::new(15);
        assert!(pool.try_begin_batch());
        assert!(pool.try_begin_batch());
        assert!(pool.try_begin_batch());
        assert_eq!(pool.active_batches(), MAX_CONCURRENT_COOKING);
        assert!(!pool.try_begin_batch());

        pool.finish_batch();
        assert!(pool.try_begin_batch());
        assert_eq!(pool.active_batches(), MAX_CONCURRENT_COOKING);
    }

    #[test]
    fn take_is_best_effort() {
        let pool = TapiocaPool::new(15);
        assert_eq!(pool.take(3), 3);
        assert_eq!(pool.portions(), INITIAL_PORTIONS - 3);
        assert_eq!(pool.take(100), INITIAL_PORTIONS - 3);
        assert_eq!(pool.portions(), 0);
        assert_eq!(pool.take(1), 0);
    }

    #[test]
    fn add_portion_respects_capacity() {
        let pool = TapiocaPool::new(INITIAL_PORTIONS);
        assert!(!pool.add_portion());
        pool.take(1);
        assert!(pool.add_portion());
        assert_eq!(pool.portions(), INITIAL_PORTIONS);
    }

    #[test]
    fn low_stock_threshold() {
        let pool = TapiocaPool::new(15);
        assert!(!pool.is_low());
        pool.take(INITIAL_PORTIONS - LOW_STOCK_THRESHOLD);
        assert!(pool.is_low());
    }
}
