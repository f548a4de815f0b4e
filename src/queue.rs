//! # Bounded multi-producer multi-consumer FIFO queue.
//!
//! [`BoundedQueue`] is the backpressure primitive of the pipeline:
//!
//! - [`BoundedQueue::try_enqueue`] never blocks; a full queue hands the item
//!   back to the producer via [`QueueFull`].
//! - [`BoundedQueue::poll_dequeue`] waits a short bounded interval for an
//!   item, so consumer loops stay responsive to the cancellation token.
//! - [`BoundedQueue::len`] is a lock-free instantaneous snapshot used by the
//!   progress monitor and the bottleneck analysis.
//!
//! Ordering is FIFO within the queue. Nothing is promised across producers
//! beyond that, and nothing about fairness between consumers: whichever
//! consumer wins the wakeup takes the front item.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time;

/// Rejected enqueue; carries the item back to the producer.
#[derive(Debug)]
pub struct QueueFull<T>(pub T);

/// Fixed-capacity FIFO, safe for many producers and many consumers.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    // Mirror of items.len(), readable without the lock.
    depth: AtomicUsize,
    available: Notify,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue with the given capacity. Capacity zero is clamped to
    /// one so the queue can always make progress.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
            depth: AtomicUsize::new(0),
            available: Notify::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instantaneous item count.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Inserts at the tail if there is room, otherwise returns the item
    /// inside [`QueueFull`]. Never blocks.
    pub fn try_enqueue(&self, item: T) -> Result<(), QueueFull<T>> {
        {
            let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            if items.len() >= self.capacity {
                return Err(QueueFull(item));
            }
            items.push_back(item);
            self.depth.store(items.len(), Ordering::Relaxed);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Removes and returns the front item, if any. Never blocks.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let item = items.pop_front();
        self.depth.store(items.len(), Ordering::Relaxed);
        item
    }

    /// Returns the front item if one arrives within `wait`, else `None`.
    ///
    /// This is a short poll, not a blocking receive: consumers call it with
    /// a ~100 ms wait so their loops can observe shutdown promptly. A missed
    /// wakeup under consumer contention surfaces as one empty poll, which
    /// the caller's idle backoff absorbs.
    pub async fn poll_dequeue(&self, wait: Duration) -> Option<T> {
        if let Some(item) = self.try_dequeue() {
            return Some(item);
        }
        let _ = time::timeout(wait, self.available.notified()).await;
        self.try_dequeue()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn keeps_fifo_order() {
        let q = BoundedQueue::new("orders", 4);
        for i in 0..4 {
            q.try_enqueue(i).expect("room");
        }
        for i in 0..4 {
            assert_eq!(q.try_dequeue(), Some(i));
        }
        assert!(q.is_empty());
    }

    #[test]
    fn full_queue_hands_the_item_back() {
        let q = BoundedQueue::new("orders", 2);
        q.try_enqueue("a").expect("room");
        q.try_enqueue("b").expect("room");
        assert!(q.is_full());
        let QueueFull(rejected) = q.try_enqueue("c").expect_err("must be full");
        assert_eq!(rejected, "c");
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn capacity_one_never_holds_two_items() {
        let q = BoundedQueue::new("slot", 1);
        q.try_enqueue(1).expect("room");
        assert!(q.try_enqueue(2).is_err());
        assert_eq!(q.try_dequeue(), Some(1));
        q.try_enqueue(2).expect("room again");
        assert_eq!(q.len(), 1);
    }

    #[tokio::test]
    async fn poll_dequeue_times_out_on_empty() {
        let q: BoundedQueue<u32> = BoundedQueue::new("orders", 4);
        assert_eq!(q.poll_dequeue(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn poll_dequeue_wakes_on_enqueue() {
        let q = Arc::new(BoundedQueue::new("orders", 4));
        let producer = {
            let q = q.clone();
            tokio::spawn(async move {
                time::sleep(Duration::from_millis(20)).await;
                q.try_enqueue(7u32).expect("room");
            })
        };
        let got = q.poll_dequeue(Duration::from_millis(500)).await;
        assert_eq!(got, Some(7));
        producer.await.expect("producer task");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_and_consumers_conserve_items() {
        const PER_PRODUCER: usize = 200;
        let q = Arc::new(BoundedQueue::new("orders", 8));
        let consumed = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for p in 0..3u32 {
            let q = q.clone();
            tasks.push(tokio::spawn(async move {
                let mut sent = 0;
                let mut next = p;
                while sent < PER_PRODUCER {
                    match q.try_enqueue(next) {
                        Ok(()) => {
                            sent += 1;
                            next += 3;
                        }
                        Err(QueueFull(_)) => tokio::task::yield_now().await,
                    }
                    assert!(q.len() <= q.capacity());
                }
            }));
        }
        for _ in 0..2 {
            let q = q.clone();
            let consumed = consumed.clone();
            tasks.push(tokio::spawn(async move {
                while consumed.load(Ordering::Relaxed) < 3 * PER_PRODUCER {
                    if q.poll_dequeue(Duration::from_millis(5)).await.is_some() {
                        consumed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }
        for t in tasks {
            t.await.expect("task");
        }
        assert_eq!(consumed.load(Ordering::Relaxed), 3 * PER_PRODUCER);
        assert!(q.is_empty());
    }
}
