//! # Order emitters: stochastic sources feeding the ingress queue.
//!
//! Two variants share one loop: sample an inter-arrival gap from a floored
//! normal, sleep it off (cancellable), synthesize an order, publish
//! `OrderGenerated`, then try the ingress enqueue. A full ingress queue is
//! the backpressure boundary of the whole pipeline: the emitter drops the
//! order rather than block, and the drop is booked as a terminal failure so
//! the ledger stays balanced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EmitterConfig;
use crate::error::WorkerError;
use crate::events::{Bus, Event, EventKind};
use crate::order::{Complexity, CupSize, Order, OrderSequence};
use crate::queue::{BoundedQueue, QueueFull};
use crate::rng::{RngService, RngStream};
use crate::worker::{sleep_cancellable, Worker};

/// Relative popularity of the menu families.
const COMPLEXITY_WEIGHTS: [(Complexity, f64); 3] = [
    (Complexity::MilkTea, 0.5),
    (Complexity::CoffeeWithTapioca, 0.3),
    (Complexity::SpecialMenu, 0.2),
];

const SIZES: [CupSize; 3] = [CupSize::Small, CupSize::Medium, CupSize::Large];

/// Emitter variant; fixes the group attributes and the interval floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterKind {
    Regular,
    Group,
}

impl EmitterKind {
    pub fn label(&self) -> &'static str {
        match self {
            EmitterKind::Regular => "regular-emitter",
            EmitterKind::Group => "group-emitter",
        }
    }

    /// Lower bound on the sampled inter-arrival gap.
    fn interval_floor(&self) -> f64 {
        match self {
            EmitterKind::Regular => 0.5,
            EmitterKind::Group => 1.0,
        }
    }
}

/// A single order source.
pub struct Emitter {
    name: String,
    kind: EmitterKind,
    running: AtomicBool,
    intervals: EmitterConfig,
    ids: Arc<OrderSequence>,
    ingress: Arc<BoundedQueue<Order>>,
    bus: Bus,
    rng: Arc<RngService>,
}

impl Emitter {
    pub fn new(
        kind: EmitterKind,
        index: usize,
        intervals: EmitterConfig,
        ids: Arc<OrderSequence>,
        ingress: Arc<BoundedQueue<Order>>,
        bus: Bus,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            name: format!("{}-{index}", kind.label()),
            kind,
            running: AtomicBool::new(true),
            intervals,
            ids,
            ingress,
            bus,
            rng,
        }
    }

    fn next_gap(&self, rng: &mut RngStream) -> Duration {
        let (mean, dev) = match self.kind {
            EmitterKind::Regular => (
                self.intervals.regular_order_interval_mean,
                self.intervals.regular_order_interval_deviation,
            ),
            EmitterKind::Group => (
                self.intervals.group_order_interval_mean,
                self.intervals.group_order_interval_deviation,
            ),
        };
        let gap = rng.normal(mean, dev).max(self.kind.interval_floor());
        Duration::from_secs_f64(gap)
    }

    fn synthesize(&self, rng: &mut RngStream) -> Order {
        let complexity = *rng
            .weighted_choice(&COMPLEXITY_WEIGHTS)
            .unwrap_or(&Complexity::MilkTea);
        let size = *rng.choice(&SIZES).unwrap_or(&CupSize::Medium);
        let is_group = self.kind == EmitterKind::Group;
        Order {
            id: self.ids.next_id(),
            complexity,
            size,
            toppings_count: rng.int_range(
                self.intervals.min_toppings_per_order as i64,
                self.intervals.max_toppings_per_order as i64,
            ) as u8,
            is_group,
            quantity: if is_group {
                rng.int_range(2, 5) as u8
            } else {
                1
            },
            student_discount: is_group && rng.bernoulli(0.5),
            created_at: Instant::now(),
        }
    }
}

#[async_trait]
impl Worker for Emitter {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkerError> {
        let mut rng = self.rng.stream();
        loop {
            if !self.running.load(Ordering::Acquire) || ctx.is_cancelled() {
                return Ok(());
            }
            if !sleep_cancellable(&ctx, self.next_gap(&mut rng)).await {
                return Ok(());
            }
            if !self.running.load(Ordering::Acquire) {
                return Ok(());
            }

            let order = self.synthesize(&mut rng);
            debug!(
                emitter = %self.name,
                order = %order.id,
                complexity = order.complexity.label(),
                size = order.size.label(),
                quantity = order.quantity,
                "order generated"
            );
            // Published before the enqueue so the ledger registers the
            // order ahead of any downstream outcome.
            self.bus
                .publish(Event::now(EventKind::OrderGenerated).with_order(order.clone()));

            if let Err(QueueFull(rejected)) = self.ingress.try_enqueue(order) {
                warn!(
                    emitter = %self.name,
                    order = %rejected.id,
                    queue = self.ingress.name(),
                    depth = self.ingress.len(),
                    "failed to enqueue order, ingress queue full; dropping"
                );
                self.bus
                    .publish(Event::now(EventKind::OrderFailed).with_order_id(rejected.id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;

    fn fast_intervals() -> EmitterConfig {
        EmitterConfig {
            regular_order_interval_mean: 0.1,
            regular_order_interval_deviation: 0.0,
            group_order_interval_mean: 0.1,
            group_order_interval_deviation: 0.0,
            ..EmitterConfig::default()
        }
    }

    async fn run_one(kind: EmitterKind) -> (Arc<BoundedQueue<Order>>, Vec<Event>) {
        let ingress = Arc::new(BoundedQueue::new("orders", 35));
        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let emitter = Arc::new(Emitter::new(
            kind,
            0,
            fast_intervals(),
            Arc::new(OrderSequence::new()),
            ingress.clone(),
            bus,
            Arc::new(RngService::new(Some(23))),
        ));

        let ctx = CancellationToken::new();
        let task = tokio::spawn({
            let emitter = emitter.clone();
            let ctx = ctx.clone();
            async move { emitter.run(ctx).await }
        });
        // The interval floor makes the first emission land at >= 0.5s
        // (1.0s for groups); wait long enough for at least one.
        time::timeout(Duration::from_secs(5), async {
            while ingress.is_empty() {
                time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("emitter must produce at least one order");
        emitter.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (ingress, events)
    }

    #[tokio::test]
    async fn regular_orders_are_single_without_discount() {
        let (ingress, events) = run_one(EmitterKind::Regular).await;
        assert_eq!(events[0].kind, EventKind::OrderGenerated);

        let order = ingress.try_dequeue().expect("one order queued");
        assert!(!order.is_group);
        assert_eq!(order.quantity, 1);
        assert!(!order.student_discount);
        assert!(order.toppings_count <= 3);
    }

    #[tokio::test]
    async fn group_orders_carry_group_quantities() {
        let (ingress, events) = run_one(EmitterKind::Group).await;
        assert!(events
            .iter()
            .any(|e| e.kind == EventKind::OrderGenerated && e.order.is_some()));

        let order = ingress.try_dequeue().expect("one order queued");
        assert!(order.is_group);
        assert!((2..=5).contains(&order.quantity));
    }

    #[tokio::test]
    async fn full_ingress_queue_drops_and_reports_the_order() {
        let ingress = Arc::new(BoundedQueue::new("orders", 1));
        ingress
            .try_enqueue(Order {
                id: crate::order::OrderId(999),
                complexity: Complexity::MilkTea,
                size: CupSize::Small,
                toppings_count: 0,
                is_group: false,
                quantity: 1,
                student_discount: false,
                created_at: Instant::now(),
            })
            .expect("room");

        let bus = Bus::new(256);
        let mut rx = bus.subscribe();
        let emitter = Arc::new(Emitter::new(
            EmitterKind::Regular,
            0,
            fast_intervals(),
            Arc::new(OrderSequence::new()),
            ingress.clone(),
            bus,
            Arc::new(RngService::new(Some(29))),
        ));

        let ctx = CancellationToken::new();
        let task = tokio::spawn({
            let emitter = emitter.clone();
            let ctx = ctx.clone();
            async move { emitter.run(ctx).await }
        });
        time::sleep(Duration::from_millis(700)).await;
        emitter.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");

        let mut generated = 0;
        let mut dropped = 0;
        while let Ok(event) = rx.try_recv() {
            match event.kind {
                EventKind::OrderGenerated => generated += 1,
                EventKind::OrderFailed => dropped += 1,
                _ => {}
            }
        }
        assert!(generated >= 1);
        assert_eq!(dropped, generated, "every order bounced off the full queue");
        assert_eq!(ingress.len(), 1);
    }
}
