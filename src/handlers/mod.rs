//! # Stage handlers: the worker pools draining the pipeline queues.
//!
//! Every handler follows the same loop: poll the input queue with a short
//! wait, idle briefly when it comes up empty, burn a sampled service time,
//! then branch probabilistically into advance / rework / fail. The variants
//! only differ in their branching and in how they touch the tapioca pool.
//!
//! Backpressure discipline: enqueues never block. A full downstream queue
//! fails the order at the current stage; a full input queue on a rework
//! re-entry does the same (an order may never silently vanish).

mod base_preparation;
mod packaging;
mod quality_control;
mod tapioca_cooking;
mod toppings;

pub use base_preparation::BasePreparation;
pub use packaging::Packaging;
pub use quality_control::QualityControl;
pub use tapioca_cooking::TapiocaCooking;
pub use toppings::Toppings;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::counters::StageCounters;
use crate::events::{Bus, Event, EventKind};
use crate::order::{Order, Stage};
use crate::queue::{BoundedQueue, QueueFull};

/// Plumbing shared by the order-consuming handlers: identity, stop flag,
/// counters, and the outcome bookkeeping every branch ends in.
pub(crate) struct StageIo {
    name: String,
    stage: Stage,
    running: AtomicBool,
    counters: Arc<StageCounters>,
    bus: Bus,
}

impl StageIo {
    pub(crate) fn new(stage: Stage, index: usize, counters: Arc<StageCounters>, bus: Bus) -> Self {
        Self {
            name: format!("{}-{index}", stage.label()),
            stage,
            running: AtomicBool::new(true),
            counters,
            bus,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn halt(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn should_exit(&self, ctx: &CancellationToken) -> bool {
        !self.running.load(Ordering::Acquire) || ctx.is_cancelled()
    }

    /// Hands the order to the next stage. A full downstream queue fails the
    /// order here: workers exert backpressure by failing, never by blocking.
    pub(crate) fn advance(&self, order: Order, downstream: &BoundedQueue<Order>) {
        let id = order.id;
        match downstream.try_enqueue(order) {
            Ok(()) => {
                self.counters.add_processed();
                debug!(handler = %self.name, order = %id, "stage complete");
                self.bus.publish(
                    Event::now(EventKind::OrderCompleted)
                        .with_order_id(id)
                        .with_stage(self.stage),
                );
            }
            Err(QueueFull(rejected)) => {
                self.fail(rejected, &format!("{} queue full", downstream.name()));
            }
        }
    }

    /// Terminal success; only packaging takes this path.
    pub(crate) fn complete(&self, order: Order) {
        self.counters.add_processed();
        self.bus.publish(
            Event::now(EventKind::OrderCompleted)
                .with_order_id(order.id)
                .with_stage(self.stage),
        );
    }

    /// Sends the order back to the tail of this stage's own input queue and
    /// books a rework event.
    pub(crate) fn rework(&self, order: Order, input: &BoundedQueue<Order>, reason: &str) {
        let id = order.id;
        match input.try_enqueue(order) {
            Ok(()) => {
                self.counters.add_reworked();
                debug!(handler = %self.name, order = %id, reason, "order sent back for rework");
                self.bus.publish(
                    Event::now(EventKind::OrderReworked)
                        .with_order_id(id)
                        .with_stage(self.stage),
                );
            }
            Err(QueueFull(rejected)) => {
                self.fail(rejected, &format!("{} queue full on rework", input.name()));
            }
        }
    }

    /// Re-enqueues without touching counters; used by retry/backoff branches
    /// that are not rework events. Falls back to failing when even the input
    /// queue has no room.
    pub(crate) fn put_back(&self, order: Order, input: &BoundedQueue<Order>) {
        if let Err(QueueFull(rejected)) = input.try_enqueue(order) {
            self.fail(rejected, &format!("{} queue full on retry", input.name()));
        }
    }

    /// Terminal failure at this stage.
    pub(crate) fn fail(&self, order: Order, reason: &str) {
        self.counters.add_failed();
        warn!(handler = %self.name, order = %order.id, reason, "order failed");
        self.bus.publish(
            Event::now(EventKind::OrderFailed)
                .with_order_id(order.id)
                .with_stage(self.stage),
        );
    }
}
