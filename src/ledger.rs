//! # Order ledger: the engine's single source of truth for order state.
//!
//! The ledger subscribes to the event bus and maintains the books:
//!
//! ```text
//!  emitters/handlers ──publish──► ┌─────┐
//!                                 │ Bus │
//!                                 └──┬──┘
//!                                subscribe
//!                                    ▼
//!            ┌───────────────────────────────────────────┐
//!            │ OrderLedger                               │
//!            │   generated counter                       │
//!            │   in-flight map (id → started order)      │
//!            │   completed / failed bags, rework counter │
//!            └───────────────────────────────────────────┘
//! ```
//!
//! Because every publisher shares one channel, the listener sees
//! `OrderGenerated` before any terminal event for the same id; the first
//! terminal event wins (the in-flight entry is removed exactly once), so an
//! order can never be completed or failed twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::order::{Order, OrderId, Stage};

/// An order inside the pipeline, stamped when its generation was observed.
#[derive(Debug, Clone)]
pub struct InFlightOrder {
    pub order: Order,
    pub started_at: Instant,
}

/// A finished order with its measured wall-clock processing time.
#[derive(Debug, Clone)]
pub struct CompletedOrder {
    pub order: Order,
    pub processing_time: Duration,
}

/// Concurrent bookkeeping for every order the emitters produced.
#[derive(Debug, Default)]
pub struct OrderLedger {
    generated: AtomicU64,
    reworks: AtomicU64,
    in_flight: DashMap<OrderId, InFlightOrder>,
    completed: Mutex<Vec<CompletedOrder>>,
    failed: Mutex<Vec<OrderId>>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns the background listener draining the given subscription.
    ///
    /// The handle is aborted by the engine once the post-shutdown drain
    /// window has passed.
    pub fn spawn_listener(
        self: std::sync::Arc<Self>,
        mut rx: broadcast::Receiver<Event>,
    ) -> JoinHandle<()> {
        let ledger = self;
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => ledger.apply(&event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "ledger lagged behind the event bus, counts may drift");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn apply(&self, event: &Event) {
        match event.kind {
            EventKind::OrderGenerated => {
                let Some(order) = event.order.clone() else {
                    warn!("generated event without an order payload");
                    return;
                };
                self.generated.fetch_add(1, Ordering::Relaxed);
                self.in_flight.insert(
                    order.id,
                    InFlightOrder {
                        order,
                        started_at: Instant::now(),
                    },
                );
            }
            EventKind::OrderCompleted if event.stage == Some(Stage::Packaging) => {
                let Some(id) = event.order_id else { return };
                match self.in_flight.remove(&id) {
                    Some((_, entry)) => {
                        let processing_time = entry.started_at.elapsed();
                        info!(
                            order = %id,
                            seconds = format!("{:.2}", processing_time.as_secs_f64()),
                            "order completed"
                        );
                        self.push_completed(CompletedOrder {
                            order: entry.order,
                            processing_time,
                        });
                    }
                    None => {
                        debug!(order = %id, "completion for an untracked order ignored");
                    }
                }
            }
            EventKind::OrderCompleted => {
                // Intermediate stage advancement; nothing to book.
            }
            EventKind::OrderFailed => {
                let Some(id) = event.order_id else { return };
                if self.in_flight.remove(&id).is_some() {
                    self.failed
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push(id);
                }
            }
            EventKind::OrderReworked => {
                self.reworks.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ShutdownRequested
            | EventKind::AllStoppedWithin
            | EventKind::GraceExceeded => {}
        }
    }

    fn push_completed(&self, entry: CompletedOrder) {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    pub fn reworks(&self) -> u64 {
        self.reworks.load(Ordering::Relaxed)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn completed_len(&self) -> usize {
        self.completed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Clones the completed bag out for the statistics snapshot.
    pub fn completed_orders(&self) -> Vec<CompletedOrder> {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::order::{Complexity, CupSize};

    fn sample_order(id: u64) -> Order {
        Order {
            id: OrderId(id),
            complexity: Complexity::MilkTea,
            size: CupSize::Small,
            toppings_count: 0,
            is_group: false,
            quantity: 1,
            student_discount: false,
            created_at: Instant::now(),
        }
    }

    #[test]
    fn generation_then_completion_moves_the_order_through() {
        let ledger = OrderLedger::new();
        ledger.apply(&Event::now(EventKind::OrderGenerated).with_order(sample_order(1)));
        assert_eq!(ledger.generated(), 1);
        assert_eq!(ledger.in_flight_len(), 1);

        ledger.apply(
            &Event::now(EventKind::OrderCompleted)
                .with_order_id(OrderId(1))
                .with_stage(Stage::Packaging),
        );
        assert_eq!(ledger.in_flight_len(), 0);
        assert_eq!(ledger.completed_len(), 1);
        assert_eq!(ledger.failed_len(), 0);
    }

    #[test]
    fn double_completion_is_ignored() {
        let ledger = OrderLedger::new();
        ledger.apply(&Event::now(EventKind::OrderGenerated).with_order(sample_order(1)));
        let done = Event::now(EventKind::OrderCompleted)
            .with_order_id(OrderId(1))
            .with_stage(Stage::Packaging);
        ledger.apply(&done);
        ledger.apply(&done.clone());
        assert_eq!(ledger.completed_len(), 1);
    }

    #[test]
    fn intermediate_stage_completion_does_not_finish_the_order() {
        let ledger = OrderLedger::new();
        ledger.apply(&Event::now(EventKind::OrderGenerated).with_order(sample_order(1)));
        ledger.apply(
            &Event::now(EventKind::OrderCompleted)
                .with_order_id(OrderId(1))
                .with_stage(Stage::BasePreparation),
        );
        assert_eq!(ledger.in_flight_len(), 1);
        assert_eq!(ledger.completed_len(), 0);
    }

    #[test]
    fn failure_after_completion_does_not_double_count() {
        let ledger = OrderLedger::new();
        ledger.apply(&Event::now(EventKind::OrderGenerated).with_order(sample_order(1)));
        ledger.apply(
            &Event::now(EventKind::OrderCompleted)
                .with_order_id(OrderId(1))
                .with_stage(Stage::Packaging),
        );
        ledger.apply(&Event::now(EventKind::OrderFailed).with_order_id(OrderId(1)));
        assert_eq!(ledger.completed_len(), 1);
        assert_eq!(ledger.failed_len(), 0);
        assert_eq!(
            ledger.generated(),
            (ledger.completed_len() + ledger.failed_len() + ledger.in_flight_len()) as u64
        );
    }

    #[test]
    fn reworks_count_events_not_unique_orders() {
        let ledger = OrderLedger::new();
        let rework = Event::now(EventKind::OrderReworked)
            .with_order_id(OrderId(1))
            .with_stage(Stage::QualityControl);
        ledger.apply(&rework);
        ledger.apply(&rework.clone());
        assert_eq!(ledger.reworks(), 2);
    }
}
