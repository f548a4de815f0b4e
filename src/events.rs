//! # Order lifecycle events and the broadcast bus that carries them.
//!
//! Emitters and handlers publish [`Event`]s; the engine's ledger subscribes
//! and keeps the books. The bus is a thin wrapper around
//! [`tokio::sync::broadcast`]:
//!
//! - [`Bus::publish`] sends to all subscribers without blocking.
//! - [`Bus::subscribe`] creates a new receiver.
//!
//! ## Ordering guarantee
//!
//! All publishers share one broadcast channel, so every subscriber observes
//! events in global publish order. An emitter publishes `OrderGenerated`
//! *before* it attempts the ingress enqueue, which means the ledger always
//! registers an order before any handler can report a terminal outcome for
//! the same id. Each event additionally carries a monotone `seq` for
//! diagnostics.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use tokio::sync::broadcast;

use crate::order::{Order, OrderId, Stage};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Order lifecycle ===
    /// An emitter synthesized a new order (published before the enqueue).
    OrderGenerated,
    /// A stage finished an order; terminal only when the stage is packaging.
    OrderCompleted,
    /// An order failed terminally at some stage.
    OrderFailed,
    /// An order re-entered its stage's input queue for another pass.
    OrderReworked,

    // === Engine lifecycle ===
    /// The duration deadline fired or an external stop was requested.
    ShutdownRequested,
    /// Every worker stopped inside the grace window.
    AllStoppedWithin,
    /// The grace window elapsed with workers still running.
    GraceExceeded,
}

/// A single event record with optional order metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp, for logging only.
    pub at: SystemTime,
    pub kind: EventKind,
    /// Full order snapshot; populated on `OrderGenerated` only.
    pub order: Option<Order>,
    pub order_id: Option<OrderId>,
    /// Stage that produced the event; `None` for emitter and engine events.
    pub stage: Option<Stage>,
}

impl Event {
    /// Creates an event of the given kind stamped with the current time and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            order: None,
            order_id: None,
            stage: None,
        }
    }

    /// Attaches the full order snapshot (and its id).
    pub fn with_order(mut self, order: Order) -> Self {
        self.order_id = Some(order.id);
        self.order = Some(order);
        self
    }

    pub fn with_order_id(mut self, id: OrderId) -> Self {
        self.order_id = Some(id);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// Broadcast channel for order lifecycle events.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes to all subscribers. A bus with no live subscriber drops the
    /// event silently, which only happens after the ledger shut down.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
