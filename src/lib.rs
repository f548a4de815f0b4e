//! # bobasim
//!
//! **bobasim** simulates a bubble-tea shop as a discrete-event, soft
//! real-time concurrent pipeline: stochastic order sources feed bounded
//! queues drained by pools of stage workers, one shared consumable (cooked
//! tapioca) gates the toppings stage, and everything shuts down cleanly on a
//! wall-clock deadline before a statistics report is rendered.
//!
//! ## Components
//!
//! | Area             | Description                                               | Key types                          |
//! |------------------|-----------------------------------------------------------|------------------------------------|
//! | **Queues**       | Bounded MPMC FIFO with non-blocking enqueue.              | [`BoundedQueue`]                   |
//! | **Randomness**   | Per-worker streams off one master seed.                   | [`RngService`], [`RngStream`]      |
//! | **Orders**       | The work item and its menu attributes.                    | [`Order`], [`Complexity`], [`CupSize`] |
//! | **Workers**      | Emitters and the five stage handlers.                     | [`Worker`], [`Emitter`], [`handlers`] |
//! | **Resource**     | Tapioca portion pool with cooking admission control.      | [`TapiocaPool`]                    |
//! | **Supervision**  | Lifecycle, deadline, graceful shutdown, bookkeeping.      | [`Engine`], [`OrderLedger`]        |
//! | **Statistics**   | Final report and bottleneck diagnostics.                  | [`SimulationReport`]               |
//! | **Configuration**| `config.json` loading, defaults, validation.              | [`SimulationConfig`]               |
//!
//! ```no_run
//! use bobasim::{Engine, SimulationConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut cfg = SimulationConfig::default();
//!     cfg.simulation_duration_seconds = 30;
//!     let report = Engine::new(cfg).run().await;
//!     println!("{report}");
//! }
//! ```

mod config;
mod counters;
mod emitter;
mod engine;
mod error;
mod events;
mod ledger;
mod order;
mod os_signals;
mod queue;
mod rng;
mod stats;
mod tapioca;
mod worker;

pub mod handlers;

pub use config::{ConfigSource, EmitterConfig, HandlerConfig, QueueConfig, SimulationConfig};
pub use counters::{CounterSnapshot, StageCounters};
pub use emitter::{Emitter, EmitterKind};
pub use engine::Engine;
pub use error::{ConfigError, WorkerError};
pub use events::{Bus, Event, EventKind};
pub use ledger::{CompletedOrder, InFlightOrder, OrderLedger};
pub use order::{Complexity, CupSize, Order, OrderId, OrderSequence, Stage};
pub use queue::{BoundedQueue, QueueFull};
pub use rng::{RngService, RngStream};
pub use stats::{QueueDepths, SimulationReport, Snapshot, StageStats};
pub use tapioca::{
    TapiocaPool, INITIAL_PORTIONS, LOW_STOCK_THRESHOLD, MAX_CONCURRENT_COOKING,
    PORTIONS_PER_BATCH,
};
pub use worker::Worker;
