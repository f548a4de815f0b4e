//! # Simulation engine: wiring, supervision, and coordinated shutdown.
//!
//! ```text
//!  emitters ──► orders ──► base-preparation ──► preparation ──► toppings ──┐
//!                                                     ▲                    │
//!                                    tapioca pool ────┘        toppings(q) │
//!                                          ▲                               ▼
//!                                   cooking batches              quality-control
//!                                                                          │
//!                             packaging ◄── quality(q) ◄───────────────────┘
//! ```
//!
//! [`Engine::run`] builds the queues and the worker fleet, spawns everything
//! into a `JoinSet` under one root cancellation token, lets the clock run,
//! then shuts down in a fixed order: stop emitters, stop handlers, cancel
//! the token, join with a bounded grace window, wait out a short drain so
//! the last bus events land in the ledger, and finally snapshot the books.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SimulationConfig;
use crate::counters::{CounterSnapshot, StageCounters};
use crate::emitter::{Emitter, EmitterKind};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::{BasePreparation, Packaging, QualityControl, TapiocaCooking, Toppings};
use crate::ledger::OrderLedger;
use crate::order::{Order, OrderSequence, Stage};
use crate::os_signals;
use crate::queue::BoundedQueue;
use crate::rng::RngService;
use crate::stats::{QueueDepths, SimulationReport, Snapshot};
use crate::tapioca::TapiocaPool;
use crate::worker::Worker;

const BUS_CAPACITY: usize = 4096;
/// Bound on the post-stop join; stragglers are abandoned afterwards.
const JOIN_GRACE: Duration = Duration::from_secs(5);
/// Window for the final completion signals to flush into the ledger.
const DRAIN_WINDOW: Duration = Duration::from_secs(2);
const MONITOR_TICK: Duration = Duration::from_secs(10);
/// A progress line is logged every this many monitor ticks.
const PROGRESS_EVERY: u32 = 3;

struct PipelineQueues {
    orders: Arc<BoundedQueue<Order>>,
    preparation: Arc<BoundedQueue<Order>>,
    toppings: Arc<BoundedQueue<Order>>,
    quality: Arc<BoundedQueue<Order>>,
}

impl PipelineQueues {
    fn new(cfg: &SimulationConfig) -> Self {
        let ready = cfg.queues.ready_queue_capacity;
        Self {
            orders: Arc::new(BoundedQueue::new("orders", cfg.queues.order_queue_capacity)),
            preparation: Arc::new(BoundedQueue::new("preparation", ready)),
            toppings: Arc::new(BoundedQueue::new("toppings", ready)),
            quality: Arc::new(BoundedQueue::new("quality", ready)),
        }
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths {
            orders: self.orders.len(),
            preparation: self.preparation.len(),
            toppings: self.toppings.len(),
            quality: self.quality.len(),
        }
    }
}

/// One simulation run's worth of shop floor.
pub struct Engine {
    cfg: Arc<SimulationConfig>,
    bus: Bus,
    halt: CancellationToken,
}

impl Engine {
    pub fn new(cfg: SimulationConfig) -> Self {
        Self {
            cfg: Arc::new(cfg),
            bus: Bus::new(BUS_CAPACITY),
            halt: CancellationToken::new(),
        }
    }

    /// Token for requesting an early stop from outside the engine; the
    /// duration deadline and Ctrl-C share the same path.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.halt.clone()
    }

    /// Runs the simulation to completion and returns the final report.
    pub async fn run(&self) -> SimulationReport {
        let cfg = &self.cfg;
        let duration = Duration::from_secs(cfg.simulation_duration_seconds);

        let queues = Arc::new(PipelineQueues::new(cfg));
        let pool = Arc::new(TapiocaPool::new(cfg.queues.tapioca_queue_capacity));
        let rng = Arc::new(RngService::new(cfg.rng_seed));
        let ids = Arc::new(OrderSequence::new());
        let ledger = Arc::new(OrderLedger::new());
        // Subscribe before any worker exists so no event can be missed.
        let listener = ledger.clone().spawn_listener(self.bus.subscribe());

        info!(
            duration_secs = cfg.simulation_duration_seconds,
            seed = rng.master_seed(),
            "opening the shop"
        );

        let (emitters, handlers, counter_groups) = self.build_fleet(&queues, &pool, &rng, &ids);

        let root = CancellationToken::new();
        let mut set = JoinSet::new();
        for worker in emitters.iter().chain(handlers.iter()) {
            set.spawn(run_worker(worker.clone(), root.child_token()));
        }
        set.spawn(monitor_loop(
            root.child_token(),
            ledger.clone(),
            queues.clone(),
            pool.clone(),
        ));

        tokio::select! {
            _ = time::sleep(duration) => {
                info!("time's up, closing the shop");
            }
            _ = self.halt.cancelled() => {
                info!("external stop requested, closing the shop");
            }
            interrupt = os_signals::wait_for_shutdown_signal() => {
                match interrupt {
                    Ok(()) => info!("shutdown signal received, closing the shop"),
                    Err(e) => warn!(error = %e, "signal listener failed, closing the shop"),
                }
            }
        }
        self.bus.publish(Event::now(EventKind::ShutdownRequested));

        // Emitters first so no new orders enter a draining pipeline.
        for emitter in &emitters {
            emitter.stop();
        }
        for handler in &handlers {
            handler.stop();
        }
        root.cancel();
        self.join_with_grace(&mut set).await;

        debug!("draining final completion signals");
        time::sleep(DRAIN_WINDOW).await;

        let snapshot = build_snapshot(duration, &ledger, &queues, &pool, &counter_groups);
        listener.abort();

        let report = SimulationReport::from_snapshot(&snapshot);
        info!(
            generated = report.generated,
            completed = report.completed,
            failed = report.failed,
            "shop closed"
        );
        for finding in &report.bottlenecks {
            warn!(%finding, "bottleneck");
        }
        report
    }

    /// Builds all emitters and handlers plus the per-instance counter sets
    /// grouped by stage for the final aggregation.
    #[allow(clippy::type_complexity)]
    fn build_fleet(
        &self,
        queues: &PipelineQueues,
        pool: &Arc<TapiocaPool>,
        rng: &Arc<RngService>,
        ids: &Arc<OrderSequence>,
    ) -> (
        Vec<Arc<dyn Worker>>,
        Vec<Arc<dyn Worker>>,
        Vec<(Stage, Arc<StageCounters>)>,
    ) {
        let cfg = &self.cfg;
        let mut emitters: Vec<Arc<dyn Worker>> = Vec::new();
        let mut handlers: Vec<Arc<dyn Worker>> = Vec::new();
        let mut counter_groups: Vec<(Stage, Arc<StageCounters>)> = Vec::new();
        let mut counters_for = |stage: Stage| {
            let counters = Arc::new(StageCounters::new());
            counter_groups.push((stage, counters.clone()));
            counters
        };

        for index in 0..cfg.regular_emitter_count {
            emitters.push(Arc::new(Emitter::new(
                EmitterKind::Regular,
                index,
                cfg.emitter.clone(),
                ids.clone(),
                queues.orders.clone(),
                self.bus.clone(),
                rng.clone(),
            )));
        }
        for index in 0..cfg.group_emitter_count {
            emitters.push(Arc::new(Emitter::new(
                EmitterKind::Group,
                index,
                cfg.emitter.clone(),
                ids.clone(),
                queues.orders.clone(),
                self.bus.clone(),
                rng.clone(),
            )));
        }

        for index in 0..cfg.base_preparation_handlers {
            handlers.push(Arc::new(BasePreparation::new(
                index,
                cfg.handlers.clone(),
                queues.orders.clone(),
                queues.preparation.clone(),
                counters_for(Stage::BasePreparation),
                self.bus.clone(),
                rng.clone(),
            )));
        }
        for index in 0..cfg.tapioca_cooking_handlers {
            handlers.push(Arc::new(TapiocaCooking::new(
                index,
                cfg.handlers.clone(),
                pool.clone(),
                counters_for(Stage::TapiocaCooking),
                rng.clone(),
            )));
        }
        for index in 0..cfg.toppings_handlers {
            handlers.push(Arc::new(Toppings::new(
                index,
                cfg.handlers.clone(),
                queues.preparation.clone(),
                queues.toppings.clone(),
                pool.clone(),
                counters_for(Stage::Toppings),
                self.bus.clone(),
                rng.clone(),
            )));
        }
        for index in 0..cfg.quality_control_handlers {
            handlers.push(Arc::new(QualityControl::new(
                index,
                cfg.handlers.clone(),
                queues.toppings.clone(),
                queues.quality.clone(),
                counters_for(Stage::QualityControl),
                self.bus.clone(),
                rng.clone(),
            )));
        }
        for index in 0..cfg.packaging_handlers {
            handlers.push(Arc::new(Packaging::new(
                index,
                cfg.handlers.clone(),
                queues.quality.clone(),
                counters_for(Stage::Packaging),
                self.bus.clone(),
                rng.clone(),
            )));
        }

        (emitters, handlers, counter_groups)
    }

    async fn join_with_grace(&self, set: &mut JoinSet<()>) {
        let drain = async {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    if !e.is_cancelled() {
                        error!(error = %e, "worker task ended abnormally");
                    }
                }
            }
        };
        let timed = time::timeout(JOIN_GRACE, drain).await;
        match timed {
            Ok(()) => {
                self.bus.publish(Event::now(EventKind::AllStoppedWithin));
                debug!("all workers stopped within the grace window");
            }
            Err(_) => {
                self.bus.publish(Event::now(EventKind::GraceExceeded));
                warn!(
                    stragglers = set.len(),
                    grace_secs = JOIN_GRACE.as_secs(),
                    "grace window exceeded, abandoning remaining workers"
                );
            }
        }
    }
}

/// Boundary around one worker's loop: an escaping error is logged with the
/// worker's identity and contained there, the rest of the fleet keeps going.
async fn run_worker(worker: Arc<dyn Worker>, ctx: CancellationToken) {
    let name = worker.name().to_owned();
    debug!(worker = %name, "starting");
    if let Err(e) = worker.run(ctx).await {
        error!(worker = %name, error = %e, label = e.as_label(), "worker loop aborted");
    }
    debug!(worker = %name, "stopped");
}

/// Periodic progress reporting; a full snapshot line every third tick.
async fn monitor_loop(
    ctx: CancellationToken,
    ledger: Arc<OrderLedger>,
    queues: Arc<PipelineQueues>,
    pool: Arc<TapiocaPool>,
) {
    let mut tick: u32 = 0;
    loop {
        tokio::select! {
            _ = time::sleep(MONITOR_TICK) => {}
            _ = ctx.cancelled() => return,
        }
        tick += 1;
        if tick % PROGRESS_EVERY != 0 {
            continue;
        }
        let depths = queues.depths();
        info!(
            generated = ledger.generated(),
            completed = ledger.completed_len(),
            failed = ledger.failed_len(),
            in_flight = ledger.in_flight_len(),
            orders_q = depths.orders,
            preparation_q = depths.preparation,
            toppings_q = depths.toppings,
            quality_q = depths.quality,
            tapioca = pool.portions(),
            cooking = pool.active_batches(),
            "progress"
        );
    }
}

fn build_snapshot(
    duration: Duration,
    ledger: &OrderLedger,
    queues: &PipelineQueues,
    pool: &TapiocaPool,
    counter_groups: &[(Stage, Arc<StageCounters>)],
) -> Snapshot {
    let mut stage_counters: Vec<(Stage, CounterSnapshot)> = Vec::new();
    for stage in Stage::ALL {
        let merged = counter_groups
            .iter()
            .filter(|(s, _)| *s == stage)
            .fold(CounterSnapshot::default(), |acc, (_, counters)| {
                acc.merge(counters.snapshot())
            });
        stage_counters.push((stage, merged));
    }

    let completed = ledger.completed_orders();
    let total_processing = completed
        .iter()
        .map(|c| c.processing_time)
        .sum::<Duration>();

    Snapshot {
        duration,
        generated: ledger.generated(),
        completed: completed.len() as u64,
        failed: ledger.failed_len() as u64,
        reworks: ledger.reworks(),
        in_flight: ledger.in_flight_len() as u64,
        total_processing,
        queue_depths: queues.depths(),
        tapioca_portions: pool.portions(),
        stage_counters,
    }
}
