//! Tapioca cooking: the replenisher keeping the shared pool stocked.
//!
//! Unlike the other handlers this worker consumes no orders. It watches the
//! pool on a one second tick and, when stock is at or below the low-water
//! mark, claims a cooking slot and spawns a batch task. The slot ceiling
//! keeps at most three batches on the stove no matter how many cooking
//! workers are configured; extra instances simply race on the same gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HandlerConfig;
use crate::counters::StageCounters;
use crate::error::WorkerError;
use crate::order::Stage;
use crate::rng::{RngService, RngStream};
use crate::tapioca::{TapiocaPool, PORTIONS_PER_BATCH};
use crate::worker::{sleep_cancellable, Worker};

const WATCH_TICK: Duration = Duration::from_secs(1);

pub struct TapiocaCooking {
    name: String,
    running: AtomicBool,
    cfg: HandlerConfig,
    pool: Arc<TapiocaPool>,
    counters: Arc<StageCounters>,
    rng: Arc<RngService>,
}

impl TapiocaCooking {
    pub fn new(
        index: usize,
        cfg: HandlerConfig,
        pool: Arc<TapiocaPool>,
        counters: Arc<StageCounters>,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            name: format!("{}-{index}", Stage::TapiocaCooking.label()),
            running: AtomicBool::new(true),
            cfg,
            pool,
            counters,
            rng,
        }
    }
}

#[async_trait]
impl Worker for TapiocaCooking {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkerError> {
        loop {
            if !self.running.load(Ordering::Acquire) || ctx.is_cancelled() {
                return Ok(());
            }
            if self.pool.is_low() && self.pool.try_begin_batch() {
                debug!(
                    handler = %self.name,
                    portions = self.pool.portions(),
                    active = self.pool.active_batches(),
                    "stock low, starting a cooking batch"
                );
                tokio::spawn(cook_batch(
                    self.name.clone(),
                    self.cfg.clone(),
                    self.pool.clone(),
                    self.counters.clone(),
                    self.rng.stream(),
                    ctx.clone(),
                ));
            }
            if !sleep_cancellable(&ctx, WATCH_TICK).await {
                return Ok(());
            }
        }
    }
}

/// One cooking batch. Always releases its slot, even when shutdown lands in
/// the middle of the cook.
async fn cook_batch(
    handler: String,
    cfg: HandlerConfig,
    pool: Arc<TapiocaPool>,
    counters: Arc<StageCounters>,
    mut rng: RngStream,
    ctx: CancellationToken,
) {
    let cook_time =
        rng.duration_between(cfg.tapioca_cooking_min_time, cfg.tapioca_cooking_max_time);
    let finished = sleep_cancellable(&ctx, cook_time).await;

    if finished {
        if rng.bernoulli(cfg.tapioca_cooking_success_rate) {
            let mut added = 0;
            for _ in 0..PORTIONS_PER_BATCH {
                // The pool may have filled up while the batch cooked; the
                // surplus portions are discarded.
                if pool.add_portion() {
                    counters.add_processed();
                    added += 1;
                }
            }
            info!(
                handler = %handler,
                added,
                portions = pool.portions(),
                "tapioca batch ready"
            );
        } else {
            counters.add_failed();
            warn!(handler = %handler, "tapioca batch burnt, discarding");
        }
    }
    pool.finish_batch();
}
