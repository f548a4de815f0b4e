//! Quality control: inspect, pass, or send back with a rework penalty.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::HandlerConfig;
use crate::counters::StageCounters;
use crate::error::WorkerError;
use crate::events::Bus;
use crate::order::{Order, Stage};
use crate::queue::BoundedQueue;
use crate::rng::RngService;
use crate::worker::{sleep_cancellable, Worker, DEQUEUE_POLL, IDLE_BACKOFF};

use super::StageIo;

/// Fixing a minor defect costs this long before the order re-enters the
/// inspection queue.
const REWORK_PENALTY: Duration = Duration::from_secs(15);

pub struct QualityControl {
    io: StageIo,
    cfg: HandlerConfig,
    input: Arc<BoundedQueue<Order>>,
    output: Arc<BoundedQueue<Order>>,
    rng: Arc<RngService>,
}

impl QualityControl {
    pub fn new(
        index: usize,
        cfg: HandlerConfig,
        input: Arc<BoundedQueue<Order>>,
        output: Arc<BoundedQueue<Order>>,
        counters: Arc<StageCounters>,
        bus: Bus,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            io: StageIo::new(Stage::QualityControl, index, counters, bus),
            cfg,
            input,
            output,
            rng,
        }
    }
}

#[async_trait]
impl Worker for QualityControl {
    fn name(&self) -> &str {
        self.io.name()
    }

    fn stop(&self) {
        self.io.halt();
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkerError> {
        let mut rng = self.rng.stream();
        loop {
            if self.io.should_exit(&ctx) {
                return Ok(());
            }
            let Some(order) = self.input.poll_dequeue(DEQUEUE_POLL).await else {
                if !sleep_cancellable(&ctx, IDLE_BACKOFF).await {
                    return Ok(());
                }
                continue;
            };

            let service = rng.duration_between(
                self.cfg.quality_control_min_time,
                self.cfg.quality_control_max_time,
            );
            if !sleep_cancellable(&ctx, service).await {
                return Ok(());
            }

            let r = rng.uniform(0.0, 1.0);
            if r <= self.cfg.quality_control_success_rate {
                self.io.advance(order, &self.output);
            } else if r
                <= self.cfg.quality_control_success_rate + self.cfg.minor_defect_rate
            {
                debug!(handler = %self.io.name(), order = %order.id, "minor defect, fixing");
                if !sleep_cancellable(&ctx, REWORK_PENALTY).await {
                    return Ok(());
                }
                self.io.rework(order, &self.input, "minor defect");
            } else {
                self.io.fail(order, "critical defect");
            }
        }
    }
}
