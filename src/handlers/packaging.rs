//! Packaging: the terminal stage. Everything that reaches it completes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerConfig;
use crate::counters::StageCounters;
use crate::error::WorkerError;
use crate::events::Bus;
use crate::order::{Order, Stage};
use crate::queue::BoundedQueue;
use crate::rng::RngService;
use crate::worker::{sleep_cancellable, Worker, DEQUEUE_POLL, IDLE_BACKOFF};

use super::StageIo;

pub struct Packaging {
    io: StageIo,
    cfg: HandlerConfig,
    input: Arc<BoundedQueue<Order>>,
    rng: Arc<RngService>,
}

impl Packaging {
    pub fn new(
        index: usize,
        cfg: HandlerConfig,
        input: Arc<BoundedQueue<Order>>,
        counters: Arc<StageCounters>,
        bus: Bus,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            io: StageIo::new(Stage::Packaging, index, counters, bus),
            cfg,
            input,
            rng,
        }
    }

    fn service_factor(&self, order: &Order) -> f64 {
        if self.cfg.use_packaging_size_multiplier {
            order.size.packaging_multiplier()
        } else {
            1.0
        }
    }
}

#[async_trait]
impl Worker for Packaging {
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

            let service = rng
                .duration_between(self.cfg.packaging_min_time, self.cfg.packaging_max_time)
                .mul_f64(self.service_factor(&order));
            if !sleep_cancellable(&ctx, service).await {
                return Ok(());
            }

            self.io.complete(order);
        }
    }
}
