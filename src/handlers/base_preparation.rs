//! First stage: brewing the tea or coffee base.

use std::sync::Arc;

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

/// Brews the drink base. Most orders advance; a recalibration slice goes
/// back into the input queue for another pass, the rest fail on a recipe
/// error.
pub struct BasePreparation {
    io: StageIo,
    cfg: HandlerConfig,
    input: Arc<BoundedQueue<Order>>,
    output: Arc<BoundedQueue<Order>>,
    rng: Arc<RngService>,
}

impl BasePreparation {
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
            io: StageIo::new(Stage::BasePreparation, index, counters, bus),
            cfg,
            input,
            output,
            rng,
        }
    }
}

#[async_trait]
impl Worker for BasePreparation {
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
                self.cfg.base_preparation_min_time,
                self.cfg.base_preparation_max_time,
            );
            if !sleep_cancellable(&ctx, service).await {
                return Ok(());
            }

            let r = rng.uniform(0.0, 1.0);
            if r <= self.cfg.base_preparation_success_rate {
                self.io.advance(order, &self.output);
            } else if r
                <= self.cfg.base_preparation_success_rate + self.cfg.recalibration_rate
            {
                debug!(handler = %self.io.name(), order = %order.id, "recalibrating equipment");
                self.io.rework(order, &self.input, "recalibration");
            } else {
                self.io.fail(order, "recipe error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tokio::time;

    use super::*;
    use crate::events::EventKind;
    use crate::order::{Complexity, CupSize, OrderId};

    fn order(id: u64) -> Order {
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

    fn fast_cfg() -> HandlerConfig {
        let mut cfg = HandlerConfig::default();
        cfg.base_preparation_min_time = 0.01;
        cfg.base_preparation_max_time = 0.02;
        cfg
    }

    #[tokio::test]
    async fn perfect_success_rate_advances_every_order() {
        let mut cfg = fast_cfg();
        cfg.base_preparation_success_rate = 1.0;
        cfg.recalibration_rate = 0.0;

        let input = Arc::new(BoundedQueue::new("in", 10));
        let output = Arc::new(BoundedQueue::new("out", 10));
        for i in 0..3u64 {
            input.try_enqueue(order(i)).expect("room");
        }
        let counters = Arc::new(StageCounters::new());
        let bus = Bus::new(64);
        let mut rx = bus.subscribe();
        let worker = Arc::new(BasePreparation::new(
            0,
            cfg,
            input.clone(),
            output.clone(),
            counters.clone(),
            bus,
            Arc::new(RngService::new(Some(5))),
        ));

        let ctx = CancellationToken::new();
        let task = tokio::spawn({
            let worker = worker.clone();
            let ctx = ctx.clone();
            async move { worker.run(ctx).await }
        });
        time::timeout(Duration::from_secs(2), async {
            while output.len() < 3 {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("all three orders must advance");
        worker.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");

        assert_eq!(counters.snapshot().processed, 3);
        assert!(input.is_empty());
        let mut advanced = 0;
        while let Ok(event) = rx.try_recv() {
            if event.kind == EventKind::OrderCompleted {
                assert_eq!(event.stage, Some(Stage::BasePreparation));
                advanced += 1;
            }
        }
        assert_eq!(advanced, 3);
    }

    #[tokio::test]
    async fn zero_success_and_zero_recalibration_fails_everything() {
        let mut cfg = fast_cfg();
        cfg.base_preparation_success_rate = 0.0;
        cfg.recalibration_rate = 0.0;

        let input = Arc::new(BoundedQueue::new("in", 10));
        let output = Arc::new(BoundedQueue::new("out", 10));
        input.try_enqueue(order(1)).expect("room");
        input.try_enqueue(order(2)).expect("room");
        let counters = Arc::new(StageCounters::new());
        let worker = Arc::new(BasePreparation::new(
            0,
            cfg,
            input.clone(),
            output.clone(),
            counters.clone(),
            Bus::new(64),
            Arc::new(RngService::new(Some(5))),
        ));

        let ctx = CancellationToken::new();
        let task = tokio::spawn({
            let worker = worker.clone();
            let ctx = ctx.clone();
            async move { worker.run(ctx).await }
        });
        time::timeout(Duration::from_secs(2), async {
            while counters.snapshot().failed < 2 {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("both orders must fail");
        worker.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");

        assert!(output.is_empty());
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.failed, 2);
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.reworked, 0);
    }
}
