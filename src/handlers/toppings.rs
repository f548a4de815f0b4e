//! Toppings stage: the only consumer of the tapioca pool.
//!
//! Portions are taken before the outcome of the pass is known and are never
//! refunded on rework; that is real ingredient consumption, not a leak. When
//! stock cannot cover an order it goes back to the input tail and the worker
//! naps instead of reserving (lazy retry, no reservation protocol).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::HandlerConfig;
use crate::counters::StageCounters;
use crate::error::WorkerError;
use crate::events::Bus;
use crate::order::{Complexity, Order, Stage};
use crate::queue::BoundedQueue;
use crate::rng::RngService;
use crate::tapioca::TapiocaPool;
use crate::worker::{sleep_cancellable, Worker, DEQUEUE_POLL, IDLE_BACKOFF};

use super::StageIo;

const STOCK_WAIT: Duration = Duration::from_secs(1);
const MISSING_INGREDIENTS_BACKOFF: Duration = Duration::from_secs(2);
/// Extra service effort for the special menu.
const SPECIAL_MENU_FACTOR: f64 = 1.5;

pub struct Toppings {
    io: StageIo,
    cfg: HandlerConfig,
    input: Arc<BoundedQueue<Order>>,
    output: Arc<BoundedQueue<Order>>,
    pool: Arc<TapiocaPool>,
    rng: Arc<RngService>,
}

impl Toppings {
    pub fn new(
        index: usize,
        cfg: HandlerConfig,
        input: Arc<BoundedQueue<Order>>,
        output: Arc<BoundedQueue<Order>>,
        pool: Arc<TapiocaPool>,
        counters: Arc<StageCounters>,
        bus: Bus,
        rng: Arc<RngService>,
    ) -> Self {
        Self {
            io: StageIo::new(Stage::Toppings, index, counters, bus),
            cfg,
            input,
            output,
            pool,
            rng,
        }
    }
}

#[async_trait]
impl Worker for Toppings {
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

            let needed = order.toppings_count as usize;
            if needed > 0 && self.pool.portions() < needed {
                debug!(
                    handler = %self.io.name(),
                    order = %order.id,
                    needed,
                    in_stock = self.pool.portions(),
                    "waiting for tapioca"
                );
                self.io.put_back(order, &self.input);
                if !sleep_cancellable(&ctx, STOCK_WAIT).await {
                    return Ok(());
                }
                continue;
            }
            let _taken = self.pool.take(needed);

            let factor = if order.complexity == Complexity::SpecialMenu {
                SPECIAL_MENU_FACTOR
            } else {
                1.0
            };
            let service = rng
                .duration_between(self.cfg.toppings_min_time, self.cfg.toppings_max_time)
                .mul_f64(factor);
            if !sleep_cancellable(&ctx, service).await {
                return Ok(());
            }

            let r = rng.uniform(0.0, 1.0);
            if r <= self.cfg.toppings_success_rate {
                self.io.advance(order, &self.output);
            } else if r <= self.cfg.toppings_success_rate + self.cfg.toppings_rework_rate {
                self.io.rework(order, &self.input, "toppings redo");
            } else {
                // Missing ingredients: back to the queue without booking an
                // outcome, then a cool-down before the next attempt.
                debug!(handler = %self.io.name(), order = %order.id, "missing ingredients, backing off");
                self.io.put_back(order, &self.input);
                if !sleep_cancellable(&ctx, MISSING_INGREDIENTS_BACKOFF).await {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::time;

    use super::*;
    use crate::order::{CupSize, OrderId};

    fn order_with_toppings(id: u64, toppings_count: u8) -> Order {
        Order {
            id: OrderId(id),
            complexity: Complexity::MilkTea,
            size: CupSize::Large,
            toppings_count,
            is_group: false,
            quantity: 1,
            student_discount: false,
            created_at: Instant::now(),
        }
    }

    fn fast_cfg() -> HandlerConfig {
        let mut cfg = HandlerConfig::default();
        cfg.toppings_min_time = 0.01;
        cfg.toppings_max_time = 0.02;
        cfg.toppings_success_rate = 1.0;
        cfg.toppings_rework_rate = 0.0;
        cfg
    }

    fn spawn_worker(
        cfg: HandlerConfig,
        input: Arc<BoundedQueue<Order>>,
        output: Arc<BoundedQueue<Order>>,
        pool: Arc<TapiocaPool>,
        counters: Arc<StageCounters>,
    ) -> (Arc<Toppings>, CancellationToken, tokio::task::JoinHandle<Result<(), WorkerError>>) {
        let worker = Arc::new(Toppings::new(
            0,
            cfg,
            input,
            output,
            pool,
            counters,
            Bus::new(64),
            Arc::new(RngService::new(Some(21))),
        ));
        let ctx = CancellationToken::new();
        let task = tokio::spawn({
            let worker = worker.clone();
            let ctx = ctx.clone();
            async move { worker.run(ctx).await }
        });
        (worker, ctx, task)
    }

    #[tokio::test]
    async fn consumes_portions_and_advances() {
        let input = Arc::new(BoundedQueue::new("in", 10));
        let output = Arc::new(BoundedQueue::new("out", 10));
        let pool = Arc::new(TapiocaPool::new(15));
        input
            .try_enqueue(order_with_toppings(1, 3))
            .expect("room");
        let counters = Arc::new(StageCounters::new());
        let (worker, ctx, task) =
            spawn_worker(fast_cfg(), input, output.clone(), pool.clone(), counters.clone());

        time::timeout(Duration::from_secs(2), async {
            while output.is_empty() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("order must advance");
        worker.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");

        assert_eq!(pool.portions(), crate::tapioca::INITIAL_PORTIONS - 3);
        assert_eq!(counters.snapshot().processed, 1);
    }

    #[tokio::test]
    async fn parks_the_order_while_stock_is_short() {
        let input = Arc::new(BoundedQueue::new("in", 10));
        let output = Arc::new(BoundedQueue::new("out", 10));
        let pool = Arc::new(TapiocaPool::new(15));
        pool.take(crate::tapioca::INITIAL_PORTIONS);
        input
            .try_enqueue(order_with_toppings(1, 2))
            .expect("room");
        let counters = Arc::new(StageCounters::new());
        let (worker, ctx, task) = spawn_worker(
            fast_cfg(),
            input.clone(),
            output.clone(),
            pool,
            counters.clone(),
        );

        time::sleep(Duration::from_millis(300)).await;
        worker.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");

        assert_eq!(input.len(), 1, "order stays parked at the input tail");
        assert!(output.is_empty());
        assert_eq!(counters.snapshot(), Default::default());
    }

    #[tokio::test]
    async fn zero_toppings_never_touch_the_pool() {
        let input = Arc::new(BoundedQueue::new("in", 10));
        let output = Arc::new(BoundedQueue::new("out", 10));
        let pool = Arc::new(TapiocaPool::new(15));
        pool.take(crate::tapioca::INITIAL_PORTIONS);
        input
            .try_enqueue(order_with_toppings(1, 0))
            .expect("room");
        let counters = Arc::new(StageCounters::new());
        let (worker, ctx, task) =
            spawn_worker(fast_cfg(), input, output.clone(), pool.clone(), counters);

        time::timeout(Duration::from_secs(2), async {
            while output.is_empty() {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("an order without toppings must not wait for stock");
        worker.stop();
        ctx.cancel();
        task.await.expect("join").expect("clean exit");
        assert_eq!(pool.portions(), 0);
    }
}
