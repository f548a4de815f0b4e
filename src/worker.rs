//! # Worker abstraction shared by emitters and stage handlers.
//!
//! A [`Worker`] is an async, cancelable unit with a stable name. The engine
//! spawns each worker's [`run`](Worker::run) into a `JoinSet` with a child
//! of the root cancellation token, and shuts the fleet down in two steps:
//! [`stop`](Worker::stop) flips the worker's running flag (emitters first,
//! then handlers), after which the root token is cancelled to break any
//! in-progress sleep or queue poll.
//!
//! Implementors check both the flag and the token at the top of every loop
//! iteration and treat cancellation as a clean exit.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;

/// How long a consumer waits on its input queue before rechecking state.
pub const DEQUEUE_POLL: Duration = Duration::from_millis(100);
/// Idle pause after an empty poll.
pub const IDLE_BACKOFF: Duration = Duration::from_millis(100);

/// Asynchronous, cancelable pipeline worker.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Stable, human-readable worker name (e.g. `toppings-2`).
    fn name(&self) -> &str;

    /// Runs the worker loop until stopped or cancelled.
    async fn run(&self, ctx: CancellationToken) -> Result<(), WorkerError>;

    /// Requests a prompt, clean exit; the next loop check observes it.
    fn stop(&self);
}

/// Sleeps for `duration` unless the token fires first.
///
/// Returns `true` when the full duration elapsed and `false` on
/// cancellation, so callers can bail out of their loop without treating
/// shutdown as an error.
pub async fn sleep_cancellable(ctx: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = time::sleep(duration) => true,
        _ = ctx.cancelled() => false,
    }
}
