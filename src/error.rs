//! # Error types used by the simulation runtime and its workers.
//!
//! Two small enums cover the whole surface:
//!
//! - [`ConfigError`] fatal startup problems (bad values in `config.json`).
//! - [`WorkerError`] errors escaping a worker loop.
//!
//! Queue overflow is intentionally *not* here: `try_enqueue` hands the
//! rejected item back through [`QueueFull`](crate::queue::QueueFull) so the
//! caller can apply its backpressure policy (drop, re-enqueue, or count the
//! item as failed at that stage).
//!
//! Cancellation is a clean exit, never an error: worker loops return `Ok(())`
//! when the shutdown token fires.

use thiserror::Error;

/// Errors raised while validating the simulation configuration.
///
/// A missing or malformed `config.json` is *not* an error (the simulator
/// falls back to defaults); only semantically invalid values abort startup.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Human-readable description of the offending field.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            reason: reason.into(),
        }
    }
}

/// Errors escaping a worker loop.
///
/// Workers are resilient to transient faults: anything recoverable is
/// handled (and logged) inside the loop. An error of this type reaching the
/// engine means the loop itself gave up; the engine logs it with the worker's
/// identity and lets the rest of the pipeline keep running.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker hit a fault it could not recover from.
    #[error("worker '{worker}' failed: {reason}")]
    Internal { worker: String, reason: String },
}

impl WorkerError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkerError::Internal { .. } => "worker_internal",
        }
    }
}
