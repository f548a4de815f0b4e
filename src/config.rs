//! # Simulation configuration.
//!
//! [`SimulationConfig`] mirrors `config.json` (PascalCase keys). Loading is
//! deliberately forgiving, validation is not:
//!
//! - missing file: defaults are written to the path and used;
//! - malformed JSON: defaults are used, the parse error is reported;
//! - invalid values: [`SimulationConfig::validate`] fails and startup aborts.
//!
//! # Example
//! ```
//! use bobasim::SimulationConfig;
//!
//! let mut cfg = SimulationConfig::default();
//! cfg.simulation_duration_seconds = 30;
//! cfg.rng_seed = Some(42);
//! assert!(cfg.validate().is_ok());
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration value; immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SimulationConfig {
    /// Wall-clock runtime of the simulation.
    pub simulation_duration_seconds: u64,
    pub regular_emitter_count: usize,
    pub group_emitter_count: usize,
    pub base_preparation_handlers: usize,
    pub tapioca_cooking_handlers: usize,
    pub toppings_handlers: usize,
    pub quality_control_handlers: usize,
    pub packaging_handlers: usize,
    /// Master seed for all random streams; `None` seeds from entropy.
    pub rng_seed: Option<u64>,
    /// Path of the log file sink.
    pub log_file: String,
    /// Mirror log lines to stdout as well.
    pub log_to_stdout: bool,
    pub emitter: EmitterConfig,
    pub queues: QueueConfig,
    pub handlers: HandlerConfig,
}

/// Inter-arrival parameters per emitter variant (seconds) and the sampling
/// bounds for per-order tapioca demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EmitterConfig {
    pub regular_order_interval_mean: f64,
    pub regular_order_interval_deviation: f64,
    pub group_order_interval_mean: f64,
    pub group_order_interval_deviation: f64,
    /// Inclusive bounds for the sampled toppings count. The defaults keep
    /// the full 0 to 3 range; pinning both to one value makes every order
    /// demand exactly that many portions.
    pub min_toppings_per_order: u8,
    pub max_toppings_per_order: u8,
}

/// Queue capacities. The ingress queue gets its own bound; the three
/// intermediate stage queues share the ready capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QueueConfig {
    pub order_queue_capacity: usize,
    pub tapioca_queue_capacity: usize,
    pub ready_queue_capacity: usize,
}

/// Per-stage service-time windows (seconds) and branch probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HandlerConfig {
    pub base_preparation_min_time: f64,
    pub base_preparation_max_time: f64,
    pub base_preparation_success_rate: f64,
    pub recalibration_rate: f64,

    pub tapioca_cooking_min_time: f64,
    pub tapioca_cooking_max_time: f64,
    pub tapioca_cooking_success_rate: f64,

    pub toppings_min_time: f64,
    pub toppings_max_time: f64,
    pub toppings_success_rate: f64,
    pub toppings_rework_rate: f64,

    pub quality_control_min_time: f64,
    pub quality_control_max_time: f64,
    pub quality_control_success_rate: f64,
    pub minor_defect_rate: f64,

    pub packaging_min_time: f64,
    pub packaging_max_time: f64,
    /// Scale packaging time by the cup's packaging multiplier. Off by
    /// default to match the behavior the statistics were tuned against.
    pub use_packaging_size_multiplier: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_duration_seconds: 60,
            regular_emitter_count: 2,
            group_emitter_count: 1,
            base_preparation_handlers: 2,
            tapioca_cooking_handlers: 1,
            toppings_handlers: 2,
            quality_control_handlers: 2,
            packaging_handlers: 1,
            rng_seed: None,
            log_file: "simulation.log".to_owned(),
            log_to_stdout: true,
            emitter: EmitterConfig::default(),
            queues: QueueConfig::default(),
            handlers: HandlerConfig::default(),
        }
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            regular_order_interval_mean: 2.0,
            regular_order_interval_deviation: 0.5,
            group_order_interval_mean: 5.0,
            group_order_interval_deviation: 1.5,
            min_toppings_per_order: 0,
            max_toppings_per_order: 3,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            order_queue_capacity: 35,
            tapioca_queue_capacity: 15,
            ready_queue_capacity: 12,
        }
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            base_preparation_min_time: 0.5,
            base_preparation_max_time: 1.0,
            base_preparation_success_rate: 0.8,
            recalibration_rate: 0.15,

            tapioca_cooking_min_time: 8.0,
            tapioca_cooking_max_time: 12.0,
            tapioca_cooking_success_rate: 0.9,

            toppings_min_time: 0.5,
            toppings_max_time: 1.5,
            toppings_success_rate: 0.85,
            toppings_rework_rate: 0.1,

            quality_control_min_time: 0.8,
            quality_control_max_time: 1.2,
            quality_control_success_rate: 0.75,
            minor_defect_rate: 0.2,

            packaging_min_time: 2.0,
            packaging_max_time: 8.0,
            use_packaging_size_multiplier: false,
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the file at the given path.
    File,
    /// File was absent; defaults were written there and used.
    WroteDefaults,
    /// File was present but unreadable or malformed; defaults are in use.
    FallbackToDefaults(String),
}

impl SimulationConfig {
    /// Loads the configuration from `path`, falling back to defaults per
    /// the policy above. Never fails; the caller validates afterwards.
    pub fn load_or_default(path: &Path) -> (Self, ConfigSource) {
        match fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<SimulationConfig>(&text) {
                Ok(cfg) => (cfg, ConfigSource::File),
                Err(e) => (
                    Self::default(),
                    ConfigSource::FallbackToDefaults(e.to_string()),
                ),
            },
            Err(_) => {
                let cfg = Self::default();
                let source = match cfg.write_to(path) {
                    Ok(()) => ConfigSource::WroteDefaults,
                    Err(e) => ConfigSource::FallbackToDefaults(e.to_string()),
                };
                (cfg, source)
            }
        }
    }

    /// Serializes the configuration as pretty JSON to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, json)
    }

    /// Checks every semantic constraint; collects all violations into one
    /// error so a broken file is fixed in a single pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut faults = Vec::new();

        if self.regular_emitter_count < 1 {
            faults.push("RegularEmitterCount must be at least 1".to_owned());
        }
        for (name, count) in [
            ("BasePreparationHandlers", self.base_preparation_handlers),
            ("TapiocaCookingHandlers", self.tapioca_cooking_handlers),
            ("ToppingsHandlers", self.toppings_handlers),
            ("QualityControlHandlers", self.quality_control_handlers),
            ("PackagingHandlers", self.packaging_handlers),
        ] {
            if count < 1 {
                faults.push(format!("{name} must be at least 1"));
            }
        }

        for (name, mean) in [
            (
                "RegularOrderIntervalMean",
                self.emitter.regular_order_interval_mean,
            ),
            (
                "GroupOrderIntervalMean",
                self.emitter.group_order_interval_mean,
            ),
        ] {
            if !(mean > 0.0) {
                faults.push(format!("{name} must be greater than zero"));
            }
        }
        for (name, dev) in [
            (
                "RegularOrderIntervalDeviation",
                self.emitter.regular_order_interval_deviation,
            ),
            (
                "GroupOrderIntervalDeviation",
                self.emitter.group_order_interval_deviation,
            ),
        ] {
            if !(dev >= 0.0) {
                faults.push(format!("{name} must not be negative"));
            }
        }

        if self.emitter.max_toppings_per_order > 3 {
            faults.push("MaxToppingsPerOrder must not exceed 3".to_owned());
        }
        if self.emitter.min_toppings_per_order > self.emitter.max_toppings_per_order {
            faults.push(
                "MinToppingsPerOrder must not exceed MaxToppingsPerOrder".to_owned(),
            );
        }

        if self.queues.order_queue_capacity < 5 {
            faults.push("OrderQueueCapacity must be at least 5".to_owned());
        }
        if self.queues.tapioca_queue_capacity < 3 {
            faults.push("TapiocaQueueCapacity must be at least 3".to_owned());
        }
        if self.queues.ready_queue_capacity < 3 {
            faults.push("ReadyQueueCapacity must be at least 3".to_owned());
        }

        let h = &self.handlers;
        for (name, min, max) in [
            (
                "BasePreparation",
                h.base_preparation_min_time,
                h.base_preparation_max_time,
            ),
            (
                "TapiocaCooking",
                h.tapioca_cooking_min_time,
                h.tapioca_cooking_max_time,
            ),
            ("Toppings", h.toppings_min_time, h.toppings_max_time),
            (
                "QualityControl",
                h.quality_control_min_time,
                h.quality_control_max_time,
            ),
            ("Packaging", h.packaging_min_time, h.packaging_max_time),
        ] {
            if !(min > 0.0) {
                faults.push(format!("{name}MinTime must be greater than zero"));
            }
            if min > max {
                faults.push(format!("{name}MinTime must not exceed {name}MaxTime"));
            }
        }

        for (name, p) in [
            ("BasePreparationSuccessRate", h.base_preparation_success_rate),
            ("RecalibrationRate", h.recalibration_rate),
            ("TapiocaCookingSuccessRate", h.tapioca_cooking_success_rate),
            ("ToppingsSuccessRate", h.toppings_success_rate),
            ("ToppingsReworkRate", h.toppings_rework_rate),
            ("QualityControlSuccessRate", h.quality_control_success_rate),
            ("MinorDefectRate", h.minor_defect_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                faults.push(format!("{name} must be within [0, 1]"));
            }
        }
        if h.base_preparation_success_rate + h.recalibration_rate > 1.0 {
            faults.push(
                "BasePreparationSuccessRate + RecalibrationRate must not exceed 1.0".to_owned(),
            );
        }
        if h.toppings_success_rate + h.toppings_rework_rate > 1.0 {
            faults
                .push("ToppingsSuccessRate + ToppingsReworkRate must not exceed 1.0".to_owned());
        }
        if h.quality_control_success_rate + h.minor_defect_rate > 1.0 {
            faults.push(
                "QualityControlSuccessRate + MinorDefectRate must not exceed 1.0".to_owned(),
            );
        }

        if faults.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::invalid(faults.join("; ")))
        }
    }
}
