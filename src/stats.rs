//! # Statistics: final report and bottleneck diagnostics.
//!
//! The engine collects one [`Snapshot`] after the drain window;
//! [`SimulationReport::from_snapshot`] is a pure function of it, so the
//! same snapshot always renders the same report. Utilization is an
//! approximation derived from throughput, not a measured busy fraction.

use std::fmt;
use std::time::Duration;

use crate::counters::CounterSnapshot;
use crate::order::Stage;

/// Queue depth above which the toppings backlog is called out as critical.
const TOPPINGS_BACKLOG: usize = 20;
/// Pool level below which tapioca stock is called out.
const TAPIOCA_LOW_WATER: usize = 3;
const PREPARATION_BACKLOG: usize = 15;
const QUALITY_BACKLOG: usize = 10;

/// Instantaneous depth of every named queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueDepths {
    pub orders: usize,
    pub preparation: usize,
    pub toppings: usize,
    pub quality: usize,
}

/// Everything the aggregator needs, captured once at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Configured simulation duration.
    pub duration: Duration,
    pub generated: u64,
    pub completed: u64,
    pub failed: u64,
    /// Rework events, not unique orders.
    pub reworks: u64,
    pub in_flight: u64,
    /// Sum of processing times across completed orders.
    pub total_processing: Duration,
    pub queue_depths: QueueDepths,
    pub tapioca_portions: usize,
    pub stage_counters: Vec<(Stage, CounterSnapshot)>,
}

/// Aggregated per-stage numbers across all instances of that stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageStats {
    pub stage: Stage,
    pub processed: u64,
    pub failed: u64,
    pub reworked: u64,
    /// `min(100, processed-per-minute × 10)`; a rough load indicator.
    pub utilization: f64,
}

/// The final report value rendered by the binary.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub generated: u64,
    pub completed: u64,
    pub failed: u64,
    pub reworked: u64,
    pub in_flight: u64,
    pub average_processing_secs: f64,
    pub orders_per_minute: f64,
    pub throughput_per_minute: f64,
    /// Completed as a percentage of generated.
    pub success_rate: f64,
    pub queue_depths: QueueDepths,
    pub tapioca_portions: usize,
    pub stage_stats: Vec<StageStats>,
    pub bottlenecks: Vec<String>,
}

impl SimulationReport {
    /// Pure aggregation; invoking twice on the same snapshot yields an
    /// identical report.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let minutes = snapshot.duration.as_secs_f64() / 60.0;
        let per_minute = |count: u64| {
            if minutes > 0.0 {
                count as f64 / minutes
            } else {
                0.0
            }
        };

        let average_processing_secs = if snapshot.completed > 0 {
            snapshot.total_processing.as_secs_f64() / snapshot.completed as f64
        } else {
            0.0
        };
        let success_rate = if snapshot.generated > 0 {
            snapshot.completed as f64 / snapshot.generated as f64 * 100.0
        } else {
            0.0
        };

        let stage_stats = snapshot
            .stage_counters
            .iter()
            .map(|&(stage, counters)| StageStats {
                stage,
                processed: counters.processed,
                failed: counters.failed,
                reworked: counters.reworked,
                utilization: (per_minute(counters.processed) * 10.0).min(100.0),
            })
            .collect();

        Self {
            generated: snapshot.generated,
            completed: snapshot.completed,
            failed: snapshot.failed,
            reworked: snapshot.reworks,
            in_flight: snapshot.in_flight,
            average_processing_secs,
            orders_per_minute: per_minute(snapshot.generated),
            throughput_per_minute: per_minute(snapshot.completed),
            success_rate,
            queue_depths: snapshot.queue_depths,
            tapioca_portions: snapshot.tapioca_portions,
            stage_stats,
            bottlenecks: analyze_bottlenecks(snapshot),
        }
    }
}

/// Threshold-driven diagnostics over the final snapshot.
fn analyze_bottlenecks(snapshot: &Snapshot) -> Vec<String> {
    let mut findings = Vec::new();
    let depths = &snapshot.queue_depths;

    if depths.toppings > TOPPINGS_BACKLOG {
        findings.push(format!(
            "CRITICAL: toppings queue backed up with {} orders; add toppings handlers or \
             increase tapioca cooking capacity",
            depths.toppings
        ));
    }
    if snapshot.tapioca_portions < TAPIOCA_LOW_WATER {
        findings.push(format!(
            "tapioca stock critically low ({} portions); cooking cannot keep up with demand, \
             consider more cooking handlers or bigger batches",
            snapshot.tapioca_portions
        ));
    }
    if snapshot.completed * 4 < snapshot.generated {
        findings.push(format!(
            "system overwhelmed: only {} of {} generated orders completed; reduce order \
             intake or scale the slowest stages",
            snapshot.completed, snapshot.generated
        ));
    }
    if depths.preparation > PREPARATION_BACKLOG {
        findings.push(format!(
            "base preparation is a bottleneck ({} orders queued); add preparation handlers",
            depths.preparation
        ));
    }
    if depths.quality > QUALITY_BACKLOG {
        findings.push(format!(
            "quality control is a bottleneck ({} orders queued); add inspectors or lower \
             the defect rate upstream",
            depths.quality
        ));
    }
    findings
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== simulation report ===")?;
        writeln!(
            f,
            "orders: generated={} completed={} failed={} rework-events={} in-flight={}",
            self.generated, self.completed, self.failed, self.reworked, self.in_flight
        )?;
        writeln!(
            f,
            "success rate: {:.1}% | average processing time: {:.2}s",
            self.success_rate, self.average_processing_secs
        )?;
        writeln!(
            f,
            "rates: {:.1} generated/min, {:.1} completed/min",
            self.orders_per_minute, self.throughput_per_minute
        )?;
        writeln!(
            f,
            "queues: orders={} preparation={} toppings={} quality={} | tapioca portions={}",
            self.queue_depths.orders,
            self.queue_depths.preparation,
            self.queue_depths.toppings,
            self.queue_depths.quality,
            self.tapioca_portions
        )?;
        writeln!(f, "per stage:")?;
        for s in &self.stage_stats {
            writeln!(
                f,
                "  {:<18} processed={:<5} failed={:<5} reworked={:<5} utilization={:.0}%",
                s.stage.label(),
                s.processed,
                s.failed,
                s.reworked,
                s.utilization
            )?;
        }
        if self.bottlenecks.is_empty() {
            writeln!(f, "bottlenecks: none detected")?;
        } else {
            writeln!(f, "bottlenecks:")?;
            for finding in &self.bottlenecks {
                writeln!(f, "  - {finding}")?;
            }
        }
        Ok(())
    }
}
