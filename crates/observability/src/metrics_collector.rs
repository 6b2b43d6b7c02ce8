use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

pub struct MetricsCollector {
    // Optimization metrics
    optimization_runs_total: Counter,
    optimization_failures_total: Counter,
    optimization_duration: Histogram,
    baseline_gini: Gauge,
    baseline_version: Gauge,

    // Marketplace metrics
    swaps_proposed_total: Counter,
    swaps_accepted_total: Counter,
    swaps_rejected_total: Counter,
    swaps_expired_total: Counter,
    swap_conflicts_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            optimization_runs_total: counter!("fairshare_optimization_runs_total"),
            optimization_failures_total: counter!("fairshare_optimization_failures_total"),
            optimization_duration: histogram!("fairshare_optimization_duration_seconds"),
            baseline_gini: gauge!("fairshare_baseline_gini"),
            baseline_version: gauge!("fairshare_baseline_version"),
            swaps_proposed_total: counter!("fairshare_swaps_proposed_total"),
            swaps_accepted_total: counter!("fairshare_swaps_accepted_total"),
            swaps_rejected_total: counter!("fairshare_swaps_rejected_total"),
            swaps_expired_total: counter!("fairshare_swaps_expired_total"),
            swap_conflicts_total: counter!("fairshare_swap_conflicts_total"),
        })
    }

    pub fn record_optimization_run(&self, duration_seconds: f64) {
        self.optimization_runs_total.increment(1);
        self.optimization_duration.record(duration_seconds);
        debug!(duration_seconds = duration_seconds, "Optimization run recorded");
    }

    pub fn record_optimization_failure(&self, reason: &str) {
        self.optimization_failures_total.increment(1);
        debug!(reason = reason, "Optimization failure recorded");
    }

    pub fn update_baseline(&self, version: u64, gini: f64) {
        self.baseline_version.set(version as f64);
        self.baseline_gini.set(gini);
    }

    pub fn record_swap_proposed(&self) {
        self.swaps_proposed_total.increment(1);
    }

    pub fn record_swap_accepted(&self) {
        self.swaps_accepted_total.increment(1);
    }

    pub fn record_swap_rejected(&self, reason: &str) {
        self.swaps_rejected_total.increment(1);
        debug!(reason = reason, "Swap rejection recorded");
    }

    pub fn record_swaps_expired(&self, count: u64) {
        if count > 0 {
            self.swaps_expired_total.increment(count);
        }
    }

    pub fn record_swap_conflict(&self) {
        self.swap_conflicts_total.increment(1);
    }
}
