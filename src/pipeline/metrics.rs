// src/pipeline/metrics.rs
//
// Engine observability. Counters are shared atomics so the scheduler task,
// the reconciler and whoever prints the summary can all hold a handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct EngineMetrics {
    pub cycles: Arc<AtomicU64>,
    pub failed_fetches: Arc<AtomicU64>,
    pub timed_out_fetches: Arc<AtomicU64>,
    pub reports_received: Arc<AtomicU64>,
    pub duplicate_reports: Arc<AtomicU64>,
    pub invalid_reports: Arc<AtomicU64>,
    pub spawned: Arc<AtomicU64>,
    pub retired: Arc<AtomicU64>,
    pub quarantines: Arc<AtomicU64>,
    pub confirmations: Arc<AtomicU64>,
    pub expiries: Arc<AtomicU64>,
    pub keep_alives: Arc<AtomicU64>,
    pub samples_pruned: Arc<AtomicU64>,
    pub tracked: Arc<AtomicU64>,
    pub last_cycle_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            cycles: Arc::new(AtomicU64::new(0)),
            failed_fetches: Arc::new(AtomicU64::new(0)),
            timed_out_fetches: Arc::new(AtomicU64::new(0)),
            reports_received: Arc::new(AtomicU64::new(0)),
            duplicate_reports: Arc::new(AtomicU64::new(0)),
            invalid_reports: Arc::new(AtomicU64::new(0)),
            spawned: Arc::new(AtomicU64::new(0)),
            retired: Arc::new(AtomicU64::new(0)),
            quarantines: Arc::new(AtomicU64::new(0)),
            confirmations: Arc::new(AtomicU64::new(0)),
            expiries: Arc::new(AtomicU64::new(0)),
            keep_alives: Arc::new(AtomicU64::new(0)),
            samples_pruned: Arc::new(AtomicU64::new(0)),
            tracked: Arc::new(AtomicU64::new(0)),
            last_cycle_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set(&self, gauge: &AtomicU64, value: u64) {
        gauge.store(value, Ordering::Relaxed);
    }

    pub fn cycles_per_sec(&self) -> f64 {
        let cycles = self.cycles.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            cycles as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            cycles_per_sec: self.cycles_per_sec(),
            failed_fetches: self.failed_fetches.load(Ordering::Relaxed),
            timed_out_fetches: self.timed_out_fetches.load(Ordering::Relaxed),
            reports_received: self.reports_received.load(Ordering::Relaxed),
            duplicate_reports: self.duplicate_reports.load(Ordering::Relaxed),
            invalid_reports: self.invalid_reports.load(Ordering::Relaxed),
            spawned: self.spawned.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            quarantines: self.quarantines.load(Ordering::Relaxed),
            confirmations: self.confirmations.load(Ordering::Relaxed),
            expiries: self.expiries.load(Ordering::Relaxed),
            keep_alives: self.keep_alives.load(Ordering::Relaxed),
            samples_pruned: self.samples_pruned.load(Ordering::Relaxed),
            tracked: self.tracked.load(Ordering::Relaxed),
            last_cycle_us: self.last_cycle_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub cycles: u64,
    pub cycles_per_sec: f64,
    pub failed_fetches: u64,
    pub timed_out_fetches: u64,
    pub reports_received: u64,
    pub duplicate_reports: u64,
    pub invalid_reports: u64,
    pub spawned: u64,
    pub retired: u64,
    pub quarantines: u64,
    pub confirmations: u64,
    pub expiries: u64,
    pub keep_alives: u64,
    pub samples_pruned: u64,
    pub tracked: u64,
    pub last_cycle_us: u64,
    pub elapsed_secs: f64,
}
