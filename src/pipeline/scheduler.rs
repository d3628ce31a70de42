// src/pipeline/scheduler.rs
//
// Fixed-interval driver: fetch one batch, reconcile, hand the events to the
// sink, repeat. Cycles never overlap; a tick that comes due while a cycle is
// still running is skipped. A failed or timed-out fetch skips the cycle and
// leaves every entity as it was, so renderers keep extrapolating from the
// hold window.

use crate::clock::Clock;
use crate::error::TrackingError;
use crate::pipeline::metrics::EngineMetrics;
use crate::pipeline::reconciler::{CycleSummary, PopulationReconciler, PopulationSnapshot};
use crate::pipeline::sink::RenderSink;
use crate::pipeline::source::ReportSource;
use crate::types::Config;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Reconciled(CycleSummary),
    FetchFailed(String),
    TimedOut(Duration),
}

impl CycleOutcome {
    pub fn summary(&self) -> Option<&CycleSummary> {
        match self {
            Self::Reconciled(summary) => Some(summary),
            _ => None,
        }
    }
}

struct CycleState {
    reconciler: PopulationReconciler,
    sink: Box<dyn RenderSink>,
}

struct Shared {
    source: Arc<dyn ReportSource>,
    clock: Arc<dyn Clock>,
    state: Mutex<CycleState>,
    metrics: EngineMetrics,
    interval: Duration,
    fetch_timeout: Duration,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct PollScheduler {
    shared: Arc<Shared>,
    snapshots: watch::Receiver<Arc<PopulationSnapshot>>,
    running: Option<RunningLoop>,
}

impl PollScheduler {
    pub fn new(
        config: Config,
        source: Arc<dyn ReportSource>,
        sink: Box<dyn RenderSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = EngineMetrics::new();
        let interval = Duration::from_millis(config.poll.interval_ms);
        let fetch_timeout = Duration::from_millis(config.poll.fetch_timeout_ms);
        let reconciler = PopulationReconciler::new(config, metrics.clone());
        let snapshots = reconciler.subscribe();

        Self {
            shared: Arc::new(Shared {
                source,
                clock,
                state: Mutex::new(CycleState { reconciler, sink }),
                metrics,
                interval,
                fetch_timeout,
            }),
            snapshots,
            running: None,
        }
    }

    /// Spawn the polling task on the current Tokio runtime. No-op if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Scheduler already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_loop(shared, shutdown_rx));

        info!(
            "▶️ Polling every {:?} (fetch timeout {:?})",
            self.shared.interval, self.shared.fetch_timeout
        );
        self.running = Some(RunningLoop { shutdown, handle });
    }

    /// Stop polling. Returns once any in-flight cycle has finished; after that
    /// no entity state changes. No-op if not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            error!("Polling task ended abnormally: {}", e);
        }
        info!("⏹️ Polling stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Run one fetch→reconcile cycle immediately, outside the timer.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.shared.run_cycle().await
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<PopulationSnapshot>> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Arc<PopulationSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.shared.metrics
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
        }
    }
}

async fn run_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                shared.run_cycle().await;
            }
        }
    }
}

impl Shared {
    async fn run_cycle(&self) -> CycleOutcome {
        let started = Instant::now();

        let reports = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(Ok(reports)) => reports,
            Ok(Err(e)) => {
                self.metrics.inc(&self.metrics.failed_fetches);
                warn!("Fetch failed, skipping cycle: {:#}", e);
                return CycleOutcome::FetchFailed(e.to_string());
            }
            Err(_) => {
                self.metrics.inc(&self.metrics.failed_fetches);
                self.metrics.inc(&self.metrics.timed_out_fetches);
                warn!("{}, skipping cycle", TrackingError::FetchTimedOut(self.fetch_timeout));
                return CycleOutcome::TimedOut(self.fetch_timeout);
            }
        };

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let summary = state.reconciler.reconcile(reports, now);
        let events = state.reconciler.drain_events();
        if !events.is_empty() {
            state.sink.apply(&events);
        }
        drop(state);

        self.metrics
            .set(&self.metrics.last_cycle_us, started.elapsed().as_micros() as u64);
        CycleOutcome::Reconciled(summary)
    }
}
