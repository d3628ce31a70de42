// src/pipeline/reconciler.rs
//
// Per-poll population reconciliation.
//
// Given one poll's full report set:
//   1. ids already tracked and reported      → screen + insert (continue)
//   2. ids reported for the first time       → spawn, seeded at now / now + lookahead
//   3. ids tracked but absent long enough    → retire, sink drops resources
// then refresh kinematics, prune on schedule, and publish an immutable
// snapshot for readers.
//
// One registry holds every entity. No entity's failure aborts the batch.

use crate::error::{TrackingError, TrackingResult};
use crate::geodesy::GeoPoint;
use crate::pipeline::event_bus::{EventBus, TrackEvent};
use crate::pipeline::metrics::EngineMetrics;
use crate::tracking::{KinematicsEstimator, TrackView, TrackedEntity, Verdict};
use crate::types::{Config, EntityId, Report};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Everything readers may see between cycles.
#[derive(Debug, Clone, Default)]
pub struct PopulationSnapshot {
    pub cycle: u64,
    pub taken_at: f64,
    pub tracks: HashMap<EntityId, TrackView>,
}

impl PopulationSnapshot {
    pub fn get(&self, id: &str) -> Option<&TrackView> {
        self.tracks.get(id)
    }

    pub fn position_of(&self, id: &str, time: f64) -> Option<GeoPoint> {
        self.tracks.get(id)?.position_at(time)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    pub cycle: u64,
    pub received: usize,
    pub duplicates: usize,
    pub spawned: Vec<EntityId>,
    pub continued: usize,
    pub retired: Vec<EntityId>,
    /// Reports dropped this cycle for invalid geometry.
    pub invalid: Vec<EntityId>,
    pub quarantined: usize,
    pub confirmed: usize,
    pub expired: usize,
    pub pruned: usize,
}

pub struct PopulationReconciler {
    config: Config,
    entities: HashMap<EntityId, TrackedEntity>,
    estimator: KinematicsEstimator,
    cycle: u64,
    bus: EventBus,
    metrics: EngineMetrics,
    snapshot_tx: watch::Sender<Arc<PopulationSnapshot>>,
}

impl PopulationReconciler {
    pub fn new(config: Config, metrics: EngineMetrics) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(PopulationSnapshot::default()));
        Self {
            estimator: KinematicsEstimator::new(config.kinematics.clone()),
            bus: EventBus::new(config.reconcile.max_pending_updates),
            config,
            entities: HashMap::new(),
            cycle: 0,
            metrics,
            snapshot_tx,
        }
    }

    /// Readers get the latest published snapshot; they never see a cycle in
    /// progress.
    pub fn subscribe(&self) -> watch::Receiver<Arc<PopulationSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> Arc<PopulationSnapshot> {
        self.snapshot_tx.borrow().clone()
    }

    pub fn reconcile(&mut self, reports: Vec<Report>, now: f64) -> CycleSummary {
        self.cycle += 1;
        let cycle = self.cycle;
        let lookahead = self.config.trajectory.lookahead_secs;

        let mut summary = CycleSummary {
            cycle,
            received: reports.len(),
            ..CycleSummary::default()
        };

        // Last report per id wins; BTreeMap keeps event order deterministic.
        let mut batch: BTreeMap<EntityId, Report> = BTreeMap::new();
        for report in reports {
            if batch.insert(report.id.clone(), report).is_some() {
                summary.duplicates += 1;
            }
        }
        if summary.duplicates > 0 {
            debug!(
                "Cycle {}: {} duplicate report(s) collapsed",
                cycle, summary.duplicates
            );
        }

        let mut continued_ids = Vec::with_capacity(batch.len());
        for (id, report) in &batch {
            match self.entities.get_mut(id) {
                Some(entity) => match entity.observe(report, now, cycle, lookahead) {
                    Ok(obs) => {
                        continued_ids.push(id.clone());
                        match obs.screening.verdict {
                            Verdict::Quarantined => {
                                summary.quarantined += 1;
                                self.metrics.inc(&self.metrics.quarantines);
                                debug!(
                                    "🚧 {} quarantined: {:.0} m jump at {:.0} km/h",
                                    id, obs.screening.distance_m, obs.screening.speed_kmh
                                );
                            }
                            Verdict::Confirmed => {
                                summary.confirmed += 1;
                                self.metrics.inc(&self.metrics.confirmations);
                                info!(
                                    "✅ {} jump confirmed ({:.0} m from last accepted)",
                                    id, obs.screening.distance_m
                                );
                            }
                            Verdict::Expired => {
                                summary.expired += 1;
                                self.metrics.inc(&self.metrics.expiries);
                                info!("⌛ {} quarantine exhausted, accepting latest report", id);
                            }
                            Verdict::Held => {
                                debug!(
                                    "⏳ {} {}: still quarantined, holding position",
                                    id,
                                    obs.screening.verdict.as_str()
                                );
                            }
                            Verdict::KeepAlive => {
                                self.metrics.inc(&self.metrics.keep_alives);
                            }
                            Verdict::Accepted => {}
                        }
                    }
                    Err(e) => {
                        warn!("Dropping report for {} this cycle: {}", id, e);
                        entity.mark_seen(cycle);
                        summary.invalid.push(id.clone());
                    }
                },
                None => match TrackedEntity::spawn(report, now, cycle, &self.config) {
                    Ok(entity) => {
                        self.entities.insert(id.clone(), entity);
                        summary.spawned.push(id.clone());
                    }
                    Err(e) => {
                        warn!("Not spawning {}: {}", id, e);
                        summary.invalid.push(id.clone());
                    }
                },
            }
        }
        summary.continued = continued_ids.len();

        // Absent long enough → retire.
        let retire_after = u64::from(self.config.reconcile.retire_after_missed_cycles);
        let mut missing: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.missed_cycles(cycle) >= retire_after)
            .map(|e| e.id.clone())
            .collect();
        missing.sort();
        for id in missing {
            self.entities.remove(&id);
            self.bus.publish(TrackEvent::Retired(id.clone()));
            summary.retired.push(id);
        }

        for entity in self.entities.values_mut() {
            entity.refresh_kinematics(&self.estimator, now);
        }

        let prune_every = self.config.reconcile.prune_every_cycles;
        if prune_every > 0 && cycle % prune_every == 0 {
            let cutoff = now - self.config.trajectory.retention_secs;
            summary.pruned = self.entities.values_mut().map(|e| e.prune(cutoff)).sum();
            if summary.pruned > 0 {
                debug!("Pruned {} samples older than {:.1}", summary.pruned, cutoff);
            }
        }

        for id in &summary.spawned {
            if let Some(entity) = self.entities.get(id) {
                self.bus.publish(TrackEvent::Spawned(entity.view()));
            }
        }
        for id in &continued_ids {
            if let Some(entity) = self.entities.get(id) {
                self.bus.publish(TrackEvent::Updated(entity.view()));
            }
        }

        self.publish_snapshot(now);
        self.record_metrics(&summary);

        if !summary.spawned.is_empty() || !summary.retired.is_empty() {
            info!(
                "Cycle {}: {} tracked (+{} / -{}), {} reports",
                cycle,
                self.entities.len(),
                summary.spawned.len(),
                summary.retired.len(),
                summary.received
            );
        }

        summary
    }

    fn publish_snapshot(&self, now: f64) {
        let snapshot = PopulationSnapshot {
            cycle: self.cycle,
            taken_at: now,
            tracks: self
                .entities
                .iter()
                .map(|(id, entity)| (id.clone(), entity.view()))
                .collect(),
        };
        self.snapshot_tx.send_replace(Arc::new(snapshot));
    }

    fn record_metrics(&self, summary: &CycleSummary) {
        let m = &self.metrics;
        m.inc(&m.cycles);
        m.add(&m.reports_received, summary.received as u64);
        m.add(&m.duplicate_reports, summary.duplicates as u64);
        m.add(&m.invalid_reports, summary.invalid.len() as u64);
        m.add(&m.spawned, summary.spawned.len() as u64);
        m.add(&m.retired, summary.retired.len() as u64);
        m.add(&m.samples_pruned, summary.pruned as u64);
        m.set(&m.tracked, self.entities.len() as u64);
    }

    /// Events accumulated since the last drain, in publication order.
    pub fn drain_events(&mut self) -> Vec<TrackEvent> {
        self.bus.drain()
    }

    pub fn get(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    /// Position of a tracked entity at `time`. `Ok(None)` means the entity
    /// exists but `time` is outside its hold window.
    pub fn position_of(&self, id: &str, time: f64) -> TrackingResult<Option<GeoPoint>> {
        self.entities
            .get(id)
            .map(|entity| entity.position_at(time))
            .ok_or_else(|| TrackingError::UnknownEntity(id.to_string()))
    }

    pub fn tracked_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }
}
