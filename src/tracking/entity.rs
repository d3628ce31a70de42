// src/tracking/entity.rs
//
// One record per entity id: trajectory, guard, kinematics and bookkeeping
// live together so they cannot drift apart.

use crate::error::TrackingResult;
use crate::geodesy::GeoPoint;
use crate::tracking::kinematics::{KinematicReading, KinematicState, KinematicsEstimator};
use crate::tracking::outlier_guard::{OutlierGuard, Screening};
use crate::tracking::trajectory::{Inserted, TrajectoryStore};
use crate::types::{Config, EntityId, Report};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub screening: Screening,
    pub inserted: Inserted,
}

#[derive(Debug, Clone)]
pub struct TrackedEntity {
    pub id: EntityId,
    trajectory: TrajectoryStore,
    guard: OutlierGuard,
    kinematics: KinematicState,
    metadata: Arc<Map<String, Value>>,
    spawned_cycle: u64,
    last_seen_cycle: u64,
}

impl TrackedEntity {
    /// Create the entity from its first report. The trajectory is seeded at
    /// `now` and `now + lookahead` so the renderer has forward motion to
    /// interpolate into right away.
    pub fn spawn(report: &Report, now: f64, cycle: u64, config: &Config) -> TrackingResult<Self> {
        let position = report.position().validate()?;

        let mut trajectory = TrajectoryStore::new(config.trajectory.clone());
        trajectory.insert(now, position)?;
        trajectory.insert(now + config.trajectory.lookahead_secs, position)?;

        let guard = OutlierGuard::seeded(config.guard.clone(), position, report.effective_time(now));

        Ok(Self {
            id: report.id.clone(),
            trajectory,
            guard,
            kinematics: KinematicState::default(),
            metadata: Arc::new(report.metadata.clone()),
            spawned_cycle: cycle,
            last_seen_cycle: cycle,
        })
    }

    /// Screen a follow-up report and append whatever the guard lets through
    /// at `now + lookahead`. On error nothing about the entity changes.
    pub fn observe(
        &mut self,
        report: &Report,
        now: f64,
        cycle: u64,
        lookahead_secs: f64,
    ) -> TrackingResult<Observation> {
        let screening =
            self.guard
                .screen_received(report.position(), report.effective_time(now), now)?;
        let inserted = self
            .trajectory
            .insert(now + lookahead_secs, screening.position)?;

        self.last_seen_cycle = cycle;
        if *self.metadata != report.metadata {
            self.metadata = Arc::new(report.metadata.clone());
        }

        Ok(Observation {
            screening,
            inserted,
        })
    }

    /// Present in the batch but unusable this cycle; keeps the entity alive.
    pub fn mark_seen(&mut self, cycle: u64) {
        self.last_seen_cycle = cycle;
    }

    pub fn refresh_kinematics(&mut self, estimator: &KinematicsEstimator, now: f64) -> KinematicReading {
        estimator.update(&mut self.kinematics, &self.trajectory, now)
    }

    pub fn prune(&mut self, cutoff: f64) -> usize {
        self.trajectory.prune(cutoff)
    }

    pub fn missed_cycles(&self, cycle: u64) -> u64 {
        cycle.saturating_sub(self.last_seen_cycle)
    }

    pub fn position_at(&self, time: f64) -> Option<GeoPoint> {
        self.trajectory.query(time)
    }

    pub fn trajectory(&self) -> &TrajectoryStore {
        &self.trajectory
    }

    pub fn guard(&self) -> &OutlierGuard {
        &self.guard
    }

    pub fn kinematics(&self) -> &KinematicState {
        &self.kinematics
    }

    pub fn spawned_cycle(&self) -> u64 {
        self.spawned_cycle
    }

    pub fn last_seen_cycle(&self) -> u64 {
        self.last_seen_cycle
    }

    /// Immutable snapshot for readers outside the reconciliation cycle.
    pub fn view(&self) -> TrackView {
        TrackView {
            id: self.id.clone(),
            trajectory: self.trajectory.clone(),
            kinematics: KinematicReading::from(&self.kinematics),
            quarantined: self.guard.is_quarantined(),
            metadata: Arc::clone(&self.metadata),
        }
    }
}

/// Published view of one entity. Cheap to clone; later cycles never mutate it.
#[derive(Debug, Clone)]
pub struct TrackView {
    pub id: EntityId,
    pub trajectory: TrajectoryStore,
    pub kinematics: KinematicReading,
    pub quarantined: bool,
    pub metadata: Arc<Map<String, Value>>,
}

impl TrackView {
    pub fn position_at(&self, time: f64) -> Option<GeoPoint> {
        self.trajectory.query(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_seeds_two_samples() {
        let config = Config::transit();
        let report = Report::new("bus-1", 12.0, 58.0);
        let entity = TrackedEntity::spawn(&report, 100.0, 1, &config).unwrap();

        let samples = entity.trajectory().samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].time, 100.0);
        assert_eq!(samples[1].time, 103.5);
        assert_eq!(entity.position_at(101.0), Some(GeoPoint::new(12.0, 58.0)));
    }

    #[test]
    fn test_spawn_rejects_invalid_geometry() {
        let config = Config::transit();
        let report = Report::new("bus-1", f64::NAN, 58.0);
        assert!(TrackedEntity::spawn(&report, 0.0, 1, &config).is_err());
    }

    #[test]
    fn test_observe_places_sample_at_lookahead() {
        let config = Config::transit();
        let mut entity =
            TrackedEntity::spawn(&Report::new("bus-1", 12.0, 58.0), 0.0, 1, &config).unwrap();

        // ~59 m in 1 s is plausible (212 km/h but below the jump distance)
        let obs = entity
            .observe(&Report::new("bus-1", 12.001, 58.0), 1.0, 2, 3.5)
            .unwrap();
        assert!(obs.screening.verdict.admits_report());
        assert_eq!(obs.inserted.time, 4.5);
        assert_eq!(entity.last_seen_cycle(), 2);
        assert_eq!(entity.missed_cycles(4), 2);
    }

    #[test]
    fn test_view_is_a_stable_snapshot() {
        let config = Config::transit();
        let mut entity =
            TrackedEntity::spawn(&Report::new("bus-1", 12.0, 58.0), 0.0, 1, &config).unwrap();
        let view = entity.view();

        entity
            .observe(&Report::new("bus-1", 12.001, 58.0), 1.0, 2, 3.5)
            .unwrap();
        assert_eq!(view.trajectory.len(), 2);
        assert_eq!(entity.trajectory().len(), 3);
    }
}
