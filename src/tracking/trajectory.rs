// src/tracking/trajectory.rs
//
// Time-indexed position series for one entity.
//
// Samples live behind an `Arc<Vec<_>>`. Cloning a store is a cheap snapshot;
// the next insert or prune on the original copies the vector first, so a
// snapshot handed to a reader never changes under it.

use crate::error::{TrackingError, TrackingResult};
use crate::geodesy::{self, GeoPoint};
use crate::types::TrajectoryConfig;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub position: GeoPoint,
}

/// What `insert` actually stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inserted {
    pub time: f64,
    /// The new position was within the keep-alive radius; the previous
    /// position was repeated at the new time instead.
    pub keep_alive: bool,
    /// The requested time was not after the last sample and got nudged.
    pub bumped: bool,
}

#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    samples: Arc<Vec<Sample>>,
    config: TrajectoryConfig,
}

impl TrajectoryStore {
    pub fn new(config: TrajectoryConfig) -> Self {
        Self {
            samples: Arc::new(Vec::new()),
            config,
        }
    }

    pub fn insert(&mut self, time: f64, position: GeoPoint) -> TrackingResult<Inserted> {
        let position = position.validate()?;
        if !time.is_finite() {
            return Err(TrackingError::InvalidTime(time));
        }

        let mut inserted = Inserted {
            time,
            keep_alive: false,
            bumped: false,
        };
        let mut stored_position = position;

        if let Some(last) = self.last() {
            if time <= last.time {
                inserted.time = last.time + self.config.time_epsilon_secs;
                inserted.bumped = true;
            }
            if geodesy::surface_distance(last.position, position)? <= self.config.keep_alive_meters
            {
                stored_position = last.position;
                inserted.keep_alive = true;
            }
        }

        Arc::make_mut(&mut self.samples).push(Sample {
            time: inserted.time,
            position: stored_position,
        });
        Ok(inserted)
    }

    /// Position at `time`, interpolated between the bracketing samples.
    ///
    /// Outside the stored range the boundary sample is held for the configured
    /// backward/forward duration; past that the position is unavailable (`None`).
    pub fn query(&self, time: f64) -> Option<GeoPoint> {
        if time.is_nan() {
            return None;
        }
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        if time < first.time {
            return (first.time - time <= self.config.hold_backward_secs).then_some(first.position);
        }
        if time >= last.time {
            return (time - last.time <= self.config.hold_forward_secs).then_some(last.position);
        }

        // first.time <= time < last.time, so both neighbours exist
        let idx = self.samples.partition_point(|s| s.time <= time);
        let before = self.samples[idx - 1];
        let after = self.samples[idx];
        let span = after.time - before.time;
        let frac = if span > 0.0 {
            (time - before.time) / span
        } else {
            1.0
        };
        geodesy::interpolate(before.position, after.position, frac).ok()
    }

    /// Drop samples older than `before_time`. The newest sample is always kept
    /// so hold/extrapolation keeps working for a quiet entity.
    pub fn prune(&mut self, before_time: f64) -> usize {
        let stale = self
            .samples
            .partition_point(|s| s.time < before_time)
            .min(self.samples.len().saturating_sub(1));
        if stale > 0 {
            Arc::make_mut(&mut self.samples).drain(..stale);
        }
        stale
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn config(&self) -> &TrajectoryConfig {
        &self.config
    }
}
