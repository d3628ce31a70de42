// src/tracking/kinematics.rs
//
// Speed and heading derived from a trajectory by centered finite difference.
// Speed is EMA-smoothed per entity; heading only follows the direction of
// travel while the entity counts as moving, with separate start/stop
// thresholds so positional noise at rest cannot spin the heading.

use crate::geodesy::{self, GeoPoint};
use crate::tracking::trajectory::TrajectoryStore;
use crate::types::KinematicsConfig;
use serde::Serialize;

/// Per-entity estimator memory. Not persisted across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KinematicState {
    pub ema_speed_kmh: f64,
    pub last_heading_deg: Option<f64>,
    pub is_moving: bool,
}

/// What the sink gets to render with.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct KinematicReading {
    pub speed_kmh: f64,
    /// Degrees clockwise from north; `None` until the entity has moved once.
    pub heading_deg: Option<f64>,
    pub moving: bool,
}

impl From<&KinematicState> for KinematicReading {
    fn from(state: &KinematicState) -> Self {
        Self {
            speed_kmh: state.ema_speed_kmh,
            heading_deg: state.last_heading_deg,
            moving: state.is_moving,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KinematicsEstimator {
    config: KinematicsConfig,
}

impl KinematicsEstimator {
    pub fn new(config: KinematicsConfig) -> Self {
        Self { config }
    }

    /// Unsmoothed speed around `time`, km/h.
    pub fn raw_speed_kmh(&self, store: &TrajectoryStore, time: f64) -> Option<f64> {
        let (_, _, distance_m) = self.displacement(store, time)?;
        Some(distance_m / self.config.window_secs * 3.6)
    }

    /// Advance the entity's smoothed state to `time` and return the reading.
    ///
    /// If the trajectory has nothing to say at `time` (held out), the previous
    /// state is returned untouched.
    pub fn update(
        &self,
        state: &mut KinematicState,
        store: &TrajectoryStore,
        time: f64,
    ) -> KinematicReading {
        let Some((from, to, distance_m)) = self.displacement(store, time) else {
            return KinematicReading::from(&*state);
        };

        let raw = distance_m / self.config.window_secs * 3.6;
        state.ema_speed_kmh += self.config.ema_alpha * (raw - state.ema_speed_kmh);

        if !state.is_moving && state.ema_speed_kmh > self.config.start_speed_kmh {
            state.is_moving = true;
        } else if state.is_moving && state.ema_speed_kmh < self.config.stop_speed_kmh {
            state.is_moving = false;
        }

        if state.is_moving && distance_m >= self.config.min_heading_meters {
            if let Ok(heading) = geodesy::bearing_deg(from, to) {
                state.last_heading_deg = Some(heading);
            }
        }

        KinematicReading::from(&*state)
    }

    fn displacement(&self, store: &TrajectoryStore, time: f64) -> Option<(GeoPoint, GeoPoint, f64)> {
        let half = self.config.window_secs / 2.0;
        let from = store.query(time - half)?;
        let to = store.query(time + half)?;
        let distance_m = geodesy::surface_distance(from, to).ok()?;
        Some((from, to, distance_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrajectoryConfig;

    /// Metres of latitude per degree, close enough for test geometry.
    const M_PER_DEG_LAT: f64 = 111_195.0;

    /// Smallest angle between two headings, degrees.
    fn heading_error(a: f64, b: f64) -> f64 {
        ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
    }

    /// Straight northward track at `kmh`, one sample per second for `secs`.
    fn northbound(kmh: f64, secs: usize) -> TrajectoryStore {
        let mut store = TrajectoryStore::new(TrajectoryConfig {
            keep_alive_meters: 0.0,
            ..TrajectoryConfig::default()
        });
        let step_deg = kmh / 3.6 / M_PER_DEG_LAT;
        for i in 0..=secs {
            store
                .insert(i as f64, GeoPoint::new(12.0, 58.0 + step_deg * i as f64))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_raw_speed_matches_track() {
        let est = KinematicsEstimator::new(KinematicsConfig::default());
        let store = northbound(36.0, 10);
        let speed = est.raw_speed_kmh(&store, 5.0).unwrap();
        assert!((speed - 36.0).abs() < 0.1, "got {}", speed);
    }

    #[test]
    fn test_ema_converges_towards_raw_speed() {
        let est = KinematicsEstimator::new(KinematicsConfig::default());
        let store = northbound(36.0, 30);
        let mut state = KinematicState::default();

        let first = est.update(&mut state, &store, 2.0);
        assert!((first.speed_kmh - 0.3 * 36.0).abs() < 0.1);

        for t in 3..25 {
            est.update(&mut state, &store, t as f64);
        }
        assert!((state.ema_speed_kmh - 36.0).abs() < 0.1);
        assert!(state.is_moving);
        assert!(heading_error(state.last_heading_deg.unwrap(), 0.0) < 0.01);
    }

    #[test]
    fn test_heading_error_wraps_around_north() {
        assert!(heading_error(359.9999999996, 0.0) < 1e-6);
        assert!((heading_error(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((heading_error(90.0, 270.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_slow_creep_never_starts_moving() {
        let est = KinematicsEstimator::new(KinematicsConfig::default());
        let store = northbound(3.9, 60);
        let mut state = KinematicState {
            last_heading_deg: Some(90.0),
            ..KinematicState::default()
        };

        for t in 1..59 {
            est.update(&mut state, &store, t as f64);
        }
        assert!(!state.is_moving);
        // heading held from the last time it was moving
        assert_eq!(state.last_heading_deg, Some(90.0));
    }

    #[test]
    fn test_hysteresis_band_keeps_moving() {
        let est = KinematicsEstimator::new(KinematicsConfig::default());
        // between stop (2.5) and start (4.0)
        let store = northbound(3.0, 60);
        let mut state = KinematicState {
            ema_speed_kmh: 5.0,
            last_heading_deg: Some(90.0),
            is_moving: true,
        };

        for t in 1..59 {
            est.update(&mut state, &store, t as f64);
        }
        assert!(state.is_moving);
        assert!(heading_error(state.last_heading_deg.unwrap(), 0.0) < 0.01);
    }

    #[test]
    fn test_stops_below_stop_speed_and_holds_heading() {
        let est = KinematicsEstimator::new(KinematicsConfig::default());
        let store = northbound(1.0, 60);
        let mut state = KinematicState {
            ema_speed_kmh: 30.0,
            last_heading_deg: Some(45.0),
            is_moving: true,
        };

        let mut stopped_at = None;
        for t in 1..59 {
            est.update(&mut state, &store, t as f64);
            if !state.is_moving && stopped_at.is_none() {
                stopped_at = Some(t);
            }
        }
        assert!(stopped_at.is_some());
        assert!(!state.is_moving);
        // heading only moved while still above the stop threshold
        assert!(state.last_heading_deg.is_some());
    }

    #[test]
    fn test_unavailable_trajectory_leaves_state_untouched() {
        let est = KinematicsEstimator::new(KinematicsConfig::default());
        let store = northbound(36.0, 5);
        let mut state = KinematicState {
            ema_speed_kmh: 12.0,
            last_heading_deg: Some(10.0),
            is_moving: true,
        };
        let reading = est.update(&mut state, &store, 1000.0);
        assert_eq!(reading.speed_kmh, 12.0);
        assert_eq!(reading.heading_deg, Some(10.0));
    }
}
