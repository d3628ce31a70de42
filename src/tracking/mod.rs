// src/tracking/mod.rs
//
// Per-entity trajectory state.
//
// Signal flow for one report:
//   Report → outlier_guard (screen) → trajectory (insert at now + lookahead)
//                                          └→ kinematics (speed / heading at now)
//
// entity::TrackedEntity owns one of each per entity id.

pub mod entity;
pub mod kinematics;
pub mod outlier_guard;
pub mod trajectory;

pub use entity::{Observation, TrackView, TrackedEntity};
pub use kinematics::{KinematicReading, KinematicState, KinematicsEstimator};
pub use outlier_guard::{GuardState, OutlierGuard, QuarantineRecord, Screening, Verdict};
pub use trajectory::{Inserted, Sample, TrajectoryStore};
