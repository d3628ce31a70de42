// src/lib.rs
//
// Live position feed tracking.
//
// Signal flow:
//   ReportSource ─fetch─▶ PollScheduler ─batch─▶ PopulationReconciler
//                                                   │  per entity:
//                                                   │  OutlierGuard → TrajectoryStore
//                                                   │  KinematicsEstimator
//                                                   ├─▶ EventBus ─▶ RenderSink
//                                                   └─▶ PopulationSnapshot (watch)

pub mod clock;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod pipeline;
pub mod tracking;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{TrackingError, TrackingResult};
pub use geodesy::GeoPoint;
pub use pipeline::{
    CycleOutcome, PollScheduler, PopulationReconciler, PopulationSnapshot, RenderSink,
    ReportSource, TrackEvent,
};
pub use tracking::{TrackView, TrackedEntity};
pub use types::{Config, EntityId, Profile, Report};
