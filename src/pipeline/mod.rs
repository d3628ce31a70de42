// src/pipeline/mod.rs

pub mod event_bus;
pub mod metrics;
pub mod reconciler;
pub mod scheduler;
pub mod sink;
pub mod source;

pub use event_bus::{EventBus, TrackEvent};
pub use metrics::{EngineMetrics, MetricsSummary};
pub use reconciler::{CycleSummary, PopulationReconciler, PopulationSnapshot};
pub use scheduler::{CycleOutcome, PollScheduler};
pub use sink::{LoggingSink, RecordingSink, RenderSink};
pub use source::{HttpReportSource, ReportSource, StaticReportSource};
