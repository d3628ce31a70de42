// src/pipeline/sink.rs
//
// The renderer side of the engine. A sink receives one batch of events per
// poll cycle and manages its own display resources from the spawn/retire
// notifications; positions come from `TrackView::position_at`.

use crate::pipeline::event_bus::TrackEvent;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub trait RenderSink: Send {
    fn apply(&mut self, events: &[TrackEvent]);
}

/// Default sink for the headless binary: logs population changes.
#[derive(Debug, Default)]
pub struct LoggingSink {
    live: usize,
}

impl RenderSink for LoggingSink {
    fn apply(&mut self, events: &[TrackEvent]) {
        let mut updated = 0usize;
        for event in events {
            match event {
                TrackEvent::Spawned(view) => {
                    self.live += 1;
                    info!("➕ Spawned {} ({} live)", view.id, self.live);
                }
                TrackEvent::Retired(id) => {
                    self.live = self.live.saturating_sub(1);
                    info!("➖ Retired {} ({} live)", id, self.live);
                }
                TrackEvent::Updated(view) => {
                    updated += 1;
                    if view.quarantined {
                        debug!("⏳ {} held while a jump is quarantined", view.id);
                    }
                }
            }
        }
        debug!("Cycle batch: {} events, {} updates", events.len(), updated);
    }
}

/// Keeps every batch it receives. The handle can be cloned before the sink is
/// moved into a scheduler.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<TrackEvent>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Vec<TrackEvent>> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn retired_ids(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flatten()
            .filter_map(|e| match e {
                TrackEvent::Retired(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn spawned_ids(&self) -> Vec<String> {
        self.batches()
            .iter()
            .flatten()
            .filter_map(|e| match e {
                TrackEvent::Spawned(view) => Some(view.id.clone()),
                _ => None,
            })
            .collect()
    }
}

impl RenderSink for RecordingSink {
    fn apply(&mut self, events: &[TrackEvent]) {
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        batches.push(events.to_vec());
    }
}
