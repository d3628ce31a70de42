// src/pipeline/event_bus.rs
//
// Decoupled event system. The reconciler publishes spawn/update/retire
// events during a cycle; the scheduler drains them once per cycle and hands
// the batch to the render sink.

use crate::tracking::TrackView;
use crate::types::EntityId;
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum TrackEvent {
    /// First sighting. The sink should create its display resources.
    Spawned(TrackView),

    /// Fresh snapshot of an entity that was already tracked.
    Updated(TrackView),

    /// Gone from the feed. The sink should drop its display resources.
    Retired(EntityId),
}

impl TrackEvent {
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Spawned(view) | Self::Updated(view) => &view.id,
            Self::Retired(id) => id,
        }
    }
}

/// Per-cycle event buffer between the reconciler and the sink.
///
/// Spawn and retire notifications are never dropped. Only `Updated`
/// snapshots are bounded; past the cap the oldest update goes.
pub struct EventBus {
    lifecycle: Vec<TrackEvent>,
    updates: VecDeque<TrackEvent>,
    max_pending_updates: usize,
    dropped_updates: usize,
}

impl EventBus {
    pub fn new(max_pending_updates: usize) -> Self {
        Self {
            lifecycle: Vec::new(),
            updates: VecDeque::with_capacity(max_pending_updates.min(1024)),
            max_pending_updates,
            dropped_updates: 0,
        }
    }

    pub fn publish(&mut self, event: TrackEvent) {
        match event {
            TrackEvent::Updated(_) => {
                if self.updates.len() >= self.max_pending_updates {
                    self.updates.pop_front();
                    self.dropped_updates += 1;
                }
                self.updates.push_back(event);
            }
            TrackEvent::Spawned(_) | TrackEvent::Retired(_) => self.lifecycle.push(event),
        }
    }

    /// Lifecycle events in publication order, then the surviving updates.
    pub fn drain(&mut self) -> Vec<TrackEvent> {
        if self.dropped_updates > 0 {
            warn!(
                "Update backlog over {}: dropped {} stale updates",
                self.max_pending_updates, self.dropped_updates
            );
            self.dropped_updates = 0;
        }

        let mut events = std::mem::take(&mut self.lifecycle);
        events.extend(self.updates.drain(..));
        events
    }

    pub fn pending_count(&self) -> usize {
        self.lifecycle.len() + self.updates.len()
    }
}
