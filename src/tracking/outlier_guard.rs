// src/tracking/outlier_guard.rs
//
// Per-entity screening of incoming positions before they reach the trajectory.
//
// A single oversized jump is ambiguous: GPS reacquisition glitch or a genuine
// correction. The guard parks the suspect position and keeps feeding the
// last accepted one until a second, spatially consistent report confirms it.
// A TTL bounds the quarantine so an entity can never get stuck.
//
//   Clear ──jump──▶ Quarantined(suspect) ──near suspect──▶ Clear (accept)
//                        │    ▲                                ▲
//                        │    └── far from suspect (hold) ─┘   │
//                        └──── TTL elapsed / plausible report ─┘

use crate::error::TrackingResult;
use crate::geodesy::{self, GeoPoint};
use crate::types::GuardConfig;

/// Floor for the time delta in the speed estimate. Reports with identical or
/// reversed observation times then read as "very fast", never as a divide by zero.
const MIN_SPEED_DT_SECS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarantineRecord {
    pub suspect: GeoPoint,
    /// Arrival time of the suspect report, engine seconds.
    pub first_seen_at: f64,
    /// Sightings consistent with `suspect`, the suspect itself included.
    pub confirm_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GuardState {
    Clear,
    Quarantined(QuarantineRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// First sighting or a plausible move; the report position is admitted.
    Accepted,
    /// Within the noise radius; the last accepted position is repeated.
    KeepAlive,
    /// Implausible jump; the suspect is parked and the last position held.
    Quarantined,
    /// Still quarantined and this report did not confirm; last position held.
    Held,
    /// A consistent second sighting confirmed the jump; report admitted.
    Confirmed,
    /// The quarantine outlived its TTL; report admitted unconditionally.
    Expired,
}

impl Verdict {
    pub fn admits_report(&self) -> bool {
        matches!(self, Self::Accepted | Self::Confirmed | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "ACCEPTED",
            Self::KeepAlive => "KEEP_ALIVE",
            Self::Quarantined => "QUARANTINED",
            Self::Held => "HELD",
            Self::Confirmed => "CONFIRMED",
            Self::Expired => "EXPIRED",
        }
    }
}

/// Outcome of screening one report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Screening {
    pub verdict: Verdict,
    /// What the trajectory should receive for this report.
    pub position: GeoPoint,
    /// Distance from the last accepted position, metres.
    pub distance_m: f64,
    pub speed_kmh: f64,
}

#[derive(Debug, Clone)]
pub struct OutlierGuard {
    config: GuardConfig,
    state: GuardState,
    last_accepted: Option<(GeoPoint, f64)>,
}

impl OutlierGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            state: GuardState::Clear,
            last_accepted: None,
        }
    }

    /// Start from a known position, e.g. the spawn report.
    pub fn seeded(config: GuardConfig, position: GeoPoint, time: f64) -> Self {
        Self {
            config,
            state: GuardState::Clear,
            last_accepted: Some((position, time)),
        }
    }

    /// Screen a report whose observation time is also when it arrived.
    pub fn screen(&mut self, position: GeoPoint, time: f64) -> TrackingResult<Screening> {
        self.screen_received(position, time, time)
    }

    /// `time` is the feed's observation time and drives the speed estimate.
    /// The quarantine TTL runs on `received_at`, so a feed that keeps
    /// repeating a stale timestamp cannot pin a quarantine open.
    pub fn screen_received(
        &mut self,
        position: GeoPoint,
        time: f64,
        received_at: f64,
    ) -> TrackingResult<Screening> {
        let position = position.validate()?;

        let Some((last_pos, last_time)) = self.last_accepted else {
            return Ok(self.accept(Verdict::Accepted, position, time, 0.0, 0.0));
        };

        let distance_m = geodesy::surface_distance(last_pos, position)?;
        let dt = (time - last_time).max(MIN_SPEED_DT_SECS);
        let speed_kmh = distance_m / dt * 3.6;

        if let GuardState::Quarantined(record) = self.state {
            if received_at - record.first_seen_at > self.config.quarantine_ttl_secs {
                return Ok(self.accept(Verdict::Expired, position, time, distance_m, speed_kmh));
            }
        }

        if distance_m < self.config.noise_meters {
            self.state = GuardState::Clear;
            self.last_accepted = Some((last_pos, time.max(last_time)));
            return Ok(Screening {
                verdict: Verdict::KeepAlive,
                position: last_pos,
                distance_m,
                speed_kmh,
            });
        }

        let is_jump = distance_m > self.config.jump_meters
            && speed_kmh > self.config.max_plausible_speed_kmh;
        if !is_jump {
            return Ok(self.accept(Verdict::Accepted, position, time, distance_m, speed_kmh));
        }

        let hold = |verdict| Screening {
            verdict,
            position: last_pos,
            distance_m,
            speed_kmh,
        };

        match self.state {
            GuardState::Clear => {
                self.state = GuardState::Quarantined(QuarantineRecord {
                    suspect: position,
                    first_seen_at: received_at,
                    confirm_count: 1,
                });
                if self.config.confirm_reports <= 1 {
                    return Ok(self.accept(Verdict::Confirmed, position, time, distance_m, speed_kmh));
                }
                Ok(hold(Verdict::Quarantined))
            }
            GuardState::Quarantined(mut record) => {
                let from_suspect = geodesy::surface_distance(record.suspect, position)?;
                if from_suspect > self.config.confirm_radius_meters {
                    return Ok(hold(Verdict::Held));
                }

                record.confirm_count += 1;
                if record.confirm_count >= self.config.confirm_reports {
                    return Ok(self.accept(Verdict::Confirmed, position, time, distance_m, speed_kmh));
                }
                self.state = GuardState::Quarantined(record);
                Ok(hold(Verdict::Held))
            }
        }
    }

    fn accept(
        &mut self,
        verdict: Verdict,
        position: GeoPoint,
        time: f64,
        distance_m: f64,
        speed_kmh: f64,
    ) -> Screening {
        self.state = GuardState::Clear;
        self.last_accepted = Some((position, time));
        Screening {
            verdict,
            position,
            distance_m,
            speed_kmh,
        }
    }

    pub fn state(&self) -> &GuardState {
        &self.state
    }

    pub fn quarantine(&self) -> Option<&QuarantineRecord> {
        match &self.state {
            GuardState::Quarantined(record) => Some(record),
            GuardState::Clear => None,
        }
    }

    pub fn is_quarantined(&self) -> bool {
        self.quarantine().is_some()
    }

    pub fn last_accepted(&self) -> Option<(GeoPoint, f64)> {
        self.last_accepted
    }
}
