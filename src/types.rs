// src/types.rs

use crate::geodesy::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Stable key of a tracked entity as the feed reports it.
pub type EntityId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub poll: PollConfig,
    pub trajectory: TrajectoryConfig,
    pub guard: GuardConfig,
    pub kinematics: KinematicsConfig,
    pub reconcile: ReconcileConfig,
    pub source: SourceConfig,
    pub logging: LoggingConfig,
}

/// Feed family. Selects the baseline thresholds before YAML overrides apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Transit,
    Vessel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
    /// Fetches slower than this count as a failed poll. At most 3x `interval_ms`.
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// How far ahead of "now" each accepted report is placed.
    pub lookahead_secs: f64,
    /// New positions closer than this to the last sample only advance time.
    pub keep_alive_meters: f64,
    /// Forward nudge for non-increasing sample times.
    pub time_epsilon_secs: f64,
    pub hold_forward_secs: f64,
    pub hold_backward_secs: f64,
    pub retention_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub noise_meters: f64,
    pub jump_meters: f64,
    pub max_plausible_speed_kmh: f64,
    pub confirm_radius_meters: f64,
    /// Consistent sightings needed to accept a jump, the suspect included.
    pub confirm_reports: u32,
    pub quarantine_ttl_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Centered finite-difference window.
    pub window_secs: f64,
    pub ema_alpha: f64,
    pub start_speed_kmh: f64,
    pub stop_speed_kmh: f64,
    /// Displacements shorter than this never produce a new heading.
    pub min_heading_meters: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Consecutive polls an entity may be absent before it is retired.
    /// 1 retires on the first absence.
    pub retire_after_missed_cycles: u32,
    pub prune_every_cycles: u64,
    /// Cap on `Updated` events per cycle. Spawn/retire events are never capped.
    pub max_pending_updates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::transit()
    }
}

impl Config {
    /// Buses, trams and trains polled once per second.
    pub fn transit() -> Self {
        Self {
            profile: Profile::Transit,
            poll: PollConfig::default(),
            trajectory: TrajectoryConfig::default(),
            guard: GuardConfig::default(),
            kinematics: KinematicsConfig::default(),
            reconcile: ReconcileConfig::default(),
            source: SourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Marine vessels: slower, sparser AIS fixes and longer gaps.
    pub fn vessel() -> Self {
        Self {
            profile: Profile::Vessel,
            poll: PollConfig {
                interval_ms: 2000,
                fetch_timeout_ms: 6000,
            },
            trajectory: TrajectoryConfig {
                lookahead_secs: 5.0,
                keep_alive_meters: 8.0,
                hold_forward_secs: 30.0,
                hold_backward_secs: 30.0,
                ..TrajectoryConfig::default()
            },
            guard: GuardConfig {
                noise_meters: 8.0,
                max_plausible_speed_kmh: 80.0,
                quarantine_ttl_secs: 30.0,
                ..GuardConfig::default()
            },
            kinematics: KinematicsConfig {
                window_secs: 3.0,
                start_speed_kmh: 1.5,
                stop_speed_kmh: 0.8,
                ..KinematicsConfig::default()
            },
            reconcile: ReconcileConfig::default(),
            source: SourceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Transit => Self::transit(),
            Profile::Vessel => Self::vessel(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            fetch_timeout_ms: 3000,
        }
    }
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 3.5, // > poll interval, absorbs jitter
            keep_alive_meters: 5.0,
            time_epsilon_secs: 0.001,
            hold_forward_secs: 15.0,
            hold_backward_secs: 15.0,
            retention_secs: 180.0,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            noise_meters: 5.0,
            jump_meters: 200.0,
            max_plausible_speed_kmh: 120.0,
            confirm_radius_meters: 100.0,
            confirm_reports: 2,
            quarantine_ttl_secs: 12.0,
        }
    }
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            window_secs: 1.5,
            ema_alpha: 0.3,
            start_speed_kmh: 4.0,
            stop_speed_kmh: 2.5,
            min_heading_meters: 0.5,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retire_after_missed_cycles: 1,
            prune_every_cycles: 30,
            max_pending_updates: 4096,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/positions".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "feed_tracker=info".to_string(),
        }
    }
}

// ============================================================================
// FEED REPORTS
// ============================================================================

/// One position observation as delivered by the feed.
///
/// Unknown JSON fields are kept verbatim in `metadata` and handed to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(alias = "entity_id", deserialize_with = "id_from_string_or_number")]
    pub id: EntityId,
    #[serde(rename = "lon", alias = "longitude")]
    pub longitude: f64,
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(default, rename = "timestamp", alias = "observed_at")]
    pub observed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Report {
    pub fn new(id: impl Into<EntityId>, longitude: f64, latitude: f64) -> Self {
        Self {
            id: id.into(),
            longitude,
            latitude,
            observed_at: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.longitude, self.latitude)
    }

    /// Observation time in engine seconds, falling back to the poll time.
    pub fn effective_time(&self, poll_time: f64) -> f64 {
        self.observed_at
            .map(|t| t.timestamp_millis() as f64 / 1000.0)
            .unwrap_or(poll_time)
    }
}

fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<EntityId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Integer(n) => n.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_from_feed_json() {
        let json = r#"{
            "id": 4711,
            "lon": 11.97,
            "lat": 57.70,
            "timestamp": "2024-03-01T12:00:02Z",
            "line": "6",
            "bearing": 270
        }"#;
        let report: Report = serde_json::from_str(json).unwrap();

        assert_eq!(report.id, "4711");
        assert!((report.longitude - 11.97).abs() < 1e-9);
        assert!((report.latitude - 57.70).abs() < 1e-9);
        assert_eq!(report.metadata.get("line").unwrap(), "6");
        assert!(report.metadata.contains_key("bearing"));
        assert!(!report.metadata.contains_key("lon"));
    }

    #[test]
    fn test_report_long_field_names_and_missing_timestamp() {
        let json = r#"{"entity_id": "V-12", "longitude": 12.0, "latitude": 58.0}"#;
        let report: Report = serde_json::from_str(json).unwrap();

        assert_eq!(report.id, "V-12");
        assert!(report.observed_at.is_none());
        assert_eq!(report.effective_time(42.0), 42.0);
    }

    #[test]
    fn test_effective_time_uses_observation() {
        let observed = DateTime::parse_from_rfc3339("1970-01-01T00:01:40.500Z")
            .unwrap()
            .with_timezone(&Utc);
        let report = Report::new("a", 0.0, 0.0).with_observed_at(observed);
        assert!((report.effective_time(0.0) - 100.5).abs() < 1e-9);
    }

    #[test]
    fn test_vessel_profile_is_more_lenient() {
        let transit = Config::transit();
        let vessel = Config::vessel();
        assert!(vessel.trajectory.hold_forward_secs > transit.trajectory.hold_forward_secs);
        assert!(vessel.kinematics.start_speed_kmh < transit.kinematics.start_speed_kmh);
        assert_eq!(Config::for_profile(Profile::Vessel).profile, Profile::Vessel);
    }
}
