// src/config.rs

use crate::types::{Config, Profile};
use anyhow::{bail, Context, Result};
use serde_yaml::Value;
use std::fs;

impl Config {
    /// Load a YAML config. The `profile` key picks the baseline preset and
    /// every other key present in the file overrides it.
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let mut config = Self::from_yaml(&contents)?;

        if let Ok(url) = std::env::var("FEED_URL") {
            config.source.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let overrides: Value = serde_yaml::from_str(contents).context("Invalid YAML")?;

        let profile = match overrides.get("profile") {
            Some(v) => serde_yaml::from_value::<Profile>(v.clone()).context("Unknown profile")?,
            None => Profile::default(),
        };

        let mut merged = serde_yaml::to_value(Config::for_profile(profile))?;
        merge_yaml(&mut merged, overrides);

        let config: Config = serde_yaml::from_value(merged).context("Invalid configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ms == 0 {
            bail!("poll.interval_ms must be positive");
        }
        if self.poll.fetch_timeout_ms == 0 || self.poll.fetch_timeout_ms > 3 * self.poll.interval_ms
        {
            bail!(
                "poll.fetch_timeout_ms ({}) must be in 1..=3x poll.interval_ms ({})",
                self.poll.fetch_timeout_ms,
                self.poll.interval_ms
            );
        }

        let k = &self.kinematics;
        if k.stop_speed_kmh >= k.start_speed_kmh {
            bail!(
                "kinematics.stop_speed_kmh ({}) must be below start_speed_kmh ({})",
                k.stop_speed_kmh,
                k.start_speed_kmh
            );
        }
        if !(k.ema_alpha > 0.0 && k.ema_alpha <= 1.0) {
            bail!("kinematics.ema_alpha must be in (0, 1], got {}", k.ema_alpha);
        }
        if k.window_secs <= 0.0 {
            bail!("kinematics.window_secs must be positive");
        }

        let g = &self.guard;
        for (name, value) in [
            ("guard.noise_meters", g.noise_meters),
            ("guard.jump_meters", g.jump_meters),
            ("guard.max_plausible_speed_kmh", g.max_plausible_speed_kmh),
            ("guard.confirm_radius_meters", g.confirm_radius_meters),
            ("guard.quarantine_ttl_secs", g.quarantine_ttl_secs),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a non-negative number, got {}", name, value);
            }
        }

        if g.confirm_reports == 0 {
            bail!("guard.confirm_reports must be at least 1");
        }

        let t = &self.trajectory;
        if t.time_epsilon_secs <= 0.0 {
            bail!("trajectory.time_epsilon_secs must be positive");
        }
        if t.lookahead_secs < 0.0 || t.keep_alive_meters < 0.0 {
            bail!("trajectory.lookahead_secs and keep_alive_meters must be non-negative");
        }
        if t.retention_secs < t.hold_forward_secs.max(t.hold_backward_secs) {
            bail!(
                "trajectory.retention_secs ({}) must cover the hold window",
                t.retention_secs
            );
        }

        if self.reconcile.retire_after_missed_cycles == 0 {
            bail!("reconcile.retire_after_missed_cycles must be at least 1");
        }
        if self.reconcile.max_pending_updates == 0 {
            bail!("reconcile.max_pending_updates must be positive");
        }

        Ok(())
    }
}

fn merge_yaml(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Mapping(base_map), Value::Mapping(over_map)) => {
            for (key, value) in over_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_yaml(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        // `section:` with no body keeps the preset
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}
