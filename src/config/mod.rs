//! Configuration system for meltr with validation and resolution.
//!
//! Configuration is a read-only snapshot loaded once at startup from
//! `meltr.toml`; changing it is a restart-time concern. Loading happens in
//! two stages: the raw serde model below mirrors the TOML file with all its
//! optional fields, then `validation::resolve` checks every value and
//! produces the immutable [`Settings`] tree the rest of the daemon consumes
//! (triggers parsed, targets resolved, defaults applied, timezone fixed).
//!
//! ## Configuration structure
//!
//! ```toml
//! [location]
//! latitude = 39.7392
//! longitude = -104.9903
//! timezone = "America/Denver"   # optional; derived from coordinates if absent
//!
//! [weather]
//! refresh_interval_minutes = 30
//! backoff_floor_minutes = 2
//! backoff_cap_minutes = 60
//! cache_max_age_hours = 6.0
//! forecast_horizon_hours = 24
//! condition_lookahead_hours = 6
//! precipitation_temp_threshold = 38.0
//!
//! [weather.black_ice]
//! max_temp = 36.0
//! dewpoint_spread = 4.0
//! min_humidity = 80.0
//!
//! [decision]
//! check_interval_minutes = 5
//! cooldown_minutes = 30
//! max_runtime_hours = 8.0
//!
//! [[group]]
//! name = "front-walk"
//! targets = ["plug-1", "strip-2:0"]   # device, or device:outlet
//!
//! [group.automation]
//! enabled = true
//! vacation_mode = false
//!
//! [[group.schedule]]
//! name = "overnight-freeze"
//! priority = "high"                   # low | normal | high | critical
//! days = [1, 2, 3, 4, 5, 6, 7]        # 1=Monday .. 7=Sunday
//! on = "22:00"                        # HH:MM[:SS] or sunrise/sunset±minutes
//! off = "sunrise+30"
//! max_temperature = 36.0              # optional weather gate
//! precipitation = true                # optional weather gate
//! black_ice = true                    # optional weather gate
//! max_runtime_hours = 10.0            # optional per-schedule safety limit
//! ```

pub mod loading;
pub mod validation;

use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration as StdDuration;

use crate::device::DeviceTarget;
use crate::schedule::Schedule;
use crate::state::overrides::AutomationSettings;
use crate::weather::BlackIceThresholds;

pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};
pub use validation::resolve;

// Raw serde model, one-to-one with the TOML file.

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    pub location: LocationConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name; derived from the coordinates when omitted.
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct WeatherConfig {
    pub refresh_interval_minutes: Option<u64>,
    pub backoff_floor_minutes: Option<u64>,
    pub backoff_cap_minutes: Option<u64>,
    pub cache_max_age_hours: Option<f64>,
    pub forecast_horizon_hours: Option<u32>,
    pub condition_lookahead_hours: Option<u32>,
    pub precipitation_temp_threshold: Option<f64>,
    pub black_ice: Option<BlackIceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BlackIceConfig {
    pub max_temp: Option<f64>,
    pub dewpoint_spread: Option<f64>,
    pub min_humidity: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DecisionConfig {
    pub check_interval_minutes: Option<u64>,
    pub cooldown_minutes: Option<u64>,
    pub max_runtime_hours: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GroupConfig {
    pub name: String,
    pub targets: Vec<String>,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default, rename = "schedule")]
    pub schedules: Vec<ScheduleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AutomationConfig {
    pub enabled: Option<bool>,
    pub vacation_mode: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    pub name: String,
    pub enabled: Option<bool>,
    pub priority: Option<String>,
    /// ISO weekdays, 1=Monday..7=Sunday; every day when omitted.
    pub days: Option<Vec<u8>>,
    pub on: String,
    pub off: String,
    pub max_temperature: Option<f64>,
    pub precipitation: Option<bool>,
    pub black_ice: Option<bool>,
    pub max_runtime_hours: Option<f64>,
}

// Resolved settings tree consumed by the daemon.

/// Fully validated, immutable configuration snapshot.
#[derive(Debug, Clone)]
pub struct Settings {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
    pub weather: WeatherSettings,
    pub decision: DecisionSettings,
    pub groups: Vec<GroupSettings>,
}

#[derive(Debug, Clone)]
pub struct WeatherSettings {
    pub refresh_interval: StdDuration,
    pub backoff_floor: StdDuration,
    pub backoff_cap: StdDuration,
    pub cache_max_age_hours: f64,
    pub forecast_horizon_hours: u32,
    pub condition_lookahead_hours: u32,
    pub precipitation_temp_threshold_f: f64,
    pub black_ice: BlackIceThresholds,
}

#[derive(Debug, Clone)]
pub struct DecisionSettings {
    pub check_interval: StdDuration,
    pub cooldown_minutes: u64,
    pub max_runtime_hours: f64,
}

#[derive(Debug, Clone)]
pub struct GroupSettings {
    pub name: String,
    pub targets: Vec<DeviceTarget>,
    pub automation: AutomationSettings,
    pub schedules: Vec<Schedule>,
}

impl Settings {
    pub fn group(&self, name: &str) -> Option<&GroupSettings> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Echo the loaded configuration in the structured log format.
    pub fn log_settings(&self) {
        log_block_start!("Loaded configuration");
        log_indented!(
            "Location: {:.4}°, {:.4}° ({})",
            self.latitude,
            self.longitude,
            self.timezone
        );
        log_indented!(
            "Check interval: {} minutes",
            self.decision.check_interval.as_secs() / 60
        );
        log_indented!(
            "Weather refresh: {} minutes (cache valid {}h)",
            self.weather.refresh_interval.as_secs() / 60,
            self.weather.cache_max_age_hours
        );
        log_indented!("Groups: {}", self.groups.len());
        for group in &self.groups {
            let gates: usize = group
                .schedules
                .iter()
                .filter(|s| s.conditions.is_some())
                .count();
            log_indented!(
                "  {} — {} target(s), {} schedule(s) ({} weather-gated)",
                group.name,
                group.targets.len(),
                group.schedules.len(),
                gates
            );
        }
        if self.groups.is_empty() {
            log_warning!("No groups configured; the daemon will idle");
        }
    }
}

#[cfg(test)]
mod tests;
