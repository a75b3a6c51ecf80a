//! Schedule model: when a group wants to be energized.
//!
//! A schedule combines an on/off trigger pair (clock time or solar-relative),
//! a weekday set, optional weather conditions, and a priority used to break
//! ties between simultaneously active schedules. Schedules are parsed once at
//! configuration load and are immutable afterwards.

pub mod evaluator;

use anyhow::{Result, anyhow};
use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

pub use evaluator::{GroupConditions, ScheduleDecision, should_turn_on};

static CLOCK_TRIGGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]?\d|2[0-3]):([0-5]\d)(?::([0-5]\d))?$").unwrap());
static SOLAR_TRIGGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(sunrise|sunset)(?:([+-])(\d{1,3}))?$").unwrap());

/// Solar event a trigger is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolarAnchor {
    Sunrise,
    Sunset,
}

/// A schedule boundary: either a literal clock time or a solar event with a
/// minute offset, resolved to a concrete time per date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    Clock(NaiveTime),
    Solar {
        anchor: SolarAnchor,
        offset_minutes: i64,
    },
}

impl Trigger {
    /// Parse a trigger string: `HH:MM`, `HH:MM:SS`, `sunrise`, `sunset`,
    /// `sunrise+30`, `sunset-15`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if let Some(caps) = CLOCK_TRIGGER_RE.captures(trimmed) {
            let hour: u32 = caps[1].parse()?;
            let minute: u32 = caps[2].parse()?;
            let second: u32 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse())?;
            let time = NaiveTime::from_hms_opt(hour, minute, second)
                .ok_or_else(|| anyhow!("Invalid time: {trimmed}"))?;
            return Ok(Trigger::Clock(time));
        }

        if let Some(caps) = SOLAR_TRIGGER_RE.captures(trimmed) {
            let anchor = match &caps[1] {
                "sunrise" => SolarAnchor::Sunrise,
                "sunset" => SolarAnchor::Sunset,
                _ => unreachable!(),
            };
            let offset_minutes = match (caps.get(2), caps.get(3)) {
                (Some(sign), Some(magnitude)) => {
                    let minutes: i64 = magnitude.as_str().parse()?;
                    if sign.as_str() == "-" { -minutes } else { minutes }
                }
                _ => 0,
            };
            return Ok(Trigger::Solar {
                anchor,
                offset_minutes,
            });
        }

        Err(anyhow!(
            "Invalid trigger '{trimmed}': expected HH:MM[:SS], sunrise, sunset, \
             or sunrise/sunset with a ±minute offset (e.g. \"sunset-15\")"
        ))
    }
}

/// Conflict-resolution priority. Higher wins; equal priority resolves by
/// declaration order in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(anyhow!(
                "Invalid priority '{other}': expected low, normal, high, or critical"
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// Weather gating attached to a schedule. All present conditions must hold
/// for the schedule to want ON.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherConditions {
    /// Schedule only applies at or below this temperature (°F).
    pub max_temperature: Option<f64>,
    /// Schedule only applies when freezing precipitation is expected.
    pub precipitation_required: bool,
    /// Schedule only applies when black-ice conditions are forecast.
    pub black_ice_required: bool,
}

impl WeatherConditions {
    /// True when no condition is actually set; treated as "no weather gate".
    pub fn is_empty(&self) -> bool {
        self.max_temperature.is_none() && !self.precipitation_required && !self.black_ice_required
    }
}

/// A single named schedule, immutable once parsed.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub name: String,
    pub enabled: bool,
    pub priority: Priority,
    /// ISO weekday numbers, 1=Monday..7=Sunday.
    pub weekdays: BTreeSet<u8>,
    pub on_trigger: Trigger,
    pub off_trigger: Trigger,
    /// Weather gate; `None` means the schedule is purely time-based.
    pub conditions: Option<WeatherConditions>,
    /// Per-schedule override of the global max-runtime safety limit (hours).
    pub max_runtime_hours: Option<f64>,
}

impl Schedule {
    pub fn applies_on_weekday(&self, iso_weekday: u8) -> bool {
        self.weekdays.contains(&iso_weekday)
    }
}

/// Parse a weekday list (1=Monday..7=Sunday) into a set, rejecting
/// out-of-range numbers and empty lists.
pub fn parse_weekdays(days: &[u8]) -> Result<BTreeSet<u8>> {
    if days.is_empty() {
        return Err(anyhow!("Schedule weekday list must not be empty"));
    }
    let mut set = BTreeSet::new();
    for &day in days {
        if !(1..=7).contains(&day) {
            return Err(anyhow!("Invalid weekday {day}: expected 1 (Monday) to 7 (Sunday)"));
        }
        set.insert(day);
    }
    Ok(set)
}
