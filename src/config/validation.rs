//! Configuration validation and resolution.
//!
//! Everything that can be rejected is rejected here, at load time; the
//! decision loop never revalidates. Resolution also performs the one-time
//! parses: trigger strings into [`Trigger`] variants, target strings into
//! [`DeviceTarget`] variants, priority names, weekday sets, and the
//! timezone.

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::time::Duration as StdDuration;

use super::{Config, DecisionSettings, GroupSettings, ScheduleConfig, Settings, WeatherSettings};
use crate::common::constants::*;
use crate::device::DeviceTarget;
use crate::geo::timezone_for_coordinates;
use crate::schedule::{Priority, Schedule, Trigger, parse_weekdays};
use crate::state::overrides::AutomationSettings;
use crate::weather::BlackIceThresholds;

/// Validate the raw config and resolve it into the immutable settings tree.
pub fn resolve(config: &Config) -> Result<Settings> {
    let latitude = config.location.latitude;
    let longitude = config.location.longitude;
    if !(MINIMUM_LATITUDE..=MAXIMUM_LATITUDE).contains(&latitude) {
        return Err(anyhow!("latitude {latitude} out of range [-90, 90]"));
    }
    if !(MINIMUM_LONGITUDE..=MAXIMUM_LONGITUDE).contains(&longitude) {
        return Err(anyhow!("longitude {longitude} out of range [-180, 180]"));
    }

    let timezone: Tz = match &config.location.timezone {
        Some(name) => name
            .parse()
            .map_err(|_| anyhow!("unknown timezone '{name}'"))?,
        None => timezone_for_coordinates(latitude, longitude),
    };

    let weather = resolve_weather(config)?;
    let decision = resolve_decision(config)?;
    let groups = resolve_groups(config)?;

    Ok(Settings {
        latitude,
        longitude,
        timezone,
        weather,
        decision,
        groups,
    })
}

fn resolve_weather(config: &Config) -> Result<WeatherSettings> {
    let weather = &config.weather;

    let refresh = weather
        .refresh_interval_minutes
        .unwrap_or(DEFAULT_REFRESH_INTERVAL_MINUTES);
    check_range(
        "weather.refresh_interval_minutes",
        refresh,
        MINIMUM_REFRESH_INTERVAL_MINUTES,
        MAXIMUM_REFRESH_INTERVAL_MINUTES,
    )?;

    let backoff_floor = weather
        .backoff_floor_minutes
        .unwrap_or(DEFAULT_BACKOFF_FLOOR_MINUTES);
    let backoff_cap = weather
        .backoff_cap_minutes
        .unwrap_or(DEFAULT_BACKOFF_CAP_MINUTES);
    if backoff_floor == 0 {
        return Err(anyhow!("weather.backoff_floor_minutes must be at least 1"));
    }
    if backoff_cap < backoff_floor {
        return Err(anyhow!(
            "weather.backoff_cap_minutes ({backoff_cap}) below backoff_floor_minutes ({backoff_floor})"
        ));
    }

    let cache_max_age = weather
        .cache_max_age_hours
        .unwrap_or(DEFAULT_CACHE_MAX_AGE_HOURS);
    if !(MINIMUM_CACHE_MAX_AGE_HOURS..=MAXIMUM_CACHE_MAX_AGE_HOURS).contains(&cache_max_age) {
        return Err(anyhow!(
            "weather.cache_max_age_hours {cache_max_age} out of range [{MINIMUM_CACHE_MAX_AGE_HOURS}, {MAXIMUM_CACHE_MAX_AGE_HOURS}]"
        ));
    }

    let horizon = weather
        .forecast_horizon_hours
        .unwrap_or(DEFAULT_FORECAST_HORIZON_HOURS);
    check_range(
        "weather.forecast_horizon_hours",
        u64::from(horizon),
        u64::from(MINIMUM_FORECAST_HORIZON_HOURS),
        u64::from(MAXIMUM_FORECAST_HORIZON_HOURS),
    )?;

    let lookahead = weather
        .condition_lookahead_hours
        .unwrap_or(DEFAULT_CONDITION_LOOKAHEAD_HOURS);
    if lookahead == 0 || lookahead > horizon {
        return Err(anyhow!(
            "weather.condition_lookahead_hours ({lookahead}) must be between 1 and the forecast horizon ({horizon})"
        ));
    }

    let precipitation_threshold = weather
        .precipitation_temp_threshold
        .unwrap_or(DEFAULT_PRECIPITATION_TEMP_THRESHOLD_F);
    check_temp("weather.precipitation_temp_threshold", precipitation_threshold)?;

    let ice = weather.black_ice.clone().unwrap_or_default();
    let black_ice = BlackIceThresholds {
        max_temp_f: ice.max_temp.unwrap_or(DEFAULT_BLACK_ICE_MAX_TEMP_F),
        dewpoint_spread_f: ice
            .dewpoint_spread
            .unwrap_or(DEFAULT_BLACK_ICE_DEWPOINT_SPREAD_F),
        min_humidity_pct: ice
            .min_humidity
            .unwrap_or(DEFAULT_BLACK_ICE_MIN_HUMIDITY_PCT),
    };
    check_temp("weather.black_ice.max_temp", black_ice.max_temp_f)?;
    if black_ice.dewpoint_spread_f <= 0.0 {
        return Err(anyhow!("weather.black_ice.dewpoint_spread must be positive"));
    }
    if !(0.0..=100.0).contains(&black_ice.min_humidity_pct) {
        return Err(anyhow!("weather.black_ice.min_humidity must be 0-100"));
    }

    Ok(WeatherSettings {
        refresh_interval: StdDuration::from_secs(refresh * 60),
        backoff_floor: StdDuration::from_secs(backoff_floor * 60),
        backoff_cap: StdDuration::from_secs(backoff_cap * 60),
        cache_max_age_hours: cache_max_age,
        forecast_horizon_hours: horizon,
        condition_lookahead_hours: lookahead,
        precipitation_temp_threshold_f: precipitation_threshold,
        black_ice,
    })
}

fn resolve_decision(config: &Config) -> Result<DecisionSettings> {
    let decision = &config.decision;

    let check_interval = decision
        .check_interval_minutes
        .unwrap_or(DEFAULT_CHECK_INTERVAL_MINUTES);
    check_range(
        "decision.check_interval_minutes",
        check_interval,
        MINIMUM_CHECK_INTERVAL_MINUTES,
        MAXIMUM_CHECK_INTERVAL_MINUTES,
    )?;

    let cooldown = decision.cooldown_minutes.unwrap_or(DEFAULT_COOLDOWN_MINUTES);
    if cooldown > MAXIMUM_COOLDOWN_MINUTES {
        return Err(anyhow!(
            "decision.cooldown_minutes {cooldown} above maximum {MAXIMUM_COOLDOWN_MINUTES}"
        ));
    }

    let max_runtime = decision
        .max_runtime_hours
        .unwrap_or(DEFAULT_MAX_RUNTIME_HOURS);
    check_runtime("decision.max_runtime_hours", max_runtime)?;

    Ok(DecisionSettings {
        check_interval: StdDuration::from_secs(check_interval * 60),
        cooldown_minutes: cooldown,
        max_runtime_hours: max_runtime,
    })
}

fn resolve_groups(config: &Config) -> Result<Vec<GroupSettings>> {
    let mut names = HashSet::new();
    let mut groups = Vec::with_capacity(config.groups.len());

    for group in &config.groups {
        if group.name.trim().is_empty() {
            return Err(anyhow!("group name must not be empty"));
        }
        if !names.insert(group.name.clone()) {
            return Err(anyhow!("duplicate group name '{}'", group.name));
        }
        if group.targets.is_empty() {
            return Err(anyhow!("group '{}' has no targets", group.name));
        }

        let targets = group
            .targets
            .iter()
            .map(|raw| DeviceTarget::parse(raw))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("group '{}'", group.name))?;

        let automation = AutomationSettings {
            enabled: group.automation.enabled.unwrap_or(true),
            vacation_mode: group.automation.vacation_mode.unwrap_or(false),
        };

        let mut schedule_names = HashSet::new();
        let mut schedules = Vec::with_capacity(group.schedules.len());
        for raw in &group.schedules {
            let schedule = resolve_schedule(raw)
                .with_context(|| format!("group '{}', schedule '{}'", group.name, raw.name))?;
            if !schedule_names.insert(schedule.name.clone()) {
                return Err(anyhow!(
                    "group '{}' has duplicate schedule name '{}'",
                    group.name,
                    schedule.name
                ));
            }
            schedules.push(schedule);
        }

        groups.push(GroupSettings {
            name: group.name.clone(),
            targets,
            automation,
            schedules,
        });
    }

    Ok(groups)
}

fn resolve_schedule(raw: &ScheduleConfig) -> Result<Schedule> {
    if raw.name.trim().is_empty() {
        return Err(anyhow!("schedule name must not be empty"));
    }

    let priority = match &raw.priority {
        Some(name) => Priority::parse(name)?,
        None => Priority::default(),
    };

    let weekdays = match &raw.days {
        Some(days) => parse_weekdays(days)?,
        None => parse_weekdays(&[1, 2, 3, 4, 5, 6, 7])?,
    };

    let on_trigger = Trigger::parse(&raw.on).context("on trigger")?;
    let off_trigger = Trigger::parse(&raw.off).context("off trigger")?;

    if let Some(max_temp) = raw.max_temperature {
        check_temp("max_temperature", max_temp)?;
    }
    if let Some(hours) = raw.max_runtime_hours {
        check_runtime("max_runtime_hours", hours)?;
    }

    let conditions = {
        let conditions = crate::schedule::WeatherConditions {
            max_temperature: raw.max_temperature,
            precipitation_required: raw.precipitation.unwrap_or(false),
            black_ice_required: raw.black_ice.unwrap_or(false),
        };
        (!conditions.is_empty()).then_some(conditions)
    };

    Ok(Schedule {
        name: raw.name.clone(),
        enabled: raw.enabled.unwrap_or(true),
        priority,
        weekdays,
        on_trigger,
        off_trigger,
        conditions,
        max_runtime_hours: raw.max_runtime_hours,
    })
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(anyhow!("{field} {value} out of range [{min}, {max}]"));
    }
    Ok(())
}

fn check_temp(field: &str, value: f64) -> Result<()> {
    if !(MINIMUM_TEMP_THRESHOLD_F..=MAXIMUM_TEMP_THRESHOLD_F).contains(&value) {
        return Err(anyhow!(
            "{field} {value}°F out of range [{MINIMUM_TEMP_THRESHOLD_F}, {MAXIMUM_TEMP_THRESHOLD_F}]"
        ));
    }
    Ok(())
}

fn check_runtime(field: &str, value: f64) -> Result<()> {
    if !(MINIMUM_MAX_RUNTIME_HOURS..=MAXIMUM_MAX_RUNTIME_HOURS).contains(&value) {
        return Err(anyhow!(
            "{field} {value} out of range [{MINIMUM_MAX_RUNTIME_HOURS}, {MAXIMUM_MAX_RUNTIME_HOURS}] hours"
        ));
    }
    Ok(())
}
