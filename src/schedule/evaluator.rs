//! Unified schedule evaluation: should this group be energized right now?
//!
//! For every enabled schedule whose weekday set contains the current weekday,
//! the evaluator resolves both triggers to concrete local times for today,
//! checks whether `now` falls inside the [on, off) window (wrapping past
//! midnight when off precedes on), applies the schedule's weather gate, and
//! picks a single winner among the survivors. The returned reason names
//! exactly one schedule, or one of the fixed sentinel reasons, so live
//! decisions and the offline preview attribute every outcome the same way.

use chrono::{DateTime, Datelike, NaiveTime, Timelike};
use chrono_tz::Tz;

use crate::geo::SolarCalculator;
use crate::schedule::{Schedule, Trigger, WeatherConditions};

pub const REASON_NO_ACTIVE_SCHEDULE: &str = "no_active_schedule";
pub const REASON_VACATION_MODE: &str = "vacation_mode";
pub const REASON_NO_SCHEDULES: &str = "no_schedules_configured";

/// Weather inputs for one evaluation, already distilled to what the gate
/// needs. Produced by the decision loop from the resilience wrapper's cache
/// queries; `None` at the call site means "no usable data".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupConditions {
    /// Current temperature (°F).
    pub temperature: f64,
    /// Freezing precipitation expected within the lookahead window.
    pub precipitation_expected: bool,
    /// Black-ice conditions forecast within the lookahead window.
    pub black_ice_risk: bool,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleDecision {
    pub energize: bool,
    /// Name of the schedule that produced the result, when one did.
    pub winner: Option<String>,
    /// The winning schedule's name, or one of the `REASON_*` sentinels.
    pub reason: String,
}

impl ScheduleDecision {
    fn off(reason: &str) -> Self {
        Self {
            energize: false,
            winner: None,
            reason: reason.to_string(),
        }
    }
}

/// Decide whether any schedule wants the group ON at `now`.
///
/// Tie-break among simultaneously active, condition-satisfied schedules:
/// highest priority wins; equal priority resolves to the earliest declared.
pub fn should_turn_on(
    schedules: &[Schedule],
    now: DateTime<Tz>,
    conditions: Option<&GroupConditions>,
    weather_offline: bool,
    vacation: bool,
    solar: &SolarCalculator,
) -> ScheduleDecision {
    if vacation {
        return ScheduleDecision::off(REASON_VACATION_MODE);
    }
    if schedules.is_empty() {
        return ScheduleDecision::off(REASON_NO_SCHEDULES);
    }

    let weekday = now.weekday().number_from_monday() as u8;
    let mut winner: Option<&Schedule> = None;

    for schedule in schedules {
        if !schedule.enabled || !schedule.applies_on_weekday(weekday) {
            continue;
        }
        if !window_contains(schedule, now, solar) {
            continue;
        }
        if !weather_gate(schedule.conditions.as_ref(), conditions, weather_offline) {
            continue;
        }
        // Strict comparison keeps the first-declared schedule on priority ties
        match winner {
            Some(current) if schedule.priority <= current.priority => {}
            _ => winner = Some(schedule),
        }
    }

    match winner {
        Some(schedule) => ScheduleDecision {
            energize: true,
            winner: Some(schedule.name.clone()),
            reason: schedule.name.clone(),
        },
        None => ScheduleDecision::off(REASON_NO_ACTIVE_SCHEDULE),
    }
}

/// Resolve a trigger to a concrete local time on `now`'s date.
pub fn resolve_trigger_time(trigger: &Trigger, now: DateTime<Tz>, solar: &SolarCalculator) -> NaiveTime {
    match trigger {
        Trigger::Clock(time) => *time,
        Trigger::Solar {
            anchor,
            offset_minutes,
        } => solar
            .resolve_anchor(*anchor, *offset_minutes, now.date_naive())
            .time(),
    }
}

/// Whether `now` falls inside the schedule's [on, off) window for today,
/// treating off < on as a window that wraps past midnight.
fn window_contains(schedule: &Schedule, now: DateTime<Tz>, solar: &SolarCalculator) -> bool {
    let on_time = resolve_trigger_time(&schedule.on_trigger, now, solar);
    let off_time = resolve_trigger_time(&schedule.off_trigger, now, solar);
    let now_time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());

    if on_time == off_time {
        // Degenerate zero-length window
        false
    } else if on_time < off_time {
        now_time >= on_time && now_time < off_time
    } else {
        now_time >= on_time || now_time < off_time
    }
}

/// The single weather-gate implementation used by live decisions, turn-off
/// evaluation, and preview alike.
///
/// Policy when the required data is missing (weather offline, or no snapshot
/// to evaluate): the conditions count as NOT satisfied and the schedule does
/// not want ON. Heated equipment stays de-energized during a data outage
/// rather than running on guesses.
fn weather_gate(
    required: Option<&WeatherConditions>,
    current: Option<&GroupConditions>,
    weather_offline: bool,
) -> bool {
    let Some(required) = required.filter(|c| !c.is_empty()) else {
        return true;
    };
    if weather_offline {
        return false;
    }
    let Some(current) = current else {
        return false;
    };

    if let Some(max_temp) = required.max_temperature
        && current.temperature > max_temp
    {
        return false;
    }
    if required.precipitation_required && !current.precipitation_expected {
        return false;
    }
    if required.black_ice_required && !current.black_ice_risk {
        return false;
    }
    true
}
