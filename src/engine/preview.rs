//! Offline schedule preview.
//!
//! Replays the turn-on decision at synthetic future timestamps, stepped at a
//! fixed increment, and coalesces consecutive steps with the same state and
//! reason into display windows. Reads nothing but the forecast cache: no
//! device commands, no network I/O, no state mutation, which is what makes
//! it safe to run from the command channel or a plain CLI invocation.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use crate::config::{GroupSettings, WeatherSettings};
use crate::geo::SolarCalculator;
use crate::schedule::evaluator::should_turn_on;
use crate::weather::WeatherService;

use super::conditions_at;

/// One coalesced span of identical decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub energize: bool,
    pub reason: String,
}

/// Predict a group's on/off windows from `start` for `hours`.
///
/// `vacation` is the group's effective vacation flag at prediction time;
/// the preview holds it constant across the span.
pub fn predict_windows(
    group: &GroupSettings,
    weather: &WeatherService,
    weather_settings: &WeatherSettings,
    solar: &SolarCalculator,
    vacation: bool,
    start: DateTime<Tz>,
    hours: u32,
    step_minutes: u64,
) -> Vec<PreviewWindow> {
    let step = Duration::minutes(step_minutes as i64);
    let end = start + Duration::hours(hours as i64);

    let mut windows: Vec<PreviewWindow> = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let conditions = conditions_at(weather, weather_settings, cursor.with_timezone(&chrono::Utc));
        let decision = should_turn_on(
            &group.schedules,
            cursor,
            conditions.as_ref(),
            conditions.is_none(),
            vacation,
            solar,
        );

        match windows.last_mut() {
            Some(last) if last.energize == decision.energize && last.reason == decision.reason => {
                last.end = cursor + step;
            }
            _ => windows.push(PreviewWindow {
                start: cursor,
                end: cursor + step,
                energize: decision.energize,
                reason: decision.reason,
            }),
        }

        cursor += step;
    }

    // Clamp the final window to the requested span
    if let Some(last) = windows.last_mut()
        && last.end > end
    {
        last.end = end;
    }

    windows
}
