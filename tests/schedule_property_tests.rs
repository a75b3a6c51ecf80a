//! Property tests for schedule evaluation.
//!
//! The evaluator must attribute every outcome to exactly one schedule name
//! or sentinel reason, honor the priority/declaration-order tie-break, and
//! handle windows that wrap past midnight, for any combination of inputs.

use chrono::{NaiveTime, TimeZone};
use chrono_tz::Tz;
use proptest::prelude::*;

use meltr::geo::SolarCalculator;
use meltr::schedule::evaluator::{
    REASON_NO_ACTIVE_SCHEDULE, REASON_NO_SCHEDULES, REASON_VACATION_MODE, should_turn_on,
};
use meltr::schedule::{GroupConditions, Priority, Schedule, Trigger, parse_weekdays};

fn calculator() -> SolarCalculator {
    SolarCalculator::new(39.7392, -104.9903, chrono_tz::America::Denver).unwrap()
}

fn clock_schedule(name: &str, on: (u32, u32), off: (u32, u32), priority: Priority) -> Schedule {
    Schedule {
        name: name.to_string(),
        enabled: true,
        priority,
        weekdays: parse_weekdays(&[1, 2, 3, 4, 5, 6, 7]).unwrap(),
        on_trigger: Trigger::Clock(NaiveTime::from_hms_opt(on.0, on.1, 0).unwrap()),
        off_trigger: Trigger::Clock(NaiveTime::from_hms_opt(off.0, off.1, 0).unwrap()),
        conditions: None,
        max_runtime_hours: None,
    }
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Critical),
    ]
}

fn schedule_strategy(index: usize) -> impl Strategy<Value = Schedule> {
    (
        0u32..24,
        0u32..60,
        0u32..24,
        0u32..60,
        priority_strategy(),
        any::<bool>(),
        proptest::collection::btree_set(1u8..=7, 1..=7),
    )
        .prop_map(move |(on_h, on_m, off_h, off_m, priority, enabled, weekdays)| Schedule {
            name: format!("schedule-{index}"),
            enabled,
            priority,
            weekdays,
            on_trigger: Trigger::Clock(NaiveTime::from_hms_opt(on_h, on_m, 0).unwrap()),
            off_trigger: Trigger::Clock(NaiveTime::from_hms_opt(off_h, off_m, 0).unwrap()),
            conditions: None,
            max_runtime_hours: None,
        })
}

fn schedules_strategy() -> impl Strategy<Value = Vec<Schedule>> {
    (0usize..5).prop_flat_map(|count| {
        (0..count)
            .map(|i| schedule_strategy(i).boxed())
            .collect::<Vec<_>>()
    })
}

proptest! {
    /// Every decision is attributable to exactly one schedule name or one
    /// of the fixed sentinel reasons.
    #[test]
    fn reason_is_always_attributable(
        schedules in schedules_strategy(),
        day in 1u32..=28,
        hour in 0u32..24,
        minute in 0u32..60,
        vacation in any::<bool>(),
    ) {
        let now = chrono_tz::America::Denver
            .with_ymd_and_hms(2024, 1, day, hour, minute, 0)
            .unwrap();
        let decision = should_turn_on(&schedules, now, None, false, vacation, &calculator());

        let valid_names: Vec<&str> = schedules.iter().map(|s| s.name.as_str()).collect();
        let is_sentinel = [
            REASON_NO_ACTIVE_SCHEDULE,
            REASON_VACATION_MODE,
            REASON_NO_SCHEDULES,
        ]
        .contains(&decision.reason.as_str());

        prop_assert!(
            is_sentinel || valid_names.contains(&decision.reason.as_str()),
            "unattributable reason: {}",
            decision.reason
        );

        // The winner, when present, is named by the reason
        if let Some(winner) = &decision.winner {
            prop_assert_eq!(winner, &decision.reason);
            prop_assert!(decision.energize);
        }
    }

    /// Vacation mode wins over any schedule set.
    #[test]
    fn vacation_always_attributes_to_vacation(
        schedules in schedules_strategy(),
        hour in 0u32..24,
    ) {
        let now = chrono_tz::America::Denver
            .with_ymd_and_hms(2024, 1, 10, hour, 0, 0)
            .unwrap();
        let decision = should_turn_on(&schedules, now, None, false, true, &calculator());
        prop_assert!(!decision.energize);
        prop_assert_eq!(decision.reason, REASON_VACATION_MODE);
    }

    /// A day-spanning window is active exactly when the equivalent pair of
    /// same-day windows would be.
    #[test]
    fn overnight_window_matches_split_windows(
        on_hour in 13u32..24,
        off_hour in 0u32..12,
        hour in 0u32..24,
        minute in 0u32..60,
    ) {
        let spanning = vec![clock_schedule("span", (on_hour, 0), (off_hour, 0), Priority::Normal)];
        let now = chrono_tz::America::Denver
            .with_ymd_and_hms(2024, 1, 10, hour, minute, 0)
            .unwrap();
        let solar = calculator();
        let decision = should_turn_on(&spanning, now, None, false, false, &solar);

        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
        let expected = time >= NaiveTime::from_hms_opt(on_hour, 0, 0).unwrap()
            || time < NaiveTime::from_hms_opt(off_hour, 0, 0).unwrap();
        prop_assert_eq!(decision.energize, expected);
    }

    /// Between two simultaneously active schedules the higher priority
    /// always wins, regardless of declaration order.
    #[test]
    fn higher_priority_wins_in_any_order(swap in any::<bool>()) {
        let high = clock_schedule("high", (0, 0), (23, 59), Priority::High);
        let normal = clock_schedule("normal", (0, 0), (23, 59), Priority::Normal);
        let schedules = if swap {
            vec![normal.clone(), high.clone()]
        } else {
            vec![high.clone(), normal.clone()]
        };

        let now = chrono_tz::America::Denver
            .with_ymd_and_hms(2024, 1, 10, 12, 0, 0)
            .unwrap();
        let decision = should_turn_on(&schedules, now, None, false, false, &calculator());
        prop_assert_eq!(decision.winner.as_deref(), Some("high"));
    }

    /// The offline fail-safe: a weather-gated schedule never wants ON
    /// without data, whatever the gate is.
    #[test]
    fn gated_schedules_stay_off_while_offline(
        max_temp in proptest::option::of(20.0f64..60.0),
        precipitation in any::<bool>(),
        black_ice in any::<bool>(),
    ) {
        prop_assume!(max_temp.is_some() || precipitation || black_ice);
        let mut gated = clock_schedule("gated", (0, 0), (23, 59), Priority::Normal);
        gated.conditions = Some(meltr::schedule::WeatherConditions {
            max_temperature: max_temp,
            precipitation_required: precipitation,
            black_ice_required: black_ice,
        });

        let now = chrono_tz::America::Denver
            .with_ymd_and_hms(2024, 1, 10, 12, 0, 0)
            .unwrap();
        let decision = should_turn_on(&[gated], now, None, true, false, &calculator());
        prop_assert!(!decision.energize);
        prop_assert_eq!(decision.reason, REASON_NO_ACTIVE_SCHEDULE);
    }
}

/// Fixed-point checks alongside the properties.
#[test]
fn overnight_schedule_fixed_points() {
    let schedules = vec![clock_schedule("overnight", (22, 0), (6, 0), Priority::Normal)];
    let solar = calculator();

    let at = |hour: u32, minute: u32| -> chrono::DateTime<Tz> {
        chrono_tz::America::Denver
            .with_ymd_and_hms(2024, 1, 10, hour, minute, 0)
            .unwrap()
    };

    assert!(should_turn_on(&schedules, at(23, 30), None, false, false, &solar).energize);
    assert!(should_turn_on(&schedules, at(2, 0), None, false, false, &solar).energize);
    assert!(!should_turn_on(&schedules, at(12, 0), None, false, false, &solar).energize);
}

#[test]
fn satisfied_weather_gate_lets_high_priority_win() {
    let mut high = clock_schedule("storm", (0, 0), (23, 59), Priority::High);
    high.conditions = Some(meltr::schedule::WeatherConditions {
        max_temperature: Some(36.0),
        precipitation_required: true,
        black_ice_required: false,
    });
    let normal = clock_schedule("baseline", (0, 0), (23, 59), Priority::Normal);

    let conditions = GroupConditions {
        temperature: 30.0,
        precipitation_expected: true,
        black_ice_risk: false,
    };
    let now = chrono_tz::America::Denver
        .with_ymd_and_hms(2024, 1, 10, 12, 0, 0)
        .unwrap();
    let decision = should_turn_on(
        &[normal, high],
        now,
        Some(&conditions),
        false,
        false,
        &calculator(),
    );
    assert_eq!(decision.winner.as_deref(), Some("storm"));
}
