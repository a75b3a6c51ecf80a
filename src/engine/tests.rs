use super::commands::{ControlCommand, ControlResponse};
use super::preview::predict_windows;
use super::*;
use crate::device::{DeviceError, DeviceTarget, MockDeviceGroupManager};
use crate::config::DecisionSettings;
use crate::notify::test_support::RecordingSink;
use crate::schedule::{Priority, Schedule, Trigger, parse_weekdays};
use crate::state::overrides::AutomationFlag;
use crate::weather::{BlackIceThresholds, RawForecastEntry, WeatherParams, WeatherProviderClient};
use anyhow::anyhow;
use chrono::TimeZone;
use std::sync::mpsc::{Sender, channel};
use std::time::Duration as StdDuration;

struct NullProvider;

impl WeatherProviderClient for NullProvider {
    fn fetch(&mut self, _hours_ahead: u32) -> anyhow::Result<Vec<RawForecastEntry>> {
        Err(anyhow!("no provider in tests"))
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Tz> {
    // 2024-01-10 is a Wednesday
    chrono_tz::America::Denver
        .with_ymd_and_hms(2024, 1, 10, hour, minute, 0)
        .unwrap()
}

fn schedule(name: &str, on: &str, off: &str) -> Schedule {
    Schedule {
        name: name.to_string(),
        enabled: true,
        priority: Priority::Normal,
        weekdays: parse_weekdays(&[1, 2, 3, 4, 5, 6, 7]).unwrap(),
        on_trigger: Trigger::parse(on).unwrap(),
        off_trigger: Trigger::parse(off).unwrap(),
        conditions: None,
        max_runtime_hours: None,
    }
}

fn group(name: &str, schedules: Vec<Schedule>) -> GroupSettings {
    GroupSettings {
        name: name.to_string(),
        targets: vec![DeviceTarget::WholeDevice {
            device: "plug-1".to_string(),
        }],
        automation: AutomationSettings::default(),
        schedules,
    }
}

fn settings(groups: Vec<GroupSettings>) -> Arc<Settings> {
    Arc::new(Settings {
        latitude: 39.7392,
        longitude: -104.9903,
        timezone: chrono_tz::America::Denver,
        weather: WeatherSettings {
            refresh_interval: StdDuration::from_secs(1800),
            backoff_floor: StdDuration::from_secs(120),
            backoff_cap: StdDuration::from_secs(3600),
            cache_max_age_hours: 6.0,
            forecast_horizon_hours: 24,
            condition_lookahead_hours: 6,
            precipitation_temp_threshold_f: 38.0,
            black_ice: BlackIceThresholds {
                max_temp_f: 36.0,
                dewpoint_spread_f: 4.0,
                min_humidity_pct: 80.0,
            },
        },
        decision: DecisionSettings {
            check_interval: StdDuration::from_secs(300),
            cooldown_minutes: 30,
            max_runtime_hours: 8.0,
        },
        groups,
    })
}

struct Harness {
    engine: Engine,
    sink: Arc<RecordingSink>,
    _events_tx: Sender<EngineEvent>,
    _dir: tempfile::TempDir,
}

fn harness(groups: Vec<GroupSettings>, devices: MockDeviceGroupManager) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let sink = Arc::new(RecordingSink::default());
    let settings = settings(groups);

    let weather = Arc::new(crate::weather::WeatherService::new(
        WeatherParams {
            location: crate::weather::Location {
                latitude: settings.latitude,
                longitude: settings.longitude,
            },
            timezone: settings.timezone,
            refresh_interval: settings.weather.refresh_interval,
            backoff_floor: settings.weather.backoff_floor,
            backoff_cap: settings.weather.backoff_cap,
            cache_max_age_hours: settings.weather.cache_max_age_hours,
            forecast_horizon_hours: settings.weather.forecast_horizon_hours,
            location_tolerance: 0.05,
            cache_path: dir.path().join("forecast_cache.json"),
        },
        Box::new(NullProvider),
        sink.clone(),
    ));

    let (events_tx, events_rx) = channel();
    let engine = Engine::new(EngineParams {
        settings,
        devices: Box::new(devices),
        weather,
        notifier: sink.clone(),
        runtime: RuntimeStateStore::load(dir.path().join("runtime_state.json")),
        overrides: OverrideStore::load(dir.path().join("overrides.json")),
        events: events_rx,
        running: Arc::new(AtomicBool::new(true)),
    })
    .unwrap();

    Harness {
        engine,
        sink,
        _events_tx: events_tx,
        _dir: dir,
    }
}

#[test]
fn turns_on_when_a_schedule_is_active() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(false));
    devices.expect_turn_on().times(1).returning(|_, _| Ok(()));

    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups.clone(), devices);

    h.engine.evaluate_group(&groups[0], at(10, 0));

    assert!(h.engine.runtime.device_on("walk"));
    let events = h.sink.events.lock().unwrap();
    assert!(events.iter().any(|(k, _)| *k == EventKind::GroupEnergized));
}

#[test]
fn bookkeeping_precedes_a_failing_turn_on_command() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(false));
    devices.expect_turn_on().times(1).returning(|_, _| {
        Err(DeviceError::Unreachable {
            device: "plug-1".to_string(),
            detail: "timeout".to_string(),
        })
    });

    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups.clone(), devices);

    h.engine.evaluate_group(&groups[0], at(10, 0));

    // mark_on happened before the command was attempted
    assert!(h.engine.runtime.device_on("walk"));
    let events = h.sink.events.lock().unwrap();
    assert!(events.iter().any(|(k, _)| *k == EventKind::DeviceFailure));
}

#[test]
fn turns_off_when_no_schedule_wants_on() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(true));
    devices.expect_turn_off().times(1).returning(|_, _| Ok(()));

    let groups = vec![group("walk", vec![schedule("morning", "06:00", "09:00")])];
    let mut h = harness(groups.clone(), devices);
    h.engine.runtime.mark_on("walk", at(6, 0).with_timezone(&Utc));

    h.engine.evaluate_group(&groups[0], at(12, 0));

    assert!(!h.engine.runtime.device_on("walk"));
}

#[test]
fn failed_turn_off_keeps_bookkeeping_running() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(true));
    devices.expect_turn_off().times(1).returning(|_, _| {
        Err(DeviceError::CommandRejected {
            device: "plug-1".to_string(),
            detail: "busy".to_string(),
        })
    });

    let groups = vec![group("walk", vec![schedule("morning", "06:00", "09:00")])];
    let mut h = harness(groups.clone(), devices);
    h.engine.runtime.mark_on("walk", at(6, 0).with_timezone(&Utc));

    h.engine.evaluate_group(&groups[0], at(12, 0));

    // Off was not confirmed, so the group still counts as running
    assert!(h.engine.runtime.device_on("walk"));
}

#[test]
fn one_groups_device_failure_never_aborts_the_cycle() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|name, _| {
        if name == "broken" {
            Err(DeviceError::Unreachable {
                device: "plug-broken".to_string(),
                detail: "refused".to_string(),
            })
        } else {
            Ok(false)
        }
    });
    devices
        .expect_turn_on()
        .times(1)
        .withf(|name, _| name == "healthy")
        .returning(|_, _| Ok(()));

    let groups = vec![
        group("broken", vec![schedule("all-day", "00:00", "23:59")]),
        group("healthy", vec![schedule("all-day", "00:00", "23:59")]),
    ];
    let mut h = harness(groups, devices);

    h.engine.run_cycle(at(10, 0));

    assert!(h.engine.runtime.device_on("healthy"));
    assert!(!h.engine.runtime.device_on("broken"));
}

#[test]
fn live_device_state_overrules_persisted_belief() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(true));

    // Belief says off, device says on, schedule still wants on: reconcile
    // without issuing any command
    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups.clone(), devices);

    h.engine.evaluate_group(&groups[0], at(10, 0));
    assert!(h.engine.runtime.device_on("walk"));
}

#[test]
fn manual_override_pins_group_against_static_mismatch() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(false));
    // No turn_on expectation: any call would panic the mock

    let groups = vec![group("walk", vec![schedule("evening", "17:00", "23:00")])];
    let mut h = harness(groups.clone(), devices);

    // Override installed at 16:00 while the schedule is dormant
    h.engine.overrides.set_manual(
        "walk",
        OverrideAction::Off,
        8.0,
        at(16, 0).with_timezone(&Utc),
    );

    // 18:00 differs from the override's state, but the 17:00 boundary lies
    // outside the (17:55, 18:00] transition window: the override holds
    h.engine.evaluate_group(&groups[0], at(18, 0));
    assert!(
        h.engine
            .overrides
            .manual_override("walk", at(18, 0).with_timezone(&Utc))
            .is_some()
    );
}

#[test]
fn manual_override_clears_exactly_at_schedule_boundary() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(false));
    devices.expect_turn_on().times(1).returning(|_, _| Ok(()));

    let groups = vec![group("walk", vec![schedule("evening", "17:00", "23:00")])];
    let mut h = harness(groups.clone(), devices);

    h.engine.overrides.set_manual(
        "walk",
        OverrideAction::Off,
        8.0,
        at(16, 0).with_timezone(&Utc),
    );

    // 16:59 cycle: no boundary crossed yet, override stays, group skipped
    h.engine.evaluate_group(&groups[0], at(16, 59));
    assert!(
        h.engine
            .overrides
            .manual_override("walk", at(16, 59).with_timezone(&Utc))
            .is_some()
    );
    assert!(!h.engine.runtime.device_on("walk"));

    // 17:00 cycle: recommendation flipped within the last check interval;
    // the override clears and the schedule takes over in the same cycle
    h.engine.evaluate_group(&groups[0], at(17, 0));
    assert!(
        h.engine
            .overrides
            .manual_override("walk", at(17, 0).with_timezone(&Utc))
            .is_none()
    );
    assert!(h.engine.runtime.device_on("walk"));
}

#[test]
fn cooldown_blocks_turn_on_until_elapsed() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(false));
    devices.expect_turn_on().times(1).returning(|_, _| Ok(()));

    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups.clone(), devices);

    h.engine
        .runtime
        .start_cooldown("walk", at(9, 50).with_timezone(&Utc));

    // 20 minutes into a 30 minute cooldown: no command
    h.engine.evaluate_group(&groups[0], at(10, 10));
    assert!(!h.engine.runtime.device_on("walk"));

    // Past the window: turn-on proceeds
    h.engine.evaluate_group(&groups[0], at(10, 25));
    assert!(h.engine.runtime.device_on("walk"));
}

#[test]
fn max_runtime_shutoff_stamps_a_cooldown() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(true));
    devices.expect_turn_off().times(1).returning(|_, _| Ok(()));

    let mut limited = schedule("all-day", "00:00", "23:59");
    limited.max_runtime_hours = Some(1.0);
    let groups = vec![group("walk", vec![limited])];
    let mut h = harness(groups.clone(), devices);

    h.engine.runtime.mark_on("walk", at(8, 0).with_timezone(&Utc));

    h.engine.evaluate_group(&groups[0], at(10, 0));

    assert!(!h.engine.runtime.device_on("walk"));
    assert!(h.engine.runtime.get("walk").cooldown_start.is_some());
}

#[test]
fn automation_disabled_turns_the_group_off() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(true));
    devices.expect_turn_off().times(1).returning(|_, _| Ok(()));

    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups.clone(), devices);

    h.engine.runtime.mark_on("walk", at(8, 0).with_timezone(&Utc));
    h.engine
        .overrides
        .set_automation("walk", AutomationFlag::Enabled, Some(false));

    h.engine.evaluate_group(&groups[0], at(10, 0));
    assert!(!h.engine.runtime.device_on("walk"));
}

#[test]
fn vacation_mode_blocks_turn_on() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_get_state().returning(|_, _| Ok(false));

    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups.clone(), devices);

    h.engine
        .overrides
        .set_automation("walk", AutomationFlag::VacationMode, Some(true));

    h.engine.evaluate_group(&groups[0], at(10, 0));
    assert!(!h.engine.runtime.device_on("walk"));
}

#[test]
fn control_status_reports_and_rejects_unknown_groups() {
    let devices = MockDeviceGroupManager::new();
    let groups = vec![group("walk", vec![schedule("all-day", "00:00", "23:59")])];
    let mut h = harness(groups, devices);

    match h.engine.handle_control(ControlCommand::GroupStatus {
        group: "walk".to_string(),
    }) {
        ControlResponse::Status(report) => {
            assert_eq!(report.group, "walk");
            assert!(!report.device_on);
            assert_eq!(report.weather_state, "OFFLINE_NO_DATA");
        }
        other => panic!("unexpected response: {other:?}"),
    }

    match h.engine.handle_control(ControlCommand::GroupStatus {
        group: "nope".to_string(),
    }) {
        ControlResponse::Error(_) => {}
        other => panic!("unexpected response: {other:?}"),
    }
}

#[test]
fn manual_override_command_applies_immediately() {
    let mut devices = MockDeviceGroupManager::new();
    devices.expect_turn_on().times(1).returning(|_, _| Ok(()));

    let groups = vec![group("walk", vec![])];
    let mut h = harness(groups, devices);

    let response = h.engine.handle_control(ControlCommand::SetManualOverride {
        group: "walk".to_string(),
        action: OverrideAction::On,
        timeout_hours: 2.0,
    });
    assert!(matches!(response, ControlResponse::Ack));
    assert!(h.engine.runtime.device_on("walk"));
}

#[test]
fn preview_coalesces_same_reason_steps_into_windows() {
    let groups = vec![group("walk", vec![schedule("morning", "06:00", "09:00")])];
    let h = harness(groups.clone(), MockDeviceGroupManager::new());

    let start = at(0, 0);
    let windows = predict_windows(
        &groups[0],
        &h.engine.weather,
        &h.engine.settings.weather,
        &h.engine.solar,
        false,
        start,
        24,
        15,
    );

    assert_eq!(windows.len(), 3);
    assert!(!windows[0].energize);
    assert_eq!(windows[0].reason, "no_active_schedule");
    assert!(windows[1].energize);
    assert_eq!(windows[1].reason, "morning");
    assert_eq!(windows[1].start, at(6, 0));
    assert_eq!(windows[1].end, at(9, 0));
    assert!(!windows[2].energize);

    // Windows tile the requested span exactly
    assert_eq!(windows.first().unwrap().start, start);
    assert_eq!(windows.last().unwrap().end, start + chrono::Duration::hours(24));
    for pair in windows.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}
