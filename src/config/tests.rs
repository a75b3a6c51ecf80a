use super::validation::resolve;
use super::*;
use crate::device::DeviceTarget;
use crate::schedule::{Priority, Trigger};
use serial_test::serial;
use std::time::Duration as StdDuration;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "America/Denver"

[weather]
refresh_interval_minutes = 20
backoff_floor_minutes = 1
backoff_cap_minutes = 30
cache_max_age_hours = 4.0
forecast_horizon_hours = 24
condition_lookahead_hours = 6
precipitation_temp_threshold = 38.0

[weather.black_ice]
max_temp = 36.0
dewpoint_spread = 4.0
min_humidity = 80.0

[decision]
check_interval_minutes = 5
cooldown_minutes = 30
max_runtime_hours = 8.0

[[group]]
name = "front-walk"
targets = ["plug-1", "strip-2:0"]

[group.automation]
enabled = true
vacation_mode = false

[[group.schedule]]
name = "overnight-freeze"
priority = "high"
days = [1, 2, 3, 4, 5]
on = "22:00"
off = "sunrise+30"
max_temperature = 36.0
precipitation = true

[[group.schedule]]
name = "evening-baseline"
on = "sunset-30"
off = "23:00"

[[group]]
name = "back-drive"
targets = ["plug-9"]
"#;

fn parse(toml_str: &str) -> Config {
    toml::from_str(toml_str).unwrap()
}

#[test]
fn full_config_parses_and_resolves() {
    let config = parse(FULL_CONFIG);
    let settings = resolve(&config).unwrap();

    assert_eq!(settings.timezone, chrono_tz::America::Denver);
    assert_eq!(settings.weather.refresh_interval, StdDuration::from_secs(20 * 60));
    assert_eq!(settings.decision.cooldown_minutes, 30);
    assert_eq!(settings.groups.len(), 2);

    let walk = settings.group("front-walk").unwrap();
    assert_eq!(
        walk.targets,
        vec![
            DeviceTarget::WholeDevice {
                device: "plug-1".to_string()
            },
            DeviceTarget::Outlet {
                device: "strip-2".to_string(),
                index: 0
            },
        ]
    );

    let freeze = &walk.schedules[0];
    assert_eq!(freeze.priority, Priority::High);
    assert_eq!(freeze.weekdays.len(), 5);
    assert!(matches!(freeze.on_trigger, Trigger::Clock(_)));
    assert!(matches!(freeze.off_trigger, Trigger::Solar { .. }));
    let conditions = freeze.conditions.as_ref().unwrap();
    assert_eq!(conditions.max_temperature, Some(36.0));
    assert!(conditions.precipitation_required);
    assert!(!conditions.black_ice_required);

    // Schedule without gate fields resolves to no weather gate at all
    assert!(walk.schedules[1].conditions.is_none());
}

#[test]
fn omitted_sections_get_defaults() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "America/Denver"
"#,
    );
    let settings = resolve(&config).unwrap();
    assert_eq!(settings.weather.refresh_interval, StdDuration::from_secs(30 * 60));
    assert_eq!(settings.weather.black_ice.max_temp_f, 36.0);
    assert_eq!(settings.decision.check_interval, StdDuration::from_secs(5 * 60));
    assert!(settings.groups.is_empty());
}

#[test]
fn timezone_derived_from_coordinates_when_omitted() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
"#,
    );
    let settings = resolve(&config).unwrap();
    assert_eq!(settings.timezone, chrono_tz::America::Denver);
}

#[test]
fn out_of_range_coordinates_are_fatal() {
    for (lat, lon) in [(91.0, 0.0), (-91.0, 0.0), (0.0, 181.0), (0.0, -181.0)] {
        let config = parse(&format!(
            "[location]\nlatitude = {lat}\nlongitude = {lon}\n"
        ));
        assert!(resolve(&config).is_err(), "accepted ({lat}, {lon})");
    }
}

#[test]
fn unknown_timezone_is_fatal() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "Mars/Olympus_Mons"
"#,
    );
    assert!(resolve(&config).is_err());
}

#[test]
fn duplicate_group_names_are_fatal() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "America/Denver"

[[group]]
name = "walk"
targets = ["plug-1"]

[[group]]
name = "walk"
targets = ["plug-2"]
"#,
    );
    assert!(resolve(&config).is_err());
}

#[test]
fn bad_trigger_strings_are_fatal() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "America/Denver"

[[group]]
name = "walk"
targets = ["plug-1"]

[[group.schedule]]
name = "broken"
on = "25:99"
off = "06:00"
"#,
    );
    let err = resolve(&config).unwrap_err();
    assert!(err.to_string().contains("walk"), "error lacks context: {err}");
}

#[test]
fn backoff_cap_below_floor_is_fatal() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "America/Denver"

[weather]
backoff_floor_minutes = 30
backoff_cap_minutes = 5
"#,
    );
    assert!(resolve(&config).is_err());
}

#[test]
fn group_without_targets_is_fatal() {
    let config = parse(
        r#"
[location]
latitude = 39.7392
longitude = -104.9903
timezone = "America/Denver"

[[group]]
name = "walk"
targets = []
"#,
    );
    assert!(resolve(&config).is_err());
}

#[test]
#[serial]
fn missing_config_creates_template_and_errors() {
    let dir = tempdir().unwrap();
    set_config_dir(dir.path().to_path_buf());

    let result = load();
    assert!(result.is_err());

    let template = dir.path().join("meltr.toml");
    assert!(template.exists());
    // The created template itself must be parseable
    let parsed = load_from_path(&template).unwrap();
    assert!(resolve(&parsed).is_ok());

    // Second load now succeeds from the template
    assert!(load().is_ok());
    set_config_dir(std::path::PathBuf::from("/nonexistent-reset"));
}

#[test]
#[serial]
fn load_from_path_reports_parse_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meltr.toml");
    std::fs::write(&path, "not = [valid").unwrap();
    assert!(load_from_path(&path).is_err());
}
