//! Application-wide defaults and validation bounds.
//!
//! Every tunable that the configuration file can omit has its default here,
//! alongside the minimum/maximum the validator enforces. Temperatures are
//! degrees Fahrenheit, precipitation is inches, intervals are minutes unless
//! the name says otherwise.

// Decision loop

/// How often the decision loop evaluates every group (minutes).
pub const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 5;
pub const MINIMUM_CHECK_INTERVAL_MINUTES: u64 = 1;
pub const MAXIMUM_CHECK_INTERVAL_MINUTES: u64 = 60;

/// Cooldown imposed after a max-runtime shutoff (minutes).
pub const DEFAULT_COOLDOWN_MINUTES: u64 = 30;
pub const MAXIMUM_COOLDOWN_MINUTES: u64 = 24 * 60;

/// Safety ceiling on continuous runtime when a schedule does not override it (hours).
pub const DEFAULT_MAX_RUNTIME_HOURS: f64 = 8.0;
pub const MINIMUM_MAX_RUNTIME_HOURS: f64 = 0.25;
pub const MAXIMUM_MAX_RUNTIME_HOURS: f64 = 72.0;

/// Bounded wait for the weather fetch thread to finish on shutdown (seconds).
pub const SHUTDOWN_JOIN_TIMEOUT_SECS: u64 = 10;

// Weather pipeline

/// Healthy forecast refresh cadence (minutes).
pub const DEFAULT_REFRESH_INTERVAL_MINUTES: u64 = 30;
pub const MINIMUM_REFRESH_INTERVAL_MINUTES: u64 = 5;
pub const MAXIMUM_REFRESH_INTERVAL_MINUTES: u64 = 6 * 60;

/// First retry interval after a fetch failure (minutes).
pub const DEFAULT_BACKOFF_FLOOR_MINUTES: u64 = 2;
/// Retry interval ceiling (minutes).
pub const DEFAULT_BACKOFF_CAP_MINUTES: u64 = 60;

/// How long cached forecast data keeps feeding decisions after the provider
/// goes dark (hours).
pub const DEFAULT_CACHE_MAX_AGE_HOURS: f64 = 6.0;
pub const MINIMUM_CACHE_MAX_AGE_HOURS: f64 = 1.0;
pub const MAXIMUM_CACHE_MAX_AGE_HOURS: f64 = 48.0;

/// Forecast horizon requested from the provider and kept in the cache (hours).
pub const DEFAULT_FORECAST_HORIZON_HOURS: u32 = 24;
pub const MINIMUM_FORECAST_HORIZON_HOURS: u32 = 3;
pub const MAXIMUM_FORECAST_HORIZON_HOURS: u32 = 72;

/// Window scanned ahead for precipitation and black-ice conditions (hours).
pub const DEFAULT_CONDITION_LOOKAHEAD_HOURS: u32 = 6;

/// Cache saved for a location this far from the configured one is discarded
/// (degrees latitude/longitude).
pub const LOCATION_MATCH_TOLERANCE_DEGREES: f64 = 0.05;

// Weather thresholds (Fahrenheit / inches / percent)

/// Precipitation only matters for mats when it can freeze; forecast
/// precipitation above this temperature is ignored.
pub const DEFAULT_PRECIPITATION_TEMP_THRESHOLD_F: f64 = 38.0;
/// Minimum forecast precipitation amount that counts as "precipitation expected".
pub const PRECIPITATION_MIN_AMOUNT_IN: f64 = 0.01;

pub const DEFAULT_BLACK_ICE_MAX_TEMP_F: f64 = 36.0;
pub const DEFAULT_BLACK_ICE_DEWPOINT_SPREAD_F: f64 = 4.0;
pub const DEFAULT_BLACK_ICE_MIN_HUMIDITY_PCT: f64 = 80.0;

pub const MINIMUM_TEMP_THRESHOLD_F: f64 = -40.0;
pub const MAXIMUM_TEMP_THRESHOLD_F: f64 = 120.0;

// Geographic bounds

pub const MINIMUM_LATITUDE: f64 = -90.0;
pub const MAXIMUM_LATITUDE: f64 = 90.0;
pub const MINIMUM_LONGITUDE: f64 = -180.0;
pub const MAXIMUM_LONGITUDE: f64 = 180.0;

// Preview

/// Step between synthetic timestamps in the schedule preview (minutes).
pub const PREVIEW_STEP_MINUTES: u64 = 15;
/// Default preview span (hours).
pub const DEFAULT_PREVIEW_HOURS: u32 = 24;
pub const MAXIMUM_PREVIEW_HOURS: u32 = 7 * 24;

// Files

pub const CONFIG_FILE_NAME: &str = "meltr.toml";
pub const LOCK_FILE_NAME: &str = "meltr.lock";
pub const RUNTIME_STATE_FILE: &str = "runtime_state.json";
pub const OVERRIDES_FILE: &str = "overrides.json";
pub const FORECAST_CACHE_FILE: &str = "forecast_cache.json";
