//! Configuration file discovery and loading.
//!
//! The configuration lives at `$XDG_CONFIG_HOME/meltr/meltr.toml`, with a
//! `--config <dir>` override for alternate setups. A missing file is
//! populated with a commented template and reported as an error, since a
//! placeholder location must not silently drive real relays.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Config;
use crate::common::constants::CONFIG_FILE_NAME;
use crate::common::utils::private_path;

static CUSTOM_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Install an alternate config directory (from `--config <dir>`).
pub fn set_config_dir(dir: PathBuf) {
    *CUSTOM_CONFIG_DIR.lock().unwrap() = Some(dir);
}

/// The custom config directory, if one was set.
pub fn get_custom_config_dir() -> Option<PathBuf> {
    CUSTOM_CONFIG_DIR.lock().unwrap().clone()
}

/// Resolve the directory holding `meltr.toml`.
pub fn get_config_base_dir() -> Result<PathBuf> {
    if let Some(custom) = get_custom_config_dir() {
        return Ok(custom);
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::config_dir())
        .context("Could not determine config directory")?;
    Ok(base.join("meltr"))
}

/// Full path of the configuration file.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_base_dir()?.join(CONFIG_FILE_NAME))
}

/// Load and parse the configuration from the resolved path.
///
/// When no file exists, writes the commented template and returns an error
/// directing the user to fill in their location and groups.
pub fn load() -> Result<Config> {
    let path = get_config_path()?;
    if !path.exists() {
        create_default_config(&path)?;
        return Err(anyhow!(
            "No configuration found; created a template at {}.\n\
             Edit the location and groups, then start meltr again.",
            private_path(&path)
        ));
    }
    load_from_path(&path)
}

/// Load and parse a specific configuration file.
pub fn load_from_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", private_path(path)))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", private_path(path)))?;
    Ok(config)
}

/// Write the commented default configuration template.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write default config to {}", private_path(path)))?;
    log_block_start!("Created default configuration at {}", private_path(path));
    Ok(())
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"#[Location]
# Coordinates drive sunrise/sunset triggers and the forecast request.
# timezone is optional; it is derived from the coordinates when omitted.
[location]
latitude = 39.7392
longitude = -104.9903
# timezone = "America/Denver"

#[Weather]
# All intervals in minutes, ages in hours, temperatures in °F.
[weather]
refresh_interval_minutes = 30   # healthy forecast refresh cadence
backoff_floor_minutes = 2       # first retry after a failed fetch
backoff_cap_minutes = 60        # retry interval ceiling
cache_max_age_hours = 6.0       # how long cached data keeps feeding decisions
forecast_horizon_hours = 24     # horizon requested and cached
condition_lookahead_hours = 6   # window scanned for precipitation/black ice
precipitation_temp_threshold = 38.0

[weather.black_ice]
max_temp = 36.0                 # °F
dewpoint_spread = 4.0           # °F between temperature and dew point
min_humidity = 80.0             # percent

#[Decision loop]
[decision]
check_interval_minutes = 5
cooldown_minutes = 30
max_runtime_hours = 8.0

#[Groups]
# Each group is an independently scheduled set of relay targets.
# Targets are "device" for a whole device or "device:N" for outlet N.
#
# [[group]]
# name = "front-walk"
# targets = ["plug-1"]
#
# [group.automation]
# enabled = true
# vacation_mode = false
#
# [[group.schedule]]
# name = "overnight-freeze"
# priority = "high"             # low | normal | high | critical
# days = [1, 2, 3, 4, 5, 6, 7]  # 1=Monday .. 7=Sunday
# on = "22:00"                  # HH:MM[:SS], sunrise, sunset, sunrise+30, ...
# off = "sunrise+30"
# max_temperature = 36.0        # only run at or below this °F
# precipitation = true          # only run when freezing precip is expected
# black_ice = true              # only run when black ice is forecast
# max_runtime_hours = 10.0
"#;
