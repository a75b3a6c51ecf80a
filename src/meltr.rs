//! Application coordinator managing the complete daemon lifecycle.
//!
//! This module handles resource acquisition, initialization, and
//! orchestration of the decision loop:
//! - Configuration loading and resolution
//! - Lock file management for single-instance enforcement
//! - Signal handler setup
//! - Persisted state restoration (runtime, overrides, forecast cache)
//! - Spawning the background weather fetch thread
//! - Running the engine, then winding everything down with a bounded join
//!
//! The `Meltr` struct uses a builder pattern so embedders can wire in real
//! device/weather/notification clients while the stock binary falls back to
//! the virtual device manager and an unconfigured provider.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::time::{Duration as StdDuration, Instant};

use crate::common::constants::{
    DEFAULT_PREVIEW_HOURS, FORECAST_CACHE_FILE, LOCATION_MATCH_TOLERANCE_DEGREES, OVERRIDES_FILE,
    PREVIEW_STEP_MINUTES, RUNTIME_STATE_FILE, SHUTDOWN_JOIN_TIMEOUT_SECS,
};
use crate::config::{self, Settings};
use crate::device::{DeviceGroupManager, VirtualDeviceManager};
use crate::engine::{Engine, EngineParams, preview};
use crate::geo::SolarCalculator;
use crate::io::lock::acquire_lock;
use crate::io::signals::setup_signal_handler;
use crate::notify::{LogNotifier, NotificationSink};
use crate::state::overrides::OverrideStore;
use crate::state::runtime::RuntimeStateStore;
use crate::weather::{
    Location, UnconfiguredProvider, WeatherParams, WeatherProviderClient, WeatherService,
};

/// Builder for configuring and running the meltr daemon.
///
/// # Examples
///
/// ```no_run
/// use meltr::Meltr;
///
/// # fn main() -> anyhow::Result<()> {
/// // Stock daemon with the virtual device manager
/// Meltr::new(false).run()?;
/// # Ok(())
/// # }
/// ```
pub struct Meltr {
    debug_enabled: bool,
    create_lock: bool,
    devices: Option<Box<dyn DeviceGroupManager>>,
    provider: Option<Box<dyn WeatherProviderClient>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl Meltr {
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            create_lock: true,
            devices: None,
            provider: None,
            notifier: None,
        }
    }

    /// Skip lock file creation (simulation and test contexts).
    pub fn without_lock(mut self) -> Self {
        self.create_lock = false;
        self
    }

    /// Wire in the real relay-control client.
    pub fn with_devices(mut self, devices: Box<dyn DeviceGroupManager>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Wire in the real weather provider client.
    pub fn with_provider(mut self, provider: Box<dyn WeatherProviderClient>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Wire in a notification transport.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Execute the daemon until shutdown.
    pub fn run(self) -> Result<()> {
        let config = config::load()?;
        let settings = Arc::new(config::resolve(&config)?);
        settings.log_settings();

        if self.debug_enabled {
            log_solar_debug(&settings)?;
        }

        let lock = if self.create_lock {
            match acquire_lock()? {
                Some(guard) => Some(guard),
                None => return Err(anyhow!("another instance is already running")),
            }
        } else {
            None
        };

        let state_dir = crate::state::get_state_dir()?;
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(LogNotifier) as Arc<dyn NotificationSink>);
        let devices = self.devices.unwrap_or_else(|| {
            log_decorated!("No device client wired in; using the virtual device manager");
            Box::new(VirtualDeviceManager::new())
        });
        let provider = self
            .provider
            .unwrap_or_else(|| Box::new(UnconfiguredProvider));

        let weather = Arc::new(WeatherService::new(
            weather_params(&settings, state_dir.join(FORECAST_CACHE_FILE)),
            provider,
            notifier.clone(),
        ));

        let (events_tx, events_rx) = channel();
        let signal_state = setup_signal_handler(events_tx)?;

        // Independent fetch cadence: a slow provider never blocks scheduling
        let (fetch_stop_tx, fetch_stop_rx) = channel();
        let fetch_weather = weather.clone();
        let fetch_handle = std::thread::Builder::new()
            .name("weather-fetch".to_string())
            .spawn(move || fetch_weather.run_fetch_loop(fetch_stop_rx))
            .context("Failed to spawn weather fetch thread")?;

        let engine = Engine::new(EngineParams {
            settings,
            devices,
            weather,
            notifier,
            runtime: RuntimeStateStore::load(state_dir.join(RUNTIME_STATE_FILE)),
            overrides: OverrideStore::load(state_dir.join(OVERRIDES_FILE)),
            events: events_rx,
            running: signal_state.running.clone(),
        })?;

        let result = engine.run();

        // Wind down the fetch thread, bounded so a hung provider cannot
        // stall shutdown
        log_block_start!("Shutting down meltr...");
        let _ = fetch_stop_tx.send(());
        let deadline = Instant::now() + StdDuration::from_secs(SHUTDOWN_JOIN_TIMEOUT_SECS);
        while !fetch_handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(50));
        }
        if fetch_handle.is_finished() {
            let _ = fetch_handle.join();
        } else {
            log_warning!("Weather fetch thread still busy after timeout; detaching");
        }

        signal_state.finish();
        drop(lock);
        log_end!();

        result
    }
}

fn weather_params(settings: &Settings, cache_path: std::path::PathBuf) -> WeatherParams {
    WeatherParams {
        location: Location {
            latitude: settings.latitude,
            longitude: settings.longitude,
        },
        timezone: settings.timezone,
        refresh_interval: settings.weather.refresh_interval,
        backoff_floor: settings.weather.backoff_floor,
        backoff_cap: settings.weather.backoff_cap,
        cache_max_age_hours: settings.weather.cache_max_age_hours,
        forecast_horizon_hours: settings.weather.forecast_horizon_hours,
        location_tolerance: LOCATION_MATCH_TOLERANCE_DEGREES,
        cache_path,
    }
}

fn log_solar_debug(settings: &Settings) -> Result<()> {
    let solar = SolarCalculator::new(settings.latitude, settings.longitude, settings.timezone)?;
    let today = crate::time_source::now()
        .with_timezone(&settings.timezone)
        .date_naive();
    let (sunrise, sunset) = solar.sun_times(today);
    log_pipe!();
    log_debug!("Solar times for {today}:");
    log_indented!("Sunrise: {}", sunrise.format("%H:%M:%S"));
    log_indented!(" Sunset: {}", sunset.format("%H:%M:%S"));
    Ok(())
}

/// Offline schedule preview for one group, printed to the log.
///
/// Loads configuration and the persisted forecast cache, performs no device
/// or network I/O, and never touches the running instance.
pub fn run_preview(group_name: &str, hours: Option<u32>) -> Result<()> {
    let config = config::load()?;
    let settings = config::resolve(&config)?;
    let hours = hours.unwrap_or(DEFAULT_PREVIEW_HOURS);

    let group = settings
        .group(group_name)
        .ok_or_else(|| anyhow!("unknown group '{group_name}'"))?;

    let solar = SolarCalculator::new(settings.latitude, settings.longitude, settings.timezone)?;
    let state_dir = crate::state::get_state_dir()?;
    let weather = WeatherService::new(
        weather_params(&settings, state_dir.join(FORECAST_CACHE_FILE)),
        Box::new(UnconfiguredProvider),
        Arc::new(LogNotifier),
    );

    let overrides = OverrideStore::load(state_dir.join(OVERRIDES_FILE));
    let automation = overrides.merged_automation(group_name, group.automation);

    let start = crate::time_source::now().with_timezone(&settings.timezone);
    let windows = preview::predict_windows(
        group,
        &weather,
        &settings.weather,
        &solar,
        automation.vacation_mode,
        start,
        hours,
        PREVIEW_STEP_MINUTES,
    );

    let now_utc = crate::time_source::now().with_timezone(&Utc);
    log_block_start!(
        "Schedule preview for '{group_name}' over the next {hours}h (weather: {})",
        weather.resilience_state(now_utc)
    );
    for window in &windows {
        log_indented!(
            "{} → {}  {}  ({})",
            window.start.format("%a %H:%M"),
            window.end.format("%a %H:%M"),
            if window.energize { "ON " } else { "off" },
            window.reason
        );
    }
    log_end!();
    Ok(())
}

/// Signal the running instance to shut down.
pub fn run_stop() -> Result<()> {
    let pid = crate::io::lock::read_lock_pid()
        .ok_or_else(|| anyhow!("no running meltr instance found"))?;

    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(pid as i32),
        nix::sys::signal::Signal::SIGTERM,
    )
    .with_context(|| format!("failed to signal pid {pid}"))?;

    log_block_start!("Sent shutdown request to meltr (pid {pid})");
    log_end!();
    Ok(())
}
