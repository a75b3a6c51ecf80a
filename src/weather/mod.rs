//! Weather resilience layer.
//!
//! Wraps the raw provider client behind a stable query interface that keeps
//! answering while the provider flaps. The wrapper owns the forecast cache
//! (and its on-disk copy), runs the fetch/retry loop with exponential
//! backoff, and classifies pipeline health as ONLINE, DEGRADED_USING_CACHE,
//! or OFFLINE_NO_DATA. Query methods only ever read the cache — they never
//! trigger network I/O — and return `None` when no usable data exists, which
//! is the fail-safe default the schedule evaluator builds on.

pub mod cache;
pub mod conditions;
pub mod provider;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use crate::common::constants::PRECIPITATION_MIN_AMOUNT_IN;
use crate::common::utils::format_duration;
use crate::notify::{EventKind, NotificationSink};
use crate::state::{atomic_write_json, load_json_or_default};

pub use cache::{ForecastCache, ForecastSnapshot, Location};
pub use conditions::BlackIceThresholds;
pub use provider::{RawForecastEntry, UnconfiguredProvider, WeatherProviderClient};

/// Health classification of the weather data pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResilienceState {
    /// Last fetch succeeded; cache is fresh.
    Online,
    /// Provider unreachable, but the cache is still within its validity
    /// window and keeps feeding decisions.
    DegradedUsingCache,
    /// Provider unreachable and no valid cache remains.
    OfflineNoData,
}

impl fmt::Display for ResilienceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResilienceState::Online => "ONLINE",
            ResilienceState::DegradedUsingCache => "DEGRADED_USING_CACHE",
            ResilienceState::OfflineNoData => "OFFLINE_NO_DATA",
        })
    }
}

/// Exponential retry backoff: doubles per consecutive failure, capped,
/// disarmed entirely by one success.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    floor: StdDuration,
    cap: StdDuration,
    current: Option<StdDuration>,
}

impl Backoff {
    fn new(floor: StdDuration, cap: StdDuration) -> Self {
        Self {
            floor,
            cap,
            current: None,
        }
    }

    fn on_failure(&mut self) -> StdDuration {
        let next = match self.current {
            Some(current) => (current * 2).min(self.cap),
            None => self.floor.min(self.cap),
        };
        self.current = Some(next);
        next
    }

    fn reset(&mut self) {
        self.current = None;
    }
}

/// Fixed parameters for the weather pipeline, resolved from configuration.
#[derive(Debug, Clone)]
pub struct WeatherParams {
    pub location: Location,
    pub timezone: Tz,
    pub refresh_interval: StdDuration,
    pub backoff_floor: StdDuration,
    pub backoff_cap: StdDuration,
    pub cache_max_age_hours: f64,
    pub forecast_horizon_hours: u32,
    pub location_tolerance: f64,
    pub cache_path: PathBuf,
}

struct FetchStatus {
    last_fetch_succeeded: Option<bool>,
    last_error: Option<String>,
    backoff: Backoff,
}

/// Resilience wrapper around a raw weather provider.
///
/// The fetch loop is the only writer of the cache and the status; the
/// decision loop only reads. Both sides coordinate exclusively through this
/// struct, which is why it is shared as an `Arc`.
pub struct WeatherService {
    params: WeatherParams,
    provider: Mutex<Box<dyn WeatherProviderClient>>,
    cache: RwLock<Option<ForecastCache>>,
    status: Mutex<FetchStatus>,
    notifier: Arc<dyn NotificationSink>,
}

impl WeatherService {
    /// Create the service, restoring the persisted cache when it exists and
    /// was saved for the configured location.
    pub fn new(
        params: WeatherParams,
        provider: Box<dyn WeatherProviderClient>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let restored: Option<ForecastCache> = load_json_or_default(&params.cache_path)
            .filter(|cache: &ForecastCache| {
                let matches = cache.location_matches(
                    params.location.latitude,
                    params.location.longitude,
                    params.location_tolerance,
                );
                if !matches {
                    log_warning!("Discarding forecast cache saved for a different location");
                }
                matches
            });

        if let Some(ref cache) = restored {
            log_decorated!(
                "Restored forecast cache: {} snapshots, fetched {}",
                cache.len(),
                cache.fetched_at.format("%Y-%m-%d %H:%M UTC")
            );
        }

        let backoff = Backoff::new(params.backoff_floor, params.backoff_cap);
        Self {
            params,
            provider: Mutex::new(provider),
            cache: RwLock::new(restored),
            status: Mutex::new(FetchStatus {
                last_fetch_succeeded: None,
                last_error: None,
                backoff,
            }),
            notifier,
        }
    }

    /// Current pipeline health, derived from the last fetch outcome and the
    /// cache's validity at `now`.
    pub fn resilience_state(&self, now: DateTime<Utc>) -> ResilienceState {
        let last_ok = self.status.lock().unwrap().last_fetch_succeeded;
        let cache_valid = self.cache_valid(now);
        derive_state(last_ok, cache_valid)
    }

    /// Last fetch error, for status surfaces. Never drives retries.
    pub fn last_error(&self) -> Option<String> {
        self.status.lock().unwrap().last_error.clone()
    }

    fn cache_valid(&self, now: DateTime<Utc>) -> bool {
        self.cache
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|cache| cache.is_valid(self.params.cache_max_age_hours, now))
    }

    /// One fetch attempt: on success the cache is replaced, persisted, and
    /// the backoff disarmed; on failure health degrades according to what
    /// the cache still covers. Every state change emits a notification.
    pub fn fetch_and_cache(&self, now: DateTime<Utc>) -> bool {
        let previous_state = self.resilience_state(now);

        let fetched = self
            .provider
            .lock()
            .unwrap()
            .fetch(self.params.forecast_horizon_hours)
            .and_then(|entries| {
                ForecastCache::from_raw(
                    self.params.location,
                    entries,
                    self.params.forecast_horizon_hours,
                    self.params.timezone,
                    now,
                )
            });

        match fetched {
            Ok(cache) => {
                if let Err(e) = atomic_write_json(&self.params.cache_path, &cache) {
                    log_warning!("Failed to persist forecast cache: {e}");
                }
                let snapshot_count = cache.len();
                *self.cache.write().unwrap() = Some(cache);

                let mut status = self.status.lock().unwrap();
                status.last_fetch_succeeded = Some(true);
                status.last_error = None;
                status.backoff.reset();
                drop(status);

                if previous_state != ResilienceState::Online {
                    self.notifier.notify(
                        EventKind::WeatherRecovered,
                        "Weather provider recovered",
                        &[("snapshots", snapshot_count.to_string())],
                    );
                }
                true
            }
            Err(e) => {
                let mut status = self.status.lock().unwrap();
                status.last_fetch_succeeded = Some(false);
                status.last_error = Some(e.to_string());
                let retry_in = status.backoff.on_failure();
                drop(status);

                let new_state = self.resilience_state(now);
                log_warning!("Weather fetch failed: {e}");
                log_indented!("State: {new_state}, retrying in {}", format_duration(retry_in));

                if new_state != previous_state {
                    let (kind, message) = match new_state {
                        ResilienceState::DegradedUsingCache => (
                            EventKind::WeatherDegraded,
                            "Weather provider unreachable; serving cached forecast",
                        ),
                        _ => (
                            EventKind::WeatherOffline,
                            "Weather provider unreachable and cache expired; no forecast data",
                        ),
                    };
                    self.notifier
                        .notify(kind, message, &[("error", e.to_string())]);
                }
                false
            }
        }
    }

    /// Delay until the next fetch attempt: the healthy refresh cadence, or
    /// the current backoff interval after failures.
    pub fn next_fetch_delay(&self) -> StdDuration {
        let status = self.status.lock().unwrap();
        match status.last_fetch_succeeded {
            Some(false) => status.backoff.current.unwrap_or(self.params.refresh_interval),
            _ => self.params.refresh_interval,
        }
    }

    /// Fetch loop body for the background thread. Coordinates with the rest
    /// of the process only through the cache; a hung provider never blocks
    /// scheduling. The shutdown channel interrupts the inter-fetch sleep.
    pub fn run_fetch_loop(&self, shutdown: Receiver<()>) {
        loop {
            let now = crate::time_source::now().with_timezone(&Utc);
            self.fetch_and_cache(now);

            match shutdown.recv_timeout(self.next_fetch_delay()) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    /// Conditions closest to `now`, or `None` without usable data.
    pub fn current_conditions(&self, now: DateTime<Utc>) -> Option<ForecastSnapshot> {
        if !self.cache_valid(now) {
            return None;
        }
        let cache = self.cache.read().unwrap();
        cache.as_ref().and_then(|c| c.get_at(now).cloned())
    }

    /// Whether freezing precipitation is expected within the next `hours`:
    /// any cached snapshot in the window with measurable precipitation at or
    /// below `temp_threshold_f`. `None` without usable data in the window.
    pub fn precipitation_forecast(
        &self,
        now: DateTime<Utc>,
        hours: u32,
        temp_threshold_f: f64,
    ) -> Option<bool> {
        self.scan_window(now, hours, |snapshot| {
            snapshot.precipitation >= PRECIPITATION_MIN_AMOUNT_IN
                && snapshot.temperature <= temp_threshold_f
        })
    }

    /// Whether black-ice conditions are forecast within the next `hours`.
    /// `None` without usable data in the window.
    pub fn black_ice_forecast(
        &self,
        now: DateTime<Utc>,
        hours: u32,
        thresholds: &BlackIceThresholds,
    ) -> Option<bool> {
        self.scan_window(now, hours, |snapshot| {
            conditions::black_ice_risk(snapshot, thresholds)
        })
    }

    fn scan_window(
        &self,
        now: DateTime<Utc>,
        hours: u32,
        predicate: impl Fn(&ForecastSnapshot) -> bool,
    ) -> Option<bool> {
        if !self.cache_valid(now) {
            return None;
        }
        let cache = self.cache.read().unwrap();
        let cache = cache.as_ref()?;
        let end = now + Duration::hours(hours as i64);
        let mut any_snapshot = false;
        let mut matched = false;
        for snapshot in cache.snapshots_between(now, end) {
            any_snapshot = true;
            if predicate(snapshot) {
                matched = true;
                break;
            }
        }
        // An empty window is "no data", not "no risk"
        any_snapshot.then_some(matched)
    }
}

fn derive_state(last_fetch_succeeded: Option<bool>, cache_valid: bool) -> ResilienceState {
    match (last_fetch_succeeded, cache_valid) {
        (Some(true), _) => ResilienceState::Online,
        (_, true) => ResilienceState::DegradedUsingCache,
        (_, false) => ResilienceState::OfflineNoData,
    }
}
