//! Weather provider port.
//!
//! The HTTP client for the actual forecast service lives outside this crate.
//! Providers deliver hourly entries with naive timestamps expressed in the
//! forecast location's local time; the cache is responsible for tagging them
//! with the configured zone before any comparison against "now".

use anyhow::Result;
use chrono::NaiveDateTime;
use serde::Deserialize;

/// One hourly forecast entry as delivered by a provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawForecastEntry {
    /// Naive local time at the forecast location.
    pub time: NaiveDateTime,
    /// Temperature (°F).
    pub temperature: f64,
    /// Expected precipitation amount (inches).
    pub precipitation: f64,
    /// Dew point (°F), when the provider supplies it.
    pub dew_point: Option<f64>,
    /// Relative humidity (percent), when the provider supplies it.
    pub humidity: Option<f64>,
}

/// Port to the raw forecast service.
pub trait WeatherProviderClient: Send {
    /// Fetch hourly entries covering the next `hours_ahead` hours.
    fn fetch(&mut self, hours_ahead: u32) -> Result<Vec<RawForecastEntry>>;
}

/// Placeholder provider used when no forecast client is wired in.
///
/// Every fetch fails, which the resilience layer reports as
/// DEGRADED_USING_CACHE or OFFLINE_NO_DATA; weather-gated schedules then
/// stay off per the fail-safe policy while time-based schedules keep
/// working.
pub struct UnconfiguredProvider;

impl WeatherProviderClient for UnconfiguredProvider {
    fn fetch(&mut self, _hours_ahead: u32) -> Result<Vec<RawForecastEntry>> {
        Err(anyhow::anyhow!("no weather provider configured"))
    }
}
