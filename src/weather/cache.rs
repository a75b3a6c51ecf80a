//! Point-in-time forecast cache.
//!
//! The cache is the sole source of forecast truth across process restarts:
//! it answers "what were conditions at time T" and "how stale is this" for
//! the resilience layer, and is replaced wholesale on every successful
//! fetch.
//!
//! Provider timestamps are naive but represent local time at the configured
//! location. They are tagged with that zone before any comparison against a
//! zone-aware "now" — comparing them as naive UTC silently shifts the whole
//! forecast by the UTC offset and is the classic source of mats running at
//! the wrong hours.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::weather::provider::RawForecastEntry;

/// Coordinates a forecast was fetched for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn matches(&self, latitude: f64, longitude: f64, tolerance: f64) -> bool {
        (self.latitude - latitude).abs() <= tolerance
            && (self.longitude - longitude).abs() <= tolerance
    }
}

/// One immutable forecast point, stored as an instant (UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    pub timestamp: DateTime<Utc>,
    /// Temperature (°F).
    pub temperature: f64,
    /// Expected precipitation amount (inches).
    pub precipitation: f64,
    /// Dew point (°F) when reported.
    pub dew_point: Option<f64>,
    /// Relative humidity (percent) when reported.
    pub humidity: Option<f64>,
}

/// An ordered sequence of snapshots from a single fetch.
///
/// Invariant: every snapshot lies within [fetched_at, fetched_at + horizon],
/// enforced at construction; a build that would leave zero snapshots fails
/// so the previous cache is never overwritten with nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastCache {
    pub fetched_at: DateTime<Utc>,
    pub location: Location,
    snapshots: Vec<ForecastSnapshot>,
}

impl ForecastCache {
    /// Build a cache from raw provider entries.
    ///
    /// Entries are tagged with the location's zone, converted to instants,
    /// filtered to [now, now + horizon], and sorted. Local times that do not
    /// exist on a DST transition day are skipped; ambiguous ones resolve to
    /// the earlier instant.
    pub fn from_raw(
        location: Location,
        entries: Vec<RawForecastEntry>,
        horizon_hours: u32,
        timezone: Tz,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let horizon_end = now + Duration::hours(horizon_hours as i64);

        let mut snapshots: Vec<ForecastSnapshot> = entries
            .into_iter()
            .filter_map(|entry| {
                let zoned = timezone.from_local_datetime(&entry.time).earliest()?;
                let timestamp = zoned.with_timezone(&Utc);
                if timestamp < now || timestamp > horizon_end {
                    return None;
                }
                Some(ForecastSnapshot {
                    timestamp,
                    temperature: entry.temperature,
                    precipitation: entry.precipitation,
                    dew_point: entry.dew_point,
                    humidity: entry.humidity,
                })
            })
            .collect();

        if snapshots.is_empty() {
            return Err(anyhow!(
                "No forecast entries within the next {horizon_hours}h; keeping previous cache"
            ));
        }
        snapshots.sort_by_key(|s| s.timestamp);

        Ok(Self {
            fetched_at: now,
            location,
            snapshots,
        })
    }

    /// The single snapshot closest in time to `target`, if any.
    pub fn get_at(&self, target: DateTime<Utc>) -> Option<&ForecastSnapshot> {
        self.snapshots
            .iter()
            .min_by_key(|s| (s.timestamp - target).abs())
    }

    /// Snapshots within [start, end], in time order.
    pub fn snapshots_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &ForecastSnapshot> {
        self.snapshots
            .iter()
            .filter(move |s| s.timestamp >= start && s.timestamp <= end)
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.fetched_at).num_seconds().max(0) as f64 / 3600.0
    }

    pub fn is_valid(&self, max_age_hours: f64, now: DateTime<Utc>) -> bool {
        self.age_hours(now) <= max_age_hours
    }

    /// Guard against serving a cache persisted for a different configured
    /// location.
    pub fn location_matches(&self, latitude: f64, longitude: f64, tolerance: f64) -> bool {
        self.location.matches(latitude, longitude, tolerance)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
