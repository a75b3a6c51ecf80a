//! Sunrise/sunset calculation for the configured coordinates.
//!
//! Solar-relative schedule triggers ("sunrise+30", "sunset-15") need concrete
//! clock times for a given date. The calculator resolves them in the
//! location's own timezone, keeping full date and timezone information all
//! the way through so day boundaries and DST transitions cannot corrupt the
//! comparison against "now".

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use sunrise::{Coordinates, SolarDay, SolarEvent};
use tzf_rs::DefaultFinder;

use crate::schedule::SolarAnchor;

static TZ_FINDER: Lazy<DefaultFinder> = Lazy::new(DefaultFinder::new);

/// Resolve the IANA timezone for a pair of coordinates.
///
/// Falls back to UTC for coordinates the boundary data cannot place
/// (open ocean, poles). Used when the configuration omits an explicit
/// `timezone` key.
pub fn timezone_for_coordinates(latitude: f64, longitude: f64) -> Tz {
    let name = TZ_FINDER.get_tz_name(longitude, latitude);
    name.parse().unwrap_or(Tz::UTC)
}

/// Sunrise/sunset calculator bound to a fixed location and timezone.
///
/// Holds no mutable state; a single instance is shared by the schedule
/// evaluator and the preview generator across threads.
#[derive(Debug, Clone)]
pub struct SolarCalculator {
    coord: Coordinates,
    timezone: Tz,
}

impl SolarCalculator {
    pub fn new(latitude: f64, longitude: f64, timezone: Tz) -> Result<Self> {
        let coord = Coordinates::new(latitude, longitude)
            .ok_or_else(|| anyhow!("Invalid coordinates: {latitude}, {longitude}"))?;
        Ok(Self { coord, timezone })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Sunrise and sunset for the given date, as zoned local datetimes.
    pub fn sun_times(&self, date: NaiveDate) -> (DateTime<Tz>, DateTime<Tz>) {
        let solar_day = SolarDay::new(self.coord, date);
        let sunrise_utc = solar_day.event_time(SolarEvent::Sunrise);
        let sunset_utc = solar_day.event_time(SolarEvent::Sunset);
        (
            sunrise_utc.with_timezone(&self.timezone),
            sunset_utc.with_timezone(&self.timezone),
        )
    }

    /// Resolve a solar anchor plus offset into a zoned datetime on `date`.
    pub fn resolve_anchor(
        &self,
        anchor: SolarAnchor,
        offset_minutes: i64,
        date: NaiveDate,
    ) -> DateTime<Tz> {
        let (sunrise, sunset) = self.sun_times(date);
        let base = match anchor {
            SolarAnchor::Sunrise => sunrise,
            SolarAnchor::Sunset => sunset,
        };
        base + Duration::minutes(offset_minutes)
    }
}
