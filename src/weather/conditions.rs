//! Derived weather conditions: dew point and black-ice risk.
//!
//! Black ice forms when a near-freezing surface meets saturated air. The
//! rule used here flags risk only when all three hold together: temperature
//! at or below the threshold, temperature-to-dew-point spread at or below
//! the spread threshold, and humidity at or above the minimum. Entries
//! without a reported dew point get one derived from temperature and
//! humidity via the Magnus formula.

use crate::weather::cache::ForecastSnapshot;

const MAGNUS_A: f64 = 17.62;
const MAGNUS_B_C: f64 = 243.12;

/// Thresholds for the black-ice rule (°F / percent).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlackIceThresholds {
    pub max_temp_f: f64,
    pub dewpoint_spread_f: f64,
    pub min_humidity_pct: f64,
}

fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Dew point (°F) from temperature (°F) and relative humidity (percent),
/// via the Magnus formula.
///
/// When the formula turns numerically degenerate (humidity at or below
/// zero, or the Magnus denominator collapsing for extreme inputs), falls
/// back to the linear one-degree-per-five-percent approximation.
pub fn derive_dew_point_f(temp_f: f64, humidity_pct: f64) -> f64 {
    let temp_c = f_to_c(temp_f);

    if humidity_pct > 0.0 && humidity_pct <= 100.0 {
        let gamma = (humidity_pct / 100.0).ln() + MAGNUS_A * temp_c / (MAGNUS_B_C + temp_c);
        let denominator = MAGNUS_A - gamma;
        if denominator.abs() > f64::EPSILON && denominator.is_finite() {
            return c_to_f(MAGNUS_B_C * gamma / denominator);
        }
    }

    // Linear approximation: dew point drops ~1°C per 5% humidity deficit
    c_to_f(temp_c - (100.0 - humidity_pct.clamp(0.0, 100.0)) / 5.0)
}

/// The snapshot's dew point: reported when present, else derived from
/// humidity. `None` when neither input exists.
pub fn snapshot_dew_point_f(snapshot: &ForecastSnapshot) -> Option<f64> {
    if let Some(dew_point) = snapshot.dew_point {
        return Some(dew_point);
    }
    snapshot
        .humidity
        .map(|humidity| derive_dew_point_f(snapshot.temperature, humidity))
}

/// Apply the black-ice rule to one forecast snapshot.
///
/// All three conditions must hold jointly; a snapshot missing humidity (and
/// therefore unable to satisfy the humidity minimum) never flags risk.
pub fn black_ice_risk(snapshot: &ForecastSnapshot, thresholds: &BlackIceThresholds) -> bool {
    if snapshot.temperature > thresholds.max_temp_f {
        return false;
    }
    let Some(humidity) = snapshot.humidity else {
        return false;
    };
    if humidity < thresholds.min_humidity_pct {
        return false;
    }
    let Some(dew_point) = snapshot_dew_point_f(snapshot) else {
        return false;
    };
    snapshot.temperature - dew_point <= thresholds.dewpoint_spread_f
}
