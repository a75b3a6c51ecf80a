//! Geographic calculations for the configured location.
//!
//! Sunrise/sunset math and coordinate-to-timezone resolution. Everything in
//! here is pure: the calculator holds only the fixed location and timezone
//! and is safe to share across threads.

pub mod solar;

pub use solar::{SolarCalculator, timezone_for_coordinates};
