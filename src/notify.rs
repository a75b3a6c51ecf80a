//! Notification port for operator-facing events.
//!
//! Delivery transport (email, webhooks) lives outside this crate. The sink is
//! strictly fire-and-forget: implementations must swallow their own failures,
//! and callers never treat a notification as part of the decision path.

use std::fmt;

/// Classified event kinds the daemon reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Weather provider recovered after degradation or outage.
    WeatherRecovered,
    /// Provider unreachable, still serving cached data.
    WeatherDegraded,
    /// Provider unreachable and no valid cache remains.
    WeatherOffline,
    /// A group was energized.
    GroupEnergized,
    /// A group was de-energized.
    GroupDeenergized,
    /// A device command failed.
    DeviceFailure,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EventKind::WeatherRecovered => "weather_recovered",
            EventKind::WeatherDegraded => "weather_degraded",
            EventKind::WeatherOffline => "weather_offline",
            EventKind::GroupEnergized => "group_energized",
            EventKind::GroupDeenergized => "group_deenergized",
            EventKind::DeviceFailure => "device_failure",
        };
        f.write_str(label)
    }
}

/// Fire-and-forget notification sink.
pub trait NotificationSink: Send + Sync {
    /// Report an event. Must never block for long and never propagate errors.
    fn notify(&self, kind: EventKind, message: &str, details: &[(&str, String)]);
}

/// Default sink that routes events to the structured log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, kind: EventKind, message: &str, details: &[(&str, String)]) {
        log_block_start!("[{kind}] {message}");
        for (key, value) in details {
            log_indented!("{key}: {value}");
        }
    }
}
