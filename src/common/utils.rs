//! Shared small helpers used across modules.

use std::path::Path;
use std::time::Duration;

/// Display a path with the home directory collapsed to `~`.
///
/// Keeps log output short and avoids leaking the full home path into
/// copy-pasted issue reports.
pub fn private_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(stripped) = path.strip_prefix(&home)
    {
        return format!("~/{}", stripped.display());
    }
    path.display().to_string()
}

/// Format a duration as "Xh Ym" / "Ym Zs" for log lines.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    if total_secs >= 3600 {
        format!("{}h {}m", total_secs / 3600, (total_secs % 3600) / 60)
    } else if total_secs >= 60 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{total_secs}s")
    }
}

/// Format a temperature for display, dropping a trailing ".0".
pub fn format_temp(temp_f: f64) -> String {
    if temp_f.fract() == 0.0 {
        format!("{}°F", temp_f as i64)
    } else {
        format!("{temp_f:.1}°F")
    }
}
