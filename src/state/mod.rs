//! Persistent state for meltr, following XDG Base Directory standards.
//!
//! Runtime bookkeeping, override layers, and the forecast cache are JSON
//! files under `XDG_STATE_HOME/meltr`, kept separate from configuration.
//! Every write goes through an atomic replace (write a temp file in the same
//! directory, then rename) so a crash mid-cycle can never leave a torn file.
//! Corrupt or missing files degrade to defaults instead of failing the
//! process: losing a cooldown stamp is recoverable, refusing to start is not.

pub mod overrides;
pub mod runtime;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::utils::private_path;

/// Resolve the state directory, creating it if needed.
///
/// `XDG_STATE_HOME/meltr`, with the conventional `~/.local/state` fallback.
pub fn get_state_dir() -> Result<PathBuf> {
    let state_home = std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local/state")
        });

    let state_dir = state_home.join("meltr");
    fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
    Ok(state_dir)
}

/// Atomically replace `path` with the JSON serialization of `value`.
///
/// The temp file is created in the destination directory so the final rename
/// stays on one filesystem.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("State path {} has no parent directory", path.display()))?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    serde_json::to_writer_pretty(&mut temp, value)
        .with_context(|| format!("Failed to serialize state for {}", path.display()))?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Load a JSON state file, degrading to `None` when it is absent or corrupt.
///
/// A corrupt file is logged and left in place; the caller starts from its
/// default and the next persist overwrites the damage.
pub fn load_json_or_default<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return None,
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            log_warning!(
                "Ignoring corrupt state file {}: {e}",
                private_path(path)
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[test]
    fn atomic_write_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");

        atomic_write_json(&path, &Sample { count: 3 }).unwrap();
        let loaded: Option<Sample> = load_json_or_default(&path);
        assert_eq!(loaded, Some(Sample { count: 3 }));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Sample> = load_json_or_default(&dir.path().join("absent.json"));
        assert!(loaded.is_none());
    }

    #[test]
    fn corrupt_file_loads_as_none_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let loaded: Option<Sample> = load_json_or_default(&path);
        assert!(loaded.is_none());
    }

    #[test]
    fn atomic_write_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        atomic_write_json(&path, &Sample { count: 1 }).unwrap();
        atomic_write_json(&path, &Sample { count: 2 }).unwrap();
        let loaded: Option<Sample> = load_json_or_default(&path);
        assert_eq!(loaded, Some(Sample { count: 2 }));
    }
}
