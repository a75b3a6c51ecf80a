//! Override layers: persistent automation flag overrides and time-boxed
//! manual forces.
//!
//! Automation overrides are sparse — only explicitly set flags are stored,
//! and merging overlays them onto the static configuration without touching
//! base-only keys. Manual overrides force a group on or off until they
//! expire; expiry is checked lazily whenever the override is read, so
//! callers must re-read instead of caching the answer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use super::{atomic_write_json, load_json_or_default};

/// Forced state requested by a manual override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    On,
    Off,
}

impl fmt::Display for OverrideAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverrideAction::On => "on",
            OverrideAction::Off => "off",
        })
    }
}

/// A user-initiated forced on/off, at most one per group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub action: OverrideAction,
    pub set_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Automation flags a group carries; overridable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationFlag {
    Enabled,
    VacationMode,
}

/// Effective automation settings after merging overrides over base config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationSettings {
    pub enabled: bool,
    pub vacation_mode: bool,
}

impl Default for AutomationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            vacation_mode: false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OverrideData {
    #[serde(default)]
    automation: HashMap<String, HashMap<AutomationFlag, bool>>,
    #[serde(default)]
    manual: HashMap<String, ManualOverride>,
}

/// Persistent store for both override layers.
pub struct OverrideStore {
    path: PathBuf,
    data: OverrideData,
}

impl OverrideStore {
    pub fn load(path: PathBuf) -> Self {
        let data = load_json_or_default(&path).unwrap_or_default();
        Self { path, data }
    }

    fn persist(&self) {
        if let Err(e) = atomic_write_json(&self.path, &self.data) {
            log_warning!("Failed to persist overrides: {e}");
        }
    }

    /// Set or delete an automation flag override. `None` deletes the
    /// override, returning the flag to its configured base value.
    pub fn set_automation(&mut self, group: &str, flag: AutomationFlag, value: Option<bool>) {
        match value {
            Some(value) => {
                self.data
                    .automation
                    .entry(group.to_string())
                    .or_default()
                    .insert(flag, value);
            }
            None => {
                if let Some(flags) = self.data.automation.get_mut(group) {
                    flags.remove(&flag);
                    if flags.is_empty() {
                        self.data.automation.remove(group);
                    }
                }
            }
        }
        self.persist();
    }

    /// Merge overrides over base settings. Only flags present in the
    /// override map are overlaid; base-only keys always survive.
    pub fn merged_automation(&self, group: &str, base: AutomationSettings) -> AutomationSettings {
        let mut merged = base;
        if let Some(flags) = self.data.automation.get(group) {
            if let Some(&enabled) = flags.get(&AutomationFlag::Enabled) {
                merged.enabled = enabled;
            }
            if let Some(&vacation) = flags.get(&AutomationFlag::VacationMode) {
                merged.vacation_mode = vacation;
            }
        }
        merged
    }

    /// Install a manual override, replacing any prior one for the group.
    pub fn set_manual(
        &mut self,
        group: &str,
        action: OverrideAction,
        timeout_hours: f64,
        now: DateTime<Utc>,
    ) -> ManualOverride {
        let entry = ManualOverride {
            action,
            set_at: now,
            expires_at: now + Duration::seconds((timeout_hours * 3600.0) as i64),
        };
        self.data.manual.insert(group.to_string(), entry);
        self.persist();
        entry
    }

    /// Remove a manual override, returning the removed entry if one existed.
    pub fn clear_manual(&mut self, group: &str) -> Option<ManualOverride> {
        let removed = self.data.manual.remove(group);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// The active manual override for the group, if any.
    ///
    /// An expired override is removed as a side effect of this read, which
    /// is why callers must re-check instead of caching the result.
    pub fn manual_override(&mut self, group: &str, now: DateTime<Utc>) -> Option<ManualOverride> {
        let entry = *self.data.manual.get(group)?;
        if now >= entry.expires_at {
            self.data.manual.remove(group);
            self.persist();
            return None;
        }
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> (tempfile::TempDir, OverrideStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = OverrideStore::load(dir.path().join("overrides.json"));
        (dir, store)
    }

    fn t(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn merge_overlays_only_present_flags() {
        let (_dir, mut store) = store();
        let base = AutomationSettings {
            enabled: true,
            vacation_mode: true,
        };

        store.set_automation("walk", AutomationFlag::Enabled, Some(false));
        let merged = store.merged_automation("walk", base);
        assert!(!merged.enabled);
        // Base-only key survives the merge
        assert!(merged.vacation_mode);
    }

    #[test]
    fn deleting_an_override_restores_base() {
        let (_dir, mut store) = store();
        store.set_automation("walk", AutomationFlag::VacationMode, Some(true));
        store.set_automation("walk", AutomationFlag::VacationMode, None);
        let merged = store.merged_automation("walk", AutomationSettings::default());
        assert!(!merged.vacation_mode);
    }

    #[test]
    fn manual_override_expires_lazily_and_clears() {
        let (_dir, mut store) = store();
        store.set_manual("walk", OverrideAction::Off, 2.0, t(16, 0));

        let active = store.manual_override("walk", t(17, 59));
        assert_eq!(active.map(|o| o.action), Some(OverrideAction::Off));

        assert!(store.manual_override("walk", t(18, 0)).is_none());
        // The expired entry was removed by the read itself
        assert!(store.manual_override("walk", t(16, 30)).is_none());
    }

    #[test]
    fn setting_a_new_manual_override_replaces_the_old() {
        let (_dir, mut store) = store();
        store.set_manual("walk", OverrideAction::Off, 4.0, t(10, 0));
        store.set_manual("walk", OverrideAction::On, 1.0, t(11, 0));

        let active = store.manual_override("walk", t(11, 30)).unwrap();
        assert_eq!(active.action, OverrideAction::On);
        assert_eq!(active.set_at, t(11, 0));
    }

    #[test]
    fn overrides_persist_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");

        let mut store = OverrideStore::load(path.clone());
        store.set_manual("walk", OverrideAction::On, 8.0, t(10, 0));
        store.set_automation("drive", AutomationFlag::Enabled, Some(false));
        drop(store);

        let mut reloaded = OverrideStore::load(path);
        assert!(reloaded.manual_override("walk", t(12, 0)).is_some());
        assert!(!reloaded.merged_automation("drive", AutomationSettings::default()).enabled);
    }
}
