//! Per-group runtime bookkeeping: on/off transitions, cumulative runtime,
//! and cooldown windows.
//!
//! Exactly two operations write the on/off fields (`mark_on`, `mark_off`),
//! and the store persists after every mutation so a crash between cycles
//! loses at most nothing. Cooldown expiry is checked lazily on read rather
//! than by a timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::{atomic_write_json, load_json_or_default};

/// Runtime state for one group. Lives for the process lifetime and is
/// reloaded from disk on start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupRuntimeState {
    pub device_on: bool,
    pub turn_on_time: Option<DateTime<Utc>>,
    pub cooldown_start: Option<DateTime<Utc>>,
    pub cumulative_runtime_seconds: u64,
}

/// Store holding the runtime state of every group, persisted as one JSON
/// document keyed by group name.
pub struct RuntimeStateStore {
    path: PathBuf,
    groups: HashMap<String, GroupRuntimeState>,
}

impl RuntimeStateStore {
    /// Load from disk; a missing or corrupt file starts every group fresh.
    pub fn load(path: PathBuf) -> Self {
        let groups = load_json_or_default(&path).unwrap_or_default();
        Self { path, groups }
    }

    /// Persistence failures are logged and tolerated: the in-memory state
    /// stays authoritative for the rest of the process lifetime.
    fn persist(&self) {
        if let Err(e) = atomic_write_json(&self.path, &self.groups) {
            log_warning!("Failed to persist runtime state: {e}");
        }
    }

    pub fn get(&self, group: &str) -> GroupRuntimeState {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    pub fn device_on(&self, group: &str) -> bool {
        self.groups.get(group).is_some_and(|s| s.device_on)
    }

    /// Record a turn-on. A second `mark_on` without an intervening
    /// `mark_off` keeps the original `turn_on_time` so runtime is never
    /// double-counted.
    pub fn mark_on(&mut self, group: &str, now: DateTime<Utc>) {
        let state = self.groups.entry(group.to_string()).or_default();
        if !state.device_on {
            state.device_on = true;
            state.turn_on_time = Some(now);
        }
        self.persist();
    }

    /// Record a turn-off, folding the elapsed span into cumulative runtime.
    /// Without a prior `mark_on` this is a harmless no-op.
    pub fn mark_off(&mut self, group: &str, now: DateTime<Utc>) {
        let state = self.groups.entry(group.to_string()).or_default();
        if state.device_on {
            if let Some(turned_on) = state.turn_on_time {
                let elapsed = (now - turned_on).num_seconds().max(0) as u64;
                state.cumulative_runtime_seconds += elapsed;
            }
            state.device_on = false;
            state.turn_on_time = None;
        }
        self.persist();
    }

    /// Stamp the start of a cooldown window.
    pub fn start_cooldown(&mut self, group: &str, now: DateTime<Utc>) {
        let state = self.groups.entry(group.to_string()).or_default();
        state.cooldown_start = Some(now);
        self.persist();
    }

    /// Whether the group is inside its cooldown window. An elapsed window
    /// clears the stamp as a side effect of the read.
    pub fn is_in_cooldown(&mut self, group: &str, minutes: u64, now: DateTime<Utc>) -> bool {
        let Some(state) = self.groups.get_mut(group) else {
            return false;
        };
        let Some(started) = state.cooldown_start else {
            return false;
        };
        if now - started >= Duration::minutes(minutes as i64) {
            state.cooldown_start = None;
            self.persist();
            false
        } else {
            true
        }
    }

    /// Whether continuous runtime has exceeded `hours`. Only meaningful
    /// while the device is on; an off group never exceeds.
    pub fn exceeded_max_runtime(&self, group: &str, hours: f64, now: DateTime<Utc>) -> bool {
        let Some(state) = self.groups.get(group) else {
            return false;
        };
        if !state.device_on {
            return false;
        }
        match state.turn_on_time {
            Some(turned_on) => {
                let limit = Duration::seconds((hours * 3600.0) as i64);
                now - turned_on > limit
            }
            None => false,
        }
    }
}
