//! Cross-context command dispatch into the decision loop.
//!
//! Device protocol state is unsafe to drive from two concurrent contexts, so
//! any surface that wants to exercise device I/O (or mutate override state)
//! submits a command object instead. The engine's single executor drains the
//! channel between cycles and answers through a per-request reply channel;
//! `ControlHandle::submit` blocks the caller until the result arrives.

use anyhow::{Context, Result};
use std::sync::mpsc::{Sender, channel};
use std::time::Duration as StdDuration;

use crate::io::signals::SignalMessage;
use crate::state::overrides::{AutomationFlag, AutomationSettings, ManualOverride, OverrideAction};

use super::preview::PreviewWindow;

/// How long a submitter waits for the engine before giving up. Generous:
/// the engine answers between cycles, and a cycle is bounded by sequential
/// device commands, not by sleeps.
const SUBMIT_TIMEOUT: StdDuration = StdDuration::from_secs(60);

/// Everything that can wake the engine's inter-cycle sleep.
pub enum EngineEvent {
    Signal(SignalMessage),
    Control(ControlRequest),
}

/// Operations an admin surface may submit to the scheduler's context.
#[derive(Debug, Clone)]
pub enum ControlCommand {
    /// Force a group on or off for `timeout_hours`, replacing any prior
    /// override for the group.
    SetManualOverride {
        group: String,
        action: OverrideAction,
        timeout_hours: f64,
    },
    /// Drop a group's manual override, returning it to automation.
    ClearManualOverride { group: String },
    /// Set (`Some`) or delete (`None`) an automation flag override.
    SetAutomationFlag {
        group: String,
        flag: AutomationFlag,
        value: Option<bool>,
    },
    /// Snapshot one group's state.
    GroupStatus { group: String },
    /// Predict the group's schedule over the coming hours. No device or
    /// network I/O is performed.
    Preview { group: String, hours: u32 },
}

/// Reply to a submitted command.
#[derive(Debug, Clone)]
pub enum ControlResponse {
    Ack,
    Status(GroupStatusReport),
    Preview(Vec<PreviewWindow>),
    Error(String),
}

/// Point-in-time snapshot of a group's state for status surfaces.
#[derive(Debug, Clone)]
pub struct GroupStatusReport {
    pub group: String,
    pub device_on: bool,
    pub manual_override: Option<ManualOverride>,
    pub automation: AutomationSettings,
    pub cumulative_runtime_seconds: u64,
    pub weather_state: String,
    pub weather_last_error: Option<String>,
}

/// A command paired with its reply channel.
pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: Sender<ControlResponse>,
}

/// Cheap cloneable handle for submitting commands to the engine.
#[derive(Clone)]
pub struct ControlHandle {
    events: Sender<EngineEvent>,
}

impl ControlHandle {
    /// Wrap the engine's event sender. The handle is the only supported way
    /// for other threads to reach device I/O or override state.
    pub fn new(events: Sender<EngineEvent>) -> Self {
        Self { events }
    }

    /// Submit a command and block until the engine answers.
    pub fn submit(&self, command: ControlCommand) -> Result<ControlResponse> {
        let (reply_tx, reply_rx) = channel();
        self.events
            .send(EngineEvent::Control(ControlRequest {
                command,
                reply: reply_tx,
            }))
            .context("Decision loop is no longer running")?;
        reply_rx
            .recv_timeout(SUBMIT_TIMEOUT)
            .context("Decision loop did not answer in time")
    }
}
