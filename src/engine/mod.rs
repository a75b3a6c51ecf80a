//! The decision loop: per-cycle orchestration of every group.
//!
//! Each cycle runs on one thread and evaluates groups sequentially, keeping
//! per-device protocol sessions serialized. For every group the loop reads
//! live device state (authoritative over any persisted belief), resolves the
//! override layers, evaluates the schedules against current weather, and
//! issues at most one on/off command. Device failures are caught per group;
//! one group's failure never aborts evaluation of the others.
//!
//! Between cycles the loop sleeps on its event channel, so a shutdown signal
//! or a submitted control command interrupts the wait promptly instead of
//! waiting out the interval.

pub mod commands;
pub mod preview;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};

use crate::common::constants::PREVIEW_STEP_MINUTES;
use crate::config::{GroupSettings, Settings, WeatherSettings};
use crate::device::DeviceGroupManager;
use crate::geo::SolarCalculator;
use crate::notify::{EventKind, NotificationSink};
use crate::schedule::evaluator::{ScheduleDecision, should_turn_on};
use crate::schedule::GroupConditions;
use crate::state::overrides::{AutomationSettings, OverrideAction, OverrideStore};
use crate::state::runtime::RuntimeStateStore;
use crate::weather::WeatherService;

use commands::{
    ControlCommand, ControlRequest, ControlResponse, EngineEvent, GroupStatusReport,
};
use crate::io::signals::SignalMessage;

/// Distill the resilience wrapper's cache queries into the evaluator's
/// weather inputs. `None` means no usable data — the caller passes that
/// through as `weather_offline`.
pub(crate) fn conditions_at(
    weather: &WeatherService,
    settings: &WeatherSettings,
    now_utc: DateTime<Utc>,
) -> Option<GroupConditions> {
    let snapshot = weather.current_conditions(now_utc)?;
    let precipitation_expected = weather
        .precipitation_forecast(
            now_utc,
            settings.condition_lookahead_hours,
            settings.precipitation_temp_threshold_f,
        )
        .unwrap_or(false);
    let black_ice_risk = weather
        .black_ice_forecast(now_utc, settings.condition_lookahead_hours, &settings.black_ice)
        .unwrap_or(false);
    Some(GroupConditions {
        temperature: snapshot.temperature,
        precipitation_expected,
        black_ice_risk,
    })
}

/// Resources the engine needs, bundled to keep construction readable.
pub struct EngineParams {
    pub settings: Arc<Settings>,
    pub devices: Box<dyn DeviceGroupManager>,
    pub weather: Arc<WeatherService>,
    pub notifier: Arc<dyn NotificationSink>,
    pub runtime: RuntimeStateStore,
    pub overrides: OverrideStore,
    pub events: Receiver<EngineEvent>,
    pub running: Arc<AtomicBool>,
}

/// The long-lived decision loop and the only owner of device I/O.
pub struct Engine {
    settings: Arc<Settings>,
    solar: SolarCalculator,
    devices: Box<dyn DeviceGroupManager>,
    weather: Arc<WeatherService>,
    notifier: Arc<dyn NotificationSink>,
    runtime: RuntimeStateStore,
    overrides: OverrideStore,
    events: Receiver<EngineEvent>,
    running: Arc<AtomicBool>,
    events_disconnected: bool,
}

impl Engine {
    pub fn new(params: EngineParams) -> Result<Self> {
        let solar = SolarCalculator::new(
            params.settings.latitude,
            params.settings.longitude,
            params.settings.timezone,
        )?;
        Ok(Self {
            settings: params.settings,
            solar,
            devices: params.devices,
            weather: params.weather,
            notifier: params.notifier,
            runtime: params.runtime,
            overrides: params.overrides,
            events: params.events,
            running: params.running,
            events_disconnected: false,
        })
    }

    /// Run until shutdown. Evaluates one cycle immediately, then alternates
    /// event-aware sleeps and cycles.
    pub fn run(mut self) -> Result<()> {
        log_block_start!(
            "Decision loop started: {} group(s), every {} minutes",
            self.settings.groups.len(),
            self.settings.decision.check_interval.as_secs() / 60
        );

        self.reconcile_startup_state();

        while self.running.load(Ordering::SeqCst) && !crate::time_source::simulation_ended() {
            let now = crate::time_source::now().with_timezone(&self.settings.timezone);
            self.run_cycle(now);

            if !self.sleep_until_next_cycle() {
                break;
            }
        }

        log_block_start!("Decision loop stopped");
        Ok(())
    }

    /// Sleep for one check interval, waking early for events.
    /// Returns false when shutdown was requested.
    fn sleep_until_next_cycle(&mut self) -> bool {
        let interval = self.settings.decision.check_interval;

        if self.events_disconnected || crate::time_source::is_simulated() {
            // Simulated runs advance the clock instantly; a dead channel
            // leaves only the running flag. Either way, sleep then drain.
            crate::time_source::sleep(interval);
        } else {
            match self.events.recv_timeout(interval) {
                Ok(event) => {
                    if !self.handle_event(event) {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    if !self.running.load(Ordering::SeqCst) {
                        return false;
                    }
                    log_pipe!();
                    log_error!("Event channel disconnected unexpectedly");
                    log_indented!("Signals and commands will no longer be processed");
                    self.events_disconnected = true;
                }
            }
        }

        // Drain anything else queued before the next cycle
        while let Ok(event) = self.events.try_recv() {
            if !self.handle_event(event) {
                return false;
            }
        }
        self.running.load(Ordering::SeqCst)
    }

    /// Align persisted belief with live device state before the first cycle,
    /// so a crash mid-cycle cannot leave bookkeeping wedged.
    fn reconcile_startup_state(&mut self) {
        let settings = self.settings.clone();
        let now_utc = crate::time_source::now().with_timezone(&Utc);
        for group in &settings.groups {
            match self.devices.get_state(&group.name, &group.targets) {
                Ok(live_on) => {
                    if live_on != self.runtime.device_on(&group.name) {
                        log_decorated!(
                            "[{}] Restoring state from device: {}",
                            group.name,
                            if live_on { "ON" } else { "OFF" }
                        );
                        if live_on {
                            self.runtime.mark_on(&group.name, now_utc);
                        } else {
                            self.runtime.mark_off(&group.name, now_utc);
                        }
                    }
                }
                Err(e) => {
                    log_warning!("[{}] Could not read device state at startup: {e}", group.name);
                }
            }
        }
    }

    /// Evaluate every group once. Device errors are contained per group.
    fn run_cycle(&mut self, now: DateTime<Tz>) {
        let settings = self.settings.clone();
        for group in &settings.groups {
            self.evaluate_group(group, now);
        }
    }

    fn evaluate_group(&mut self, group: &GroupSettings, now: DateTime<Tz>) {
        let now_utc = now.with_timezone(&Utc);

        let live_on = match self.devices.get_state(&group.name, &group.targets) {
            Ok(state) => state,
            Err(e) => {
                log_pipe!();
                log_error!("[{}] Failed to read device state: {e}", group.name);
                self.notifier.notify(
                    EventKind::DeviceFailure,
                    &format!("Could not read state of group '{}'", group.name),
                    &[("error", e.to_string())],
                );
                return;
            }
        };

        // Live state is authoritative over any cached belief
        if live_on != self.runtime.device_on(&group.name) {
            log_block_start!(
                "[{}] Reconciling: device is actually {}",
                group.name,
                if live_on { "ON" } else { "OFF" }
            );
            if live_on {
                self.runtime.mark_on(&group.name, now_utc);
            } else {
                self.runtime.mark_off(&group.name, now_utc);
            }
        }

        let automation = self
            .overrides
            .merged_automation(&group.name, group.automation);

        if let Some(active) = self.overrides.manual_override(&group.name, now_utc) {
            // A static mismatch between override and schedule never clears
            // the override; only a genuine boundary transition within the
            // last check interval does.
            if self.schedule_boundary_crossed(group, now, automation.vacation_mode) {
                log_block_start!(
                    "[{}] Schedule boundary reached; clearing manual '{}' override",
                    group.name,
                    active.action
                );
                self.overrides.clear_manual(&group.name);
            } else {
                return;
            }
        }

        let conditions = conditions_at(&self.weather, &self.settings.weather, now_utc);
        let decision = should_turn_on(
            &group.schedules,
            now,
            conditions.as_ref(),
            conditions.is_none(),
            automation.vacation_mode,
            &self.solar,
        );

        if live_on {
            self.evaluate_turn_off(group, now_utc, &automation, &decision);
        } else {
            self.evaluate_turn_on(group, now_utc, &automation, &decision);
        }
    }

    fn evaluate_turn_off(
        &mut self,
        group: &GroupSettings,
        now_utc: DateTime<Utc>,
        automation: &AutomationSettings,
        decision: &ScheduleDecision,
    ) {
        let reason = if !automation.enabled {
            Some("automation_disabled".to_string())
        } else if self.max_runtime_exceeded(group, decision, now_utc) {
            self.runtime.start_cooldown(&group.name, now_utc);
            Some("max_runtime_exceeded".to_string())
        } else if !decision.energize {
            Some(decision.reason.clone())
        } else {
            None
        };
        let Some(reason) = reason else { return };

        log_block_start!("[{}] Turning off ({reason})", group.name);
        match self.devices.turn_off(&group.name, &group.targets) {
            Ok(()) => {
                self.runtime.mark_off(&group.name, now_utc);
                self.notifier.notify(
                    EventKind::GroupDeenergized,
                    &format!("Group '{}' turned off", group.name),
                    &[("reason", reason)],
                );
            }
            Err(e) => {
                // Bookkeeping untouched; the next cycle reconciles against
                // whatever state the device actually reached
                log_error!("[{}] Turn-off failed: {e}", group.name);
                self.notifier.notify(
                    EventKind::DeviceFailure,
                    &format!("Failed to turn off group '{}'", group.name),
                    &[("error", e.to_string())],
                );
            }
        }
    }

    fn evaluate_turn_on(
        &mut self,
        group: &GroupSettings,
        now_utc: DateTime<Utc>,
        automation: &AutomationSettings,
        decision: &ScheduleDecision,
    ) {
        if !automation.enabled || !decision.energize {
            return;
        }
        if self
            .runtime
            .is_in_cooldown(&group.name, self.settings.decision.cooldown_minutes, now_utc)
        {
            log_decorated!(
                "[{}] Wants ON ({}) but is in cooldown",
                group.name,
                decision.reason
            );
            return;
        }

        log_block_start!("[{}] Turning on ({})", group.name, decision.reason);
        // Bookkeeping precedes the command: a partially successful group
        // command still heats, and must be tracked as running
        self.runtime.mark_on(&group.name, now_utc);
        match self.devices.turn_on(&group.name, &group.targets) {
            Ok(()) => {
                self.notifier.notify(
                    EventKind::GroupEnergized,
                    &format!("Group '{}' turned on", group.name),
                    &[("reason", decision.reason.clone())],
                );
            }
            Err(e) => {
                log_error!("[{}] Turn-on failed: {e}", group.name);
                self.notifier.notify(
                    EventKind::DeviceFailure,
                    &format!("Failed to turn on group '{}'", group.name),
                    &[("error", e.to_string())],
                );
            }
        }
    }

    /// Continuous-runtime limit for the currently winning schedule, falling
    /// back to the global safety ceiling.
    fn max_runtime_exceeded(
        &self,
        group: &GroupSettings,
        decision: &ScheduleDecision,
        now_utc: DateTime<Utc>,
    ) -> bool {
        let limit = decision
            .winner
            .as_ref()
            .and_then(|name| group.schedules.iter().find(|s| &s.name == name))
            .and_then(|s| s.max_runtime_hours)
            .unwrap_or(self.settings.decision.max_runtime_hours);
        self.runtime.exceeded_max_runtime(&group.name, limit, now_utc)
    }

    /// Whether the schedule recommendation flipped between `now` and one
    /// check interval earlier — the boundary transition that clears a
    /// manual override.
    fn schedule_boundary_crossed(
        &self,
        group: &GroupSettings,
        now: DateTime<Tz>,
        vacation: bool,
    ) -> bool {
        let interval = chrono::Duration::from_std(self.settings.decision.check_interval)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        self.recommendation(group, now, vacation)
            != self.recommendation(group, now - interval, vacation)
    }

    fn recommendation(&self, group: &GroupSettings, at: DateTime<Tz>, vacation: bool) -> bool {
        let at_utc = at.with_timezone(&Utc);
        let conditions = conditions_at(&self.weather, &self.settings.weather, at_utc);
        should_turn_on(
            &group.schedules,
            at,
            conditions.as_ref(),
            conditions.is_none(),
            vacation,
            &self.solar,
        )
        .energize
    }

    /// Returns false when the event requests shutdown.
    fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Signal(SignalMessage::Shutdown) => false,
            EngineEvent::Control(ControlRequest { command, reply }) => {
                let response = self.handle_control(command);
                // A vanished submitter is not our problem
                let _ = reply.send(response);
                true
            }
        }
    }

    /// Execute one submitted command on the scheduler's own context.
    fn handle_control(&mut self, command: ControlCommand) -> ControlResponse {
        let now_utc = crate::time_source::now().with_timezone(&Utc);
        match command {
            ControlCommand::SetManualOverride {
                group,
                action,
                timeout_hours,
            } => {
                let Some(group_settings) = self.settings.group(&group).cloned() else {
                    return ControlResponse::Error(format!("unknown group '{group}'"));
                };
                if timeout_hours <= 0.0 {
                    return ControlResponse::Error("timeout_hours must be positive".to_string());
                }
                self.overrides
                    .set_manual(&group, action, timeout_hours, now_utc);
                log_block_start!(
                    "[{group}] Manual '{action}' override installed for {timeout_hours}h"
                );

                // Apply immediately; we are on the device-owning context
                let result = match action {
                    OverrideAction::On => {
                        self.runtime.mark_on(&group, now_utc);
                        self.devices.turn_on(&group, &group_settings.targets)
                    }
                    OverrideAction::Off => {
                        let result = self.devices.turn_off(&group, &group_settings.targets);
                        if result.is_ok() {
                            self.runtime.mark_off(&group, now_utc);
                        }
                        result
                    }
                };
                match result {
                    Ok(()) => ControlResponse::Ack,
                    Err(e) => {
                        log_error!("[{group}] Override device command failed: {e}");
                        ControlResponse::Error(format!(
                            "override installed, but device command failed: {e}"
                        ))
                    }
                }
            }
            ControlCommand::ClearManualOverride { group } => {
                self.overrides.clear_manual(&group);
                log_block_start!("[{group}] Manual override cleared");
                ControlResponse::Ack
            }
            ControlCommand::SetAutomationFlag { group, flag, value } => {
                if self.settings.group(&group).is_none() {
                    return ControlResponse::Error(format!("unknown group '{group}'"));
                }
                self.overrides.set_automation(&group, flag, value);
                ControlResponse::Ack
            }
            ControlCommand::GroupStatus { group } => {
                let Some(group_settings) = self.settings.group(&group) else {
                    return ControlResponse::Error(format!("unknown group '{group}'"));
                };
                let automation = self
                    .overrides
                    .merged_automation(&group, group_settings.automation);
                let runtime = self.runtime.get(&group);
                let manual = self.overrides.manual_override(&group, now_utc);
                ControlResponse::Status(GroupStatusReport {
                    group,
                    device_on: runtime.device_on,
                    manual_override: manual,
                    automation,
                    cumulative_runtime_seconds: runtime.cumulative_runtime_seconds,
                    weather_state: self.weather.resilience_state(now_utc).to_string(),
                    weather_last_error: self.weather.last_error(),
                })
            }
            ControlCommand::Preview { group, hours } => {
                let Some(group_settings) = self.settings.group(&group) else {
                    return ControlResponse::Error(format!("unknown group '{group}'"));
                };
                if hours == 0 || hours > crate::common::constants::MAXIMUM_PREVIEW_HOURS {
                    return ControlResponse::Error(format!("preview hours {hours} out of range"));
                }
                let automation = self
                    .overrides
                    .merged_automation(&group, group_settings.automation);
                let start = crate::time_source::now().with_timezone(&self.settings.timezone);
                let windows = preview::predict_windows(
                    group_settings,
                    &self.weather,
                    &self.settings.weather,
                    &self.solar,
                    automation.vacation_mode,
                    start,
                    hours,
                    PREVIEW_STEP_MINUTES,
                );
                ControlResponse::Preview(windows)
            }
        }
    }
}

#[cfg(test)]
mod tests;
