/*
  rtuhub, a PROFINET sensor hub / remote terminal unit core.
  Copyright (C) 2026 rtuhub contributors.

  rtuhub is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  rtuhub is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.

  You should have received a copy of the GNU General Public License
  along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! The actuator controller: command precedence (alarm interlock > manual
//! override > PROFINET output), anti-chatter, the safety watchdog, and
//! degraded-mode last-state-hold.
//!
//! Grounded on the teacher's `execution::actuate_driver`/`perform_actions`
//! (direct GPIO writes gated through a command dispatcher) and `state::Guard`
//! (the only-some-transitions-are-legal pattern, generalized here into the
//! degraded/normal mode flag). The single hardcoded teacher emergency stop
//! sequence becomes a controller-wide `emergency_stop` that forces every
//! actuator to its safe state. The watchdog thread pairs with a second,
//! independent status thread that periodically reports every actuator's
//! state, mirroring the teacher's `data::sensor_listen`/`driver_status_listen`
//! pair of threads over the same underlying GPIO table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alarm::InterlockCommand;
use crate::callbacks::Slot;
use crate::error::{ErrorKind, RtuError};
use crate::health::ActuatorStatus;
use crate::model::{ActuatorConfig, ActuatorRuntime, ActuatorState, InterlockAction, OutputCommand};

/// No command of any kind received by the controller within this window,
/// while the PROFINET bridge claims `Connected`, moves the whole controller
/// into degraded (last-state-hold) mode.
pub const COMMAND_TIMEOUT_MS: i64 = 5_000;
/// Remaining in degraded mode this long raises the degraded-mode alarm.
pub const DEGRADED_ALARM_DELAY_MS: i64 = 3_000;
/// The watchdog tick period.
pub const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);
/// The status thread's reporting period.
pub const STATUS_UPDATE_PERIOD: Duration = Duration::from_secs(1);

struct ActuatorSlot {
    config: ActuatorConfig,
    runtime: ActuatorRuntime,
    interlock: Option<InterlockCommand>,
}

/// The actuator controller. Owns every configured actuator's runtime state
/// and arbitrates the three command sources.
pub struct ActuatorController {
    slots: Mutex<HashMap<u8, ActuatorSlot>>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    status_handle: Mutex<Option<JoinHandle<()>>>,
    /// Whether the PROFINET bridge currently claims `Connected` (spec.md
    /// §4.4/§9): degraded-mode silence is only meaningful while it does.
    bridge_connected: AtomicBool,
    /// The last time the controller received a command from the PROFINET
    /// bridge, of any kind. `None` until the first one ever arrives.
    last_command_at: Mutex<Option<DateTime<Utc>>>,
    degraded: AtomicBool,
    degraded_since: Mutex<Option<DateTime<Utc>>>,
    degraded_alarm_raised: AtomicBool,
    /// Fired whenever an actuator's effective output changes.
    pub on_output: Slot<dyn Fn((u8, OutputCommand)) + Send + Sync>,
    /// Fired when the controller, as a whole, enters (`true`) or leaves
    /// (`false`) degraded mode.
    pub on_degraded: Slot<dyn Fn(bool) + Send + Sync>,
    /// Fired when the watchdog forces an actuator off for exceeding its
    /// configured max on-time, with the slot and a human-readable reason.
    pub on_safety_shutoff: Slot<dyn Fn((u8, String)) + Send + Sync>,
    /// Fired by the status thread with every actuator's current state.
    pub on_status: Slot<dyn Fn(Vec<ActuatorStatus>) + Send + Sync>,
}

impl Default for ActuatorController {
    fn default() -> Self {
        ActuatorController {
            slots: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            status_handle: Mutex::new(None),
            bridge_connected: AtomicBool::new(false),
            last_command_at: Mutex::new(None),
            degraded: AtomicBool::new(false),
            degraded_since: Mutex::new(None),
            degraded_alarm_raised: AtomicBool::new(false),
            on_output: Slot::default(),
            on_degraded: Slot::default(),
            on_safety_shutoff: Slot::default(),
            on_status: Slot::default(),
        }
    }
}

impl ActuatorController {
    #[must_use]
    /// Construct an empty controller.
    pub fn new() -> ActuatorController {
        ActuatorController::default()
    }

    /// Replace the configured actuator set, preserving runtime state for
    /// slots that remain configured.
    pub fn reload_actuators(&self, configs: Vec<ActuatorConfig>, now: DateTime<Utc>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut fresh = HashMap::new();
        for config in configs {
            let slot_id = config.slot;
            let entry = if let Some(mut old) = slots.remove(&slot_id) {
                old.config = config;
                old
            } else {
                ActuatorSlot { runtime: ActuatorRuntime::new(config.safe_state, now), config, interlock: None }
            };
            fresh.insert(slot_id, entry);
        }
        *slots = fresh;
    }

    /// Register (or release) an interlock for a slot. Called from the alarm
    /// engine's `on_interlock` callback.
    pub fn apply_interlock(&self, cmd: InterlockCommand, now: DateTime<Utc>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(&cmd.target_slot) {
            if cmd.held {
                slot.interlock = Some(cmd);
            } else {
                slot.interlock = None;
            }
            Self::apply_effective_command(slot, now, &self.on_output);
        }
    }

    /// Handle a PROFINET output word: a command byte plus a PWM duty byte,
    /// per spec.md §6.1.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` for an unconfigured slot, or
    /// `ErrorKind::InvalidParam` for an unrecognized command byte.
    pub fn handle_output(&self, slot_id: u8, command_byte: u8, pwm_duty_byte: u8, now: DateTime<Utc>) -> Result<(), RtuError> {
        let command = OutputCommand::from_byte(command_byte)
            .ok_or_else(|| RtuError::new(ErrorKind::InvalidParam, format!("unknown output command byte {command_byte}")))?;
        let pwm_duty = pwm_duty_byte.min(100);

        // Any valid output word is proof the PROFINET bridge is still
        // talking to us, regardless of which actuator it targets or
        // whether the command is dropped below by an interlock or
        // anti-chatter; this is what the degraded-mode watchdog tracks.
        *self.last_command_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);

        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .get_mut(&slot_id)
            .ok_or_else(|| RtuError::new(ErrorKind::NotFound, format!("no actuator at slot {slot_id}")))?;

        if slot.interlock.is_some() {
            return Ok(()); // interlock holds precedence; PROFINET command is dropped
        }
        if slot.runtime.manual_mode {
            slot.runtime.manual_mode = false; // the next valid PROFINET command clears manual override
        }
        if !Self::min_cycle_elapsed(slot, now) {
            return Ok(()); // anti-chatter: too soon since the last state change
        }

        Self::apply_command(slot, command, pwm_duty, now);
        slot.runtime.last_command_time = now;
        Self::apply_effective_command(slot, now, &self.on_output);
        Ok(())
    }

    /// Force an actuator under manual override, bypassing PROFINET but still
    /// subject to an active interlock.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` for an unconfigured slot.
    pub fn manual_set(&self, slot_id: u8, command: OutputCommand, pwm_duty: u8, now: DateTime<Utc>) -> Result<(), RtuError> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let slot = slots
            .get_mut(&slot_id)
            .ok_or_else(|| RtuError::new(ErrorKind::NotFound, format!("no actuator at slot {slot_id}")))?;

        slot.runtime.manual_mode = true;
        if slot.interlock.is_some() {
            return Ok(());
        }
        Self::apply_command(slot, command, pwm_duty.min(100), now);
        slot.runtime.last_command_time = now;
        Self::apply_effective_command(slot, now, &self.on_output);
        Ok(())
    }

    /// Record the PROFINET bridge's connection state (spec.md §4.4/§9):
    /// called from the bridge's `on_connect`/`on_disconnect` callbacks, not
    /// by holding a direct handle to it. A fresh `Connected` notification
    /// counts as proof of life in its own right.
    pub fn notify_bridge_connected(&self, connected: bool, now: DateTime<Utc>) {
        self.bridge_connected.store(connected, Ordering::SeqCst);
        if connected {
            *self.last_command_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
        }
    }

    #[must_use]
    /// Whether the controller, as a whole, is currently in degraded
    /// (last-state-hold) mode.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    #[must_use]
    /// The current state of every configured actuator, for the health
    /// snapshot's per-actuator detail.
    pub fn statuses(&self) -> Vec<ActuatorStatus> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .values()
            .map(|s| ActuatorStatus { slot: s.config.slot, name: s.config.name.clone(), state: s.runtime.state, pwm_duty: s.runtime.pwm_duty, manual_mode: s.runtime.manual_mode })
            .collect()
    }

    /// Force every actuator to its configured safe state immediately,
    /// ignoring anti-chatter and clearing manual override and interlocks.
    pub fn emergency_stop(&self, now: DateTime<Utc>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for slot in slots.values_mut() {
            slot.interlock = None;
            slot.runtime.manual_mode = false;
            let safe = slot.config.safe_state;
            if slot.runtime.state != safe {
                slot.runtime.state = safe;
                slot.runtime.last_state_change = now;
                slot.runtime.cycle_count += 1;
            }
            slot.runtime.pwm_duty = 0;
            slot.runtime.last_command_time = now;
            let out = match safe {
                ActuatorState::On => OutputCommand::On,
                _ => OutputCommand::Off,
            };
            self.on_output.invoke((slot.config.slot, out));
        }
    }

    fn min_cycle_elapsed(slot: &ActuatorSlot, now: DateTime<Utc>) -> bool {
        let elapsed = (now - slot.runtime.last_state_change).num_milliseconds();
        elapsed < 0 || elapsed as u64 >= u64::from(slot.config.min_on_time_ms)
    }

    fn apply_command(slot: &mut ActuatorSlot, command: OutputCommand, pwm_duty: u8, now: DateTime<Utc>) {
        let new_state = match command {
            OutputCommand::Off => ActuatorState::Off,
            OutputCommand::On | OutputCommand::Pwm => ActuatorState::On,
        };
        if slot.runtime.state != new_state {
            slot.runtime.state = new_state;
            slot.runtime.last_state_change = now;
            slot.runtime.cycle_count += 1;
        }
        slot.runtime.pwm_duty = if command == OutputCommand::Pwm { pwm_duty } else { 0 };
    }

    /// Apply the precedence rule and fire `on_output` for the slot's
    /// resulting effective command: interlock overrides whatever
    /// `runtime.state` currently holds.
    fn apply_effective_command(slot: &mut ActuatorSlot, now: DateTime<Utc>, on_output: &Slot<dyn Fn((u8, OutputCommand)) + Send + Sync>) {
        if let Some(interlock) = slot.interlock {
            let forced = match interlock.action {
                InterlockAction::Off | InterlockAction::None => ActuatorState::Off,
                InterlockAction::On | InterlockAction::Pwm => ActuatorState::On,
            };
            if slot.runtime.state != forced {
                slot.runtime.state = forced;
                slot.runtime.last_state_change = now;
            }
            if interlock.action == InterlockAction::Pwm {
                slot.runtime.pwm_duty = interlock.pwm_duty;
            }
        }
        let out = match slot.runtime.state {
            ActuatorState::On if slot.runtime.pwm_duty > 0 => OutputCommand::Pwm,
            ActuatorState::On => OutputCommand::On,
            _ => OutputCommand::Off,
        };
        on_output.invoke((slot.config.slot, out));
    }

    /// Whether the background watchdog thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the 1Hz safety watchdog thread and the separate actuator
    /// status thread. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let watchdog = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            while watchdog.running.load(Ordering::SeqCst) {
                watchdog.watchdog_tick(Utc::now());
                std::thread::sleep(WATCHDOG_PERIOD);
            }
        });
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        let status = Arc::clone(self);
        let status_handle = std::thread::spawn(move || {
            while status.running.load(Ordering::SeqCst) {
                status.on_status.invoke(status.statuses());
                std::thread::sleep(STATUS_UPDATE_PERIOD);
            }
        });
        *self.status_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(status_handle);
    }

    /// Stop and join both the watchdog and status threads. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.status_handle.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }

    /// Run one watchdog pass: enforce `max_on_time_ms` per actuator, and
    /// maintain the controller-wide degraded-mode entry/exit and its
    /// delayed alarm.
    pub fn watchdog_tick(&self, now: DateTime<Utc>) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        for slot in slots.values_mut() {
            // Safety shutoff: an actuator held ON past its max continuous
            // on-time is forced OFF regardless of who commanded it
            // (spec.md §4.4 S4). `Fault` is reserved for an operator-raised
            // condition; the watchdog only ever turns things off.
            if slot.runtime.state == ActuatorState::On && slot.config.max_on_time_ms > 0 {
                let on_duration = (now - slot.runtime.last_state_change).num_milliseconds();
                if on_duration >= i64::from(slot.config.max_on_time_ms) {
                    slot.runtime.state = ActuatorState::Off;
                    slot.runtime.pwm_duty = 0;
                    slot.runtime.last_state_change = now;
                    self.on_output.invoke((slot.config.slot, OutputCommand::Off));
                    self.on_safety_shutoff.invoke((slot.config.slot, format!("Safety shutoff: {} exceeded max on time", slot.config.name)));
                }
            }
        }
        drop(slots);
        self.tick_degraded_mode(now);
    }

    /// Degraded mode (last-state-hold) is a single, controller-wide flag
    /// gated on the PROFINET bridge reporting `Connected` (spec.md
    /// §4.4/§9/S3): it is not tracked per actuator, since the thing that
    /// goes silent is the upstream fieldbus controller, not any one output.
    /// Actuators themselves need no action here; holding their last state
    /// is simply what not receiving new commands already does.
    fn tick_degraded_mode(&self, now: DateTime<Utc>) {
        if !self.bridge_connected.load(Ordering::SeqCst) {
            if self.degraded.swap(false, Ordering::SeqCst) {
                *self.degraded_since.lock().unwrap_or_else(|e| e.into_inner()) = None;
                if self.degraded_alarm_raised.swap(false, Ordering::SeqCst) {
                    self.on_degraded.invoke(false);
                }
            }
            return;
        }

        let last_command_at = *self.last_command_at.lock().unwrap_or_else(|e| e.into_inner());
        let silence_ms = last_command_at.map_or(i64::MAX, |t| (now - t).num_milliseconds());
        let should_be_degraded = silence_ms >= COMMAND_TIMEOUT_MS;
        let was_degraded = self.degraded.load(Ordering::SeqCst);

        if should_be_degraded && !was_degraded {
            self.degraded.store(true, Ordering::SeqCst);
            // Back-date the entry instant to when the silence actually
            // crossed the threshold, not to this tick, so the alarm delay
            // below is measured from the real onset.
            let since = last_command_at.map_or(now, |t| t + chrono::Duration::milliseconds(COMMAND_TIMEOUT_MS));
            *self.degraded_since.lock().unwrap_or_else(|e| e.into_inner()) = Some(since);
        } else if !should_be_degraded && was_degraded {
            self.degraded.store(false, Ordering::SeqCst);
            *self.degraded_since.lock().unwrap_or_else(|e| e.into_inner()) = None;
            if self.degraded_alarm_raised.swap(false, Ordering::SeqCst) {
                self.on_degraded.invoke(false);
            }
        }

        if self.degraded.load(Ordering::SeqCst) && !self.degraded_alarm_raised.load(Ordering::SeqCst) {
            let since = *self.degraded_since.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(since) = since {
                if (now - since).num_milliseconds() >= DEGRADED_ALARM_DELAY_MS {
                    self.degraded_alarm_raised.store(true, Ordering::SeqCst);
                    self.on_degraded.invoke(true);
                }
            }
        }
    }

    #[must_use]
    /// The current runtime state of an actuator, if configured.
    pub fn state_of(&self, slot_id: u8) -> Option<ActuatorRuntime> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).get(&slot_id).map(|s| s.runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(slot: u8) -> ActuatorConfig {
        ActuatorConfig {
            slot,
            name: format!("actuator-{slot}"),
            kind: crate::model::ActuatorKind::Relay,
            gpio_pin: 1,
            active_low: false,
            safe_state: ActuatorState::Off,
            min_on_time_ms: 0,
            max_on_time_ms: 0,
            pwm_frequency_hz: 0,
            enabled: true,
        }
    }

    #[test]
    fn profinet_command_turns_actuator_on() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::On);
    }

    #[test]
    fn unknown_command_byte_is_rejected() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        let err = ctrl.handle_output(9, 99, 0, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParam);
    }

    #[test]
    fn pwm_duty_above_100_is_clamped() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.handle_output(9, OutputCommand::Pwm as u8, 250, now).unwrap();
        assert_eq!(ctrl.state_of(9).unwrap().pwm_duty, 100);
    }

    #[test]
    fn anti_chatter_drops_commands_within_min_cycle_time() {
        let ctrl = ActuatorController::new();
        let mut cfg = config(9);
        cfg.min_on_time_ms = 10_000;
        let now = Utc::now();
        ctrl.reload_actuators(vec![cfg], now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::On);
        // immediate off command is within the min cycle window: dropped
        ctrl.handle_output(9, OutputCommand::Off as u8, 0, now).unwrap();
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::On);
    }

    #[test]
    fn manual_override_blocks_subsequent_profinet_until_next_command() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.manual_set(9, OutputCommand::On, 0, now).unwrap();
        assert!(ctrl.state_of(9).unwrap().manual_mode);
        // the next valid PROFINET command clears manual mode
        ctrl.handle_output(9, OutputCommand::Off as u8, 0, now).unwrap();
        assert!(!ctrl.state_of(9).unwrap().manual_mode);
    }

    #[test]
    fn interlock_overrides_manual_and_profinet() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.apply_interlock(InterlockCommand { target_slot: 9, action: InterlockAction::Off, pwm_duty: 0, held: true }, now);
        ctrl.manual_set(9, OutputCommand::On, 0, now).unwrap();
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::Off);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::Off);
    }

    #[test]
    fn max_on_time_triggers_safety_shutoff() {
        let ctrl = ActuatorController::new();
        let mut cfg = config(9);
        cfg.max_on_time_ms = 1_000;
        let now = Utc::now();
        ctrl.reload_actuators(vec![cfg], now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();

        let shutoffs = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&shutoffs);
        ctrl.on_safety_shutoff.set(Box::new(move |event| s.lock().unwrap().push(event)));

        let later = now + chrono::Duration::milliseconds(1_500);
        ctrl.watchdog_tick(later);
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::Off);
        assert_eq!(shutoffs.lock().unwrap()[0].0, 9);
        assert!(shutoffs.lock().unwrap()[0].1.contains("exceeded max on time"));
    }

    #[test]
    fn loss_of_commands_enters_degraded_mode_and_holds_last_state() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.notify_bridge_connected(true, now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();

        let degraded_events = Arc::new(Mutex::new(Vec::new()));
        let d = Arc::clone(&degraded_events);
        ctrl.on_degraded.set(Box::new(move |entering| d.lock().unwrap().push(entering)));

        // First tick: enters degraded (last-state-hold) but the alarm delay
        // hasn't elapsed yet, so no event fires.
        let just_past_timeout = now + chrono::Duration::milliseconds(COMMAND_TIMEOUT_MS + 100);
        ctrl.watchdog_tick(just_past_timeout);
        assert!(degraded_events.lock().unwrap().is_empty());
        assert!(ctrl.is_degraded());
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::On); // last-state-hold

        // Second tick: the full COMMAND_TIMEOUT_MS + DEGRADED_ALARM_DELAY_MS
        // has now elapsed since the last command, so the alarm fires.
        let past_alarm_delay = now + chrono::Duration::milliseconds(COMMAND_TIMEOUT_MS + DEGRADED_ALARM_DELAY_MS + 100);
        ctrl.watchdog_tick(past_alarm_delay);
        assert_eq!(degraded_events.lock().unwrap()[0], true);
        assert_eq!(ctrl.state_of(9).unwrap().state, ActuatorState::On);
    }

    #[test]
    fn degraded_mode_is_gated_on_the_bridge_reporting_connected() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();
        // the bridge never reports connected: silence alone must not enter
        // degraded mode.
        let later = now + chrono::Duration::milliseconds(COMMAND_TIMEOUT_MS + DEGRADED_ALARM_DELAY_MS + 1_000);
        ctrl.watchdog_tick(later);
        assert!(!ctrl.is_degraded());
    }

    #[test]
    fn a_fresh_command_exits_degraded_mode() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.notify_bridge_connected(true, now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();

        let past_alarm_delay = now + chrono::Duration::milliseconds(COMMAND_TIMEOUT_MS + DEGRADED_ALARM_DELAY_MS + 100);
        ctrl.watchdog_tick(past_alarm_delay);
        assert!(ctrl.is_degraded());

        ctrl.handle_output(9, OutputCommand::Off as u8, 0, past_alarm_delay).unwrap();
        ctrl.watchdog_tick(past_alarm_delay + chrono::Duration::milliseconds(10));
        assert!(!ctrl.is_degraded());
    }

    #[test]
    fn status_thread_reports_every_configured_actuator() {
        let ctrl = Arc::new(ActuatorController::new());
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.handle_output(9, OutputCommand::On as u8, 0, now).unwrap();

        let reports = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&reports);
        ctrl.on_status.set(Box::new(move |statuses| r.lock().unwrap().push(statuses)));

        ctrl.start();
        std::thread::sleep(STATUS_UPDATE_PERIOD + Duration::from_millis(200));
        ctrl.stop();

        let seen = reports.lock().unwrap();
        assert!(!seen.is_empty());
        assert_eq!(seen[0][0].slot, 9);
        assert_eq!(seen[0][0].state, ActuatorState::On);
    }

    #[test]
    fn emergency_stop_forces_safe_state_and_clears_overrides() {
        let ctrl = ActuatorController::new();
        let now = Utc::now();
        ctrl.reload_actuators(vec![config(9)], now);
        ctrl.manual_set(9, OutputCommand::On, 0, now).unwrap();
        ctrl.emergency_stop(now);
        let state = ctrl.state_of(9).unwrap();
        assert_eq!(state.state, ActuatorState::Off);
        assert!(!state.manual_mode);
    }

    #[test]
    fn start_stop_is_idempotent() {
        let ctrl = Arc::new(ActuatorController::new());
        ctrl.start();
        ctrl.start();
        assert!(ctrl.is_running());
        ctrl.stop();
        ctrl.stop();
        assert!(!ctrl.is_running());
    }
}
