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

//! The PROFINET I/O bridge: the plugged-module table, cyclic input/output
//! exchange, and the connection state machine (spec.md §4.4).
//!
//! Generalizes the teacher's `outgoing::DashChannel`: a shared, lockable
//! channel whose target can be connected or disconnected at any time, with
//! writes becoming no-ops once the target is gone. Here the "target" is a
//! fieldbus controller rather than a dashboard socket, and writes are
//! deduplicated (only a changed output frame is worth sending).
//!
//! The bridge drives an underlying PROFINET device stack through the
//! `ProfinetStack` seam below, mirroring the `MakeHardware`/`RawDrivers`
//! dependency-injection split the sensor side uses for its own hardware:
//! one real implementation would wrap a vendor PROFINET library (out of
//! scope for this crate per spec.md §6.3, which treats it as a consumed
//! black box), the `DummyProfinetStack` here stands in for it in tests and
//! wherever no such library is wired up.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::callbacks::Slot;
use crate::error::{ErrorKind, RtuError};
use crate::model::{Module, Quality, SlotAddress};

/// The black-box PROFINET device stack the bridge wraps (spec.md §6.3):
/// `plug_module`/`plug_submodule`, input/output exchange, process alarms,
/// and periodic advancement. A real implementation talks to vendor
/// silicon/firmware; `DummyProfinetStack` below is the no-op stand-in used
/// when none is wired up.
pub trait ProfinetStack: Send + Sync {
    /// Plug a module at `slot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack rejects the plug request.
    fn plug_module(&self, slot: u8, module_ident: u32) -> Result<(), RtuError>;

    /// Plug a submodule under an already-plugged module.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack rejects the plug request.
    fn plug_submodule(&self, slot: u8, subslot: u16, submodule_ident: u32) -> Result<(), RtuError>;

    /// Push fresh input data and its IOPS byte down to the stack.
    fn input_set_data_and_iops(&self, slot: u8, subslot: u16, data: &[u8], iops: u8);

    /// Poll the stack for output data: `(new_data, bytes, iops)`.
    fn output_get_data_and_iops(&self, slot: u8, subslot: u16) -> (bool, Vec<u8>, u8);

    /// Send a process alarm for a slot/subslot.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack could not queue the alarm.
    fn alarm_send_process_alarm(&self, slot: u8, subslot: u16, usi: u16, data: &[u8]) -> Result<(), RtuError>;

    /// Advance the stack's own periodic work (spec.md §4.4's 1ms tick loop).
    fn handle_periodic(&self);
}

/// A `ProfinetStack` that does nothing and always succeeds, used when no
/// real stack is configured.
pub struct DummyProfinetStack;

impl ProfinetStack for DummyProfinetStack {
    fn plug_module(&self, _slot: u8, _module_ident: u32) -> Result<(), RtuError> {
        Ok(())
    }

    fn plug_submodule(&self, _slot: u8, _subslot: u16, _submodule_ident: u32) -> Result<(), RtuError> {
        Ok(())
    }

    fn input_set_data_and_iops(&self, _slot: u8, _subslot: u16, _data: &[u8], _iops: u8) {}

    fn output_get_data_and_iops(&self, _slot: u8, _subslot: u16) -> (bool, Vec<u8>, u8) {
        (false, Vec::new(), 0)
    }

    fn alarm_send_process_alarm(&self, _slot: u8, _subslot: u16, _usi: u16, _data: &[u8]) -> Result<(), RtuError> {
        Ok(())
    }

    fn handle_periodic(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The PROFINET application relationship's connection state (spec.md §4.4).
pub enum ConnectionState {
    /// No application relationship has been attempted.
    Idle,
    /// The device is configured and ready to accept a connection.
    Ready,
    /// A connect request is in flight.
    Connecting,
    /// Cyclic data exchange is active.
    Connected,
    /// The application relationship aborted and must be reconnected.
    Aborted,
}

#[derive(Debug, Clone)]
struct PluggedModule {
    module: Module,
    input: Vec<u8>,
    input_iops: u8,
    output: Vec<u8>,
    last_sent_output_snapshot: Option<Vec<u8>>,
}

/// The PROFINET I/O bridge.
pub struct ProfinetBridge {
    state: Mutex<ConnectionState>,
    modules: Mutex<HashMap<SlotAddress, PluggedModule>>,
    stack: Arc<dyn ProfinetStack>,
    /// Fired when the bridge reaches `Connected`.
    pub on_connect: Slot<dyn Fn(()) + Send + Sync>,
    /// Fired when the bridge leaves `Connected`.
    pub on_disconnect: Slot<dyn Fn(()) + Send + Sync>,
    /// Fired once per output frame that actually changed, with the raw
    /// 2-byte output word: `(slot, [command_byte, pwm_duty_byte])`.
    pub on_output_frame: Slot<dyn Fn((u8, [u8; 2])) + Send + Sync>,
    /// Fired on a PROFINET process alarm, carrying the originating slot and
    /// a short reason string.
    pub on_alarm: Slot<dyn Fn((u8, String)) + Send + Sync>,
}

impl Default for ProfinetBridge {
    fn default() -> Self {
        ProfinetBridge::with_stack(Arc::new(DummyProfinetStack))
    }
}

impl ProfinetBridge {
    #[must_use]
    /// Construct a bridge with no modules plugged, state `Idle`, and no
    /// real PROFINET stack wired up (`DummyProfinetStack`).
    pub fn new() -> ProfinetBridge {
        ProfinetBridge::default()
    }

    #[must_use]
    /// Construct a bridge backed by a specific `ProfinetStack`, e.g. a real
    /// vendor-library wrapper or a recording test double.
    pub fn with_stack(stack: Arc<dyn ProfinetStack>) -> ProfinetBridge {
        ProfinetBridge {
            state: Mutex::new(ConnectionState::Idle),
            modules: Mutex::new(HashMap::new()),
            stack,
            on_connect: Slot::default(),
            on_disconnect: Slot::default(),
            on_output_frame: Slot::default(),
            on_alarm: Slot::default(),
        }
    }

    #[must_use]
    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Plug a module at its configured `(slot, subslot)`.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::AlreadyExists` if that address is already
    /// plugged.
    pub fn add_module(&self, module: Module) -> Result<(), RtuError> {
        let addr = SlotAddress { slot: module.slot, subslot: module.subslot };
        let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        if modules.contains_key(&addr) {
            return Err(RtuError::new(ErrorKind::AlreadyExists, format!("slot {}/{} already plugged", addr.slot, addr.subslot)));
        }
        self.stack.plug_module(module.slot, module.module_ident)?;
        self.stack.plug_submodule(module.slot, module.subslot, module.submodule_ident)?;
        modules.insert(
            addr,
            PluggedModule { module, input: vec![0; 5], input_iops: 0, output: vec![0; 2], last_sent_output_snapshot: None },
        );
        Ok(())
    }

    /// Remove a plugged module.
    pub fn remove_module(&self, addr: SlotAddress) {
        self.modules.lock().unwrap_or_else(|e| e.into_inner()).remove(&addr);
    }

    /// Drive the connection state machine forward: `Idle`/`Aborted` ->
    /// `Ready` -> `Connecting` -> `Connected`. Fires `on_connect` on
    /// reaching `Connected`.
    pub fn connect(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = match *state {
            ConnectionState::Idle | ConnectionState::Aborted => ConnectionState::Ready,
            ConnectionState::Ready => ConnectionState::Connecting,
            ConnectionState::Connecting => {
                drop(state);
                self.on_connect.invoke(());
                return;
            }
            ConnectionState::Connected => ConnectionState::Connected,
        };
    }

    /// Abort the application relationship; cyclic exchange stops until
    /// `connect` is driven again. Fires `on_disconnect` if currently
    /// connected.
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let was_connected = *state == ConnectionState::Connected;
        *state = ConnectionState::Aborted;
        drop(state);
        if was_connected {
            self.on_disconnect.invoke(());
        }
    }

    /// Update a module's raw input bytes and IOPS directly. When connected,
    /// also pushes the fresh bytes down to the underlying stack (spec.md
    /// §6.1's "when connected, pushes to the stack with the current IOPS").
    pub fn update_input(&self, addr: SlotAddress, data: &[u8], iops: u8) {
        let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(m) = modules.get_mut(&addr) {
            m.input = data.to_vec();
            m.input_iops = iops;
        }
        drop(modules);
        if self.state() == ConnectionState::Connected {
            self.stack.input_set_data_and_iops(addr.slot, addr.subslot, data, iops);
        }
    }

    /// Update a module's input with the spec.md §6.1 5-byte encoding: a
    /// big-endian `f32` followed by the quality byte, with IOPS derived
    /// from the quality.
    pub fn update_input_float(&self, addr: SlotAddress, value: f32, quality: Quality) {
        let mut bytes = Vec::with_capacity(5);
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes.push(quality.wire_byte());
        self.update_input(addr, &bytes, quality.iops());
    }

    /// Read a module's current commanded output word, if plugged.
    #[must_use]
    pub fn get_output(&self, addr: SlotAddress) -> Option<[u8; 2]> {
        let modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        modules.get(&addr).map(|m| [m.output[0], m.output[1]])
    }

    /// Accept a fresh output word from the fieldbus controller for a slot.
    pub fn set_output(&self, addr: SlotAddress, command_byte: u8, pwm_duty_byte: u8) {
        let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(m) = modules.get_mut(&addr) {
            m.output = vec![command_byte, pwm_duty_byte];
        }
    }

    /// Raise a PROFINET process alarm against a slot, best-effort through
    /// the underlying stack, then notify local subscribers regardless of
    /// whether the stack accepted it (a lost wire alarm shouldn't silence
    /// the in-process one).
    pub fn send_alarm(&self, slot: u8, reason: impl Into<String>) {
        let reason = reason.into();
        let _ = self.stack.alarm_send_process_alarm(slot, 1, 0, reason.as_bytes());
        self.on_alarm.invoke((slot, reason));
    }

    /// Run one cyclic exchange pass: advances the underlying stack's own
    /// periodic work, then for every plugged module whose output word
    /// changed since the last pass, fires `on_output_frame` exactly once
    /// (at-most-once delivery per spec.md §4.4 — a frame that never changes
    /// is never resent).
    pub fn cyclic_tick(&self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        self.stack.handle_periodic();
        let mut modules = self.modules.lock().unwrap_or_else(|e| e.into_inner());
        let mut to_fire = Vec::new();
        for m in modules.values_mut() {
            let changed = m.last_sent_output_snapshot.as_deref() != Some(m.output.as_slice());
            if changed {
                m.last_sent_output_snapshot = Some(m.output.clone());
                to_fire.push((m.module.slot, [m.output[0], m.output[1]]));
            }
        }
        drop(modules);
        for (slot, word) in to_fire {
            self.on_output_frame.invoke((slot, word));
        }
    }
}
