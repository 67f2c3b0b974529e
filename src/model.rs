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

//! Core data model: modules, sensor configurations, alarm rules and
//! instances, actuators, and PROFINET slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Identity of a pluggable logical unit on the fieldbus device.
pub struct Module {
    /// Primary key.
    pub id: i64,
    /// Slot number, unique within the device, 1..64.
    pub slot: u8,
    /// Subslot number.
    pub subslot: u16,
    /// Human-readable name.
    pub name: String,
    /// The kind of module (informational).
    pub module_type: String,
    /// The PROFINET module identifier.
    pub module_ident: u32,
    /// The PROFINET submodule identifier.
    pub submodule_ident: u32,
    /// Free-form status string, last reported.
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Quality tag accompanying every sensor reading.
pub enum Quality {
    /// Fresh, in-range, successful read.
    Good,
    /// Out of range, or aging but not yet stale.
    Uncertain,
    /// Consecutive failures reached the failure threshold.
    Bad,
    /// The driver reports link-down.
    NotConnected,
}

impl Quality {
    #[must_use]
    /// The one-byte PROFINET encoding of this quality (spec.md §6.1).
    pub fn wire_byte(self) -> u8 {
        match self {
            Quality::Good => 0x80,
            Quality::Bad => 0x00,
            Quality::Uncertain => 0x40,
            Quality::NotConnected => 0x20,
        }
    }

    #[must_use]
    /// The IOPS byte to accompany a value of this quality: GOOD only when
    /// the value itself is GOOD, BAD otherwise (spec.md §4.2).
    pub fn iops(self) -> u8 {
        match self {
            Quality::Good => 0x80,
            _ => 0x00,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A tagged-variant sensor configuration, one per configured module.
#[serde(tag = "kind")]
pub enum SensorConfig {
    /// A physical sensor on a dedicated bus/protocol (DS18B20, DHT22, ...).
    Physical {
        /// The interface name (e.g. "onewire", "i2c").
        interface: String,
        /// The bus identifier within the interface.
        bus: u8,
        /// The channel/address on the bus.
        channel: u8,
        /// The engineering unit of the converted value.
        unit: String,
        /// Minimum valid engineering value.
        min: f64,
        /// Maximum valid engineering value.
        max: f64,
        /// Poll period in milliseconds.
        poll_rate_ms: u32,
        /// Read timeout in milliseconds.
        timeout_ms: u32,
    },
    /// An ADC channel with a linear raw-to-engineering mapping.
    Adc {
        /// Index into the device's configured ADC chip-select list.
        adc: u8,
        /// ADC channel, 0..=7 for an 8-channel device.
        channel: u8,
        /// ADC gain setting (informational, driver-specific).
        gain: f64,
        /// ADC reference voltage.
        reference_voltage: f64,
        /// Minimum raw ADC count.
        raw_min: f64,
        /// Maximum raw ADC count.
        raw_max: f64,
        /// Engineering value corresponding to `raw_min`.
        eng_min: f64,
        /// Engineering value corresponding to `raw_max`.
        eng_max: f64,
        /// Poll period in milliseconds.
        poll_rate_ms: u32,
    },
    /// A value fetched by polling a URL and extracting a JSON field.
    WebPoll {
        /// The URL to poll.
        url: String,
        /// The HTTP method, e.g. "GET".
        method: String,
        /// Extra headers to send.
        headers: Vec<(String, String)>,
        /// A `.`-separated path into the JSON response body.
        json_path: String,
        /// Poll period in milliseconds.
        poll_rate_ms: u32,
        /// Request timeout in milliseconds.
        timeout_ms: u32,
    },
    /// A value computed from other sensors via a formula.
    Calculated {
        /// The infix formula text, referencing `s0..s7`.
        formula: String,
        /// The module ids feeding `s0..s7`, in order.
        input_sensors: Vec<i64>,
        /// Poll period in milliseconds.
        poll_rate_ms: u32,
    },
    /// A constant value, optionally writable by an operator.
    Static {
        /// The stored constant value.
        value: f64,
        /// Whether an operator may overwrite `value` at runtime.
        writable: bool,
    },
}

impl SensorConfig {
    #[must_use]
    /// The poll period for this sensor, in milliseconds. Static sensors
    /// never need re-reading, so they report a large idle period.
    pub fn poll_rate_ms(&self) -> u32 {
        match self {
            SensorConfig::Physical { poll_rate_ms, .. }
            | SensorConfig::Adc { poll_rate_ms, .. }
            | SensorConfig::WebPoll { poll_rate_ms, .. }
            | SensorConfig::Calculated { poll_rate_ms, .. } => *poll_rate_ms,
            SensorConfig::Static { .. } => 60_000,
        }
    }

    #[must_use]
    /// Whether this variant is registered with the PROFINET bridge directly
    /// (all variants except Calculated, per spec.md §4.2 reload rules).
    pub fn is_profinet_input(&self) -> bool {
        !matches!(self, SensorConfig::Calculated { .. })
    }
}

#[derive(Debug, Clone)]
/// Transient per-sensor runtime state. Lives only with the sensor manager.
pub struct SensorRuntime {
    /// The last computed engineering value.
    pub current_value: f64,
    /// The last raw driver value (pre-calibration), if applicable.
    pub raw_value: f64,
    /// The timestamp of the last completed read attempt.
    pub last_read_timestamp: DateTime<Utc>,
    /// The calibration pipeline applied after the raw read.
    pub calibration: Calibration,
    /// Optional EMA/rolling-average ring buffer width; `None` disables it.
    pub ema_width: Option<usize>,
    /// The EMA ring buffer contents, most-recent last.
    pub ema_buffer: std::collections::VecDeque<f64>,
    /// Whether the driver currently reports link-up.
    pub connected: bool,
    /// Consecutive successful reads.
    pub consecutive_successes: u64,
    /// Consecutive failed reads.
    pub consecutive_failures: u64,
    /// Monotonically increasing total read attempts.
    pub total_reads: u64,
    /// Monotonically increasing total failed reads.
    pub total_failures: u64,
    /// The most recently computed quality.
    pub quality: Quality,
    /// Age after which a reading is considered stale, in milliseconds.
    pub stale_timeout_ms: u32,
    /// Consecutive failures required before quality becomes BAD.
    pub failure_threshold: u64,
    /// The valid engineering-value range, if bounded.
    pub valid_range: Option<(f64, f64)>,
}

impl SensorRuntime {
    #[must_use]
    /// Construct a fresh runtime state for a newly (re)loaded sensor.
    pub fn new(stale_timeout_ms: u32, failure_threshold: u64, valid_range: Option<(f64, f64)>) -> SensorRuntime {
        SensorRuntime {
            current_value: 0.0,
            raw_value: 0.0,
            last_read_timestamp: DateTime::<Utc>::UNIX_EPOCH,
            calibration: Calibration::Linear { scale: 1.0, offset: 0.0 },
            ema_width: None,
            ema_buffer: std::collections::VecDeque::new(),
            connected: true,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_reads: 0,
            total_failures: 0,
            quality: Quality::NotConnected,
            stale_timeout_ms,
            failure_threshold,
            valid_range,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// The condition an alarm rule evaluates.
pub enum AlarmCondition {
    /// Fires when `value > threshold_high`.
    Above,
    /// Fires when `value < threshold_low`.
    Below,
    /// Fires when value is outside `[threshold_low, threshold_high]`.
    OutOfRange,
    /// Fires when `|value - previous| / dt` exceeds `threshold_high`.
    Rate,
    /// Fires when `|value - setpoint| > threshold_high`.
    Deviation,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Alarm severity, ordered from least to most severe.
pub enum Severity {
    /// Informational.
    Low,
    /// Worth operator attention soon.
    Medium,
    /// Requires prompt operator attention.
    High,
    /// Safety-relevant; may drive an interlock.
    Critical,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// What an alarm's interlock should do to its target actuator.
pub enum InterlockAction {
    /// Do nothing.
    None,
    /// Force the actuator off.
    Off,
    /// Force the actuator on.
    On,
    /// Force the actuator to a specific PWM duty cycle.
    Pwm,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A safety interlock that an alarm raise can trigger on an actuator.
pub struct Interlock {
    /// Whether this interlock is active.
    pub enabled: bool,
    /// The actuator slot to command.
    pub target_slot: u8,
    /// The action to apply.
    pub action: InterlockAction,
    /// The PWM duty cycle to apply, when `action == Pwm`.
    pub pwm_duty: u8,
    /// Whether clearing the alarm releases the actuator back to controller
    /// authority.
    pub release_on_clear: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A rule's target: an ordinary module, or the synthetic system alarm
/// (spec.md §9 — `module_id=0` is not a real foreign key).
pub enum AlarmTarget {
    /// A rule evaluated against a concrete module's readings.
    Module(i64),
    /// A system-level alarm with no underlying sensor.
    System,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// An alarm rule definition.
pub struct AlarmRule {
    /// Primary key.
    pub id: i64,
    /// The target this rule evaluates.
    pub target: AlarmTarget,
    /// Human-readable name.
    pub name: String,
    /// The condition to evaluate.
    pub condition: AlarmCondition,
    /// The high threshold (ABOVE/OUT_OF_RANGE/RATE/DEVIATION).
    pub threshold_high: f64,
    /// The low threshold (BELOW/OUT_OF_RANGE).
    pub threshold_low: f64,
    /// The setpoint used by DEVIATION.
    pub setpoint: f64,
    /// Severity of a raised instance.
    pub severity: Severity,
    /// Whether this rule is evaluated at all.
    pub enabled: bool,
    /// Whether a raised instance clears itself once the condition lifts.
    pub auto_clear: bool,
    /// Hysteresis gap, as a percentage of the relevant threshold.
    pub hysteresis_percent: f64,
    /// The interlock this rule may trigger on raise.
    pub interlock: Interlock,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// The lifecycle state of an alarm instance.
pub enum AlarmState {
    /// Currently firing and unacknowledged.
    Active,
    /// Firing (or was firing) and acknowledged by an operator.
    Acknowledged,
    /// No longer firing; terminal state, kept for history.
    Cleared,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A history row recording one raise/ack/clear lifecycle of a rule.
pub struct AlarmInstance {
    /// Primary key.
    pub id: i64,
    /// The rule that raised this instance.
    pub rule_id: i64,
    /// The target the rule was evaluated against.
    pub target: AlarmTarget,
    /// Severity at raise time.
    pub severity: Severity,
    /// Current lifecycle state.
    pub state: AlarmState,
    /// The value that caused the raise.
    pub trigger_value: f64,
    /// A human-readable description.
    pub message: String,
    /// When the instance was raised.
    pub raised_at: DateTime<Utc>,
    /// When the instance was acknowledged, if ever.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the instance was cleared, if ever.
    pub cleared_at: Option<DateTime<Utc>>,
    /// Who acknowledged the instance, if anyone.
    pub acknowledged_by: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// The kind of actuator a slot drives.
pub enum ActuatorKind {
    /// An on/off relay.
    Relay,
    /// A pump, on/off or PWM-capable depending on `pwm_frequency_hz`.
    Pump,
    /// A valve, on/off or PWM-capable.
    Valve,
    /// A pure PWM output.
    Pwm,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// The runtime state of an actuator.
pub enum ActuatorState {
    /// De-energized.
    Off,
    /// Energized.
    On,
    /// A safety fault latched the actuator; requires operator clear.
    Fault,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Configuration of a single actuator.
pub struct ActuatorConfig {
    /// Slot number, unique, typically 9..16.
    pub slot: u8,
    /// Human-readable name.
    pub name: String,
    /// The kind of actuator.
    pub kind: ActuatorKind,
    /// The GPIO pin driving this actuator.
    pub gpio_pin: u8,
    /// Whether the GPIO line is active-low.
    pub active_low: bool,
    /// The state to assume when nothing else has commanded it.
    pub safe_state: ActuatorState,
    /// Minimum time between state changes, for anti-chatter.
    pub min_on_time_ms: u32,
    /// Maximum continuous on-time before the watchdog forces it off.
    pub max_on_time_ms: u32,
    /// PWM carrier frequency, if PWM-capable.
    pub pwm_frequency_hz: u32,
    /// Whether this actuator currently accepts commands at all.
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Runtime bookkeeping for one actuator.
pub struct ActuatorRuntime {
    /// Current commanded state.
    pub state: ActuatorState,
    /// Current PWM duty cycle, 0..=100.
    pub pwm_duty: u8,
    /// Whether the actuator is under manual override (cleared by the next
    /// valid PROFINET command).
    pub manual_mode: bool,
    /// The time of the last state change.
    pub last_state_change: DateTime<Utc>,
    /// The time of the last accepted command of any kind.
    pub last_command_time: DateTime<Utc>,
    /// Count of accepted state changes.
    pub cycle_count: u64,
    /// Whether an alarm interlock currently holds this actuator.
    pub interlocked: bool,
}

impl ActuatorRuntime {
    #[must_use]
    /// Construct a fresh runtime in the given safe state.
    pub fn new(safe_state: ActuatorState, now: DateTime<Utc>) -> ActuatorRuntime {
        ActuatorRuntime {
            state: safe_state,
            pwm_duty: 0,
            manual_mode: false,
            last_state_change: now,
            last_command_time: now,
            cycle_count: 0,
            interlocked: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
/// A command received on a PROFINET output slot (spec.md §6.1).
pub enum OutputCommand {
    /// Turn the actuator off.
    Off = 0,
    /// Turn the actuator on.
    On = 1,
    /// Drive the actuator at a PWM duty cycle.
    Pwm = 2,
}

impl OutputCommand {
    #[must_use]
    /// Decode a command byte, rejecting unknown codes.
    pub fn from_byte(b: u8) -> Option<OutputCommand> {
        match b {
            0 => Some(OutputCommand::Off),
            1 => Some(OutputCommand::On),
            2 => Some(OutputCommand::Pwm),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A PROFINET (slot, subslot) address.
pub struct SlotAddress {
    /// Slot number.
    pub slot: u8,
    /// Subslot number.
    pub subslot: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_wire_encoding() {
        assert_eq!(Quality::Good.wire_byte(), 0x80);
        assert_eq!(Quality::Bad.wire_byte(), 0x00);
        assert_eq!(Quality::Uncertain.wire_byte(), 0x40);
        assert_eq!(Quality::NotConnected.wire_byte(), 0x20);
    }

    #[test]
    fn iops_only_good_for_good_quality() {
        assert_eq!(Quality::Good.iops(), 0x80);
        assert_eq!(Quality::Uncertain.iops(), 0x00);
        assert_eq!(Quality::Bad.iops(), 0x00);
        assert_eq!(Quality::NotConnected.iops(), 0x00);
    }

    #[test]
    fn output_command_rejects_unknown() {
        assert_eq!(OutputCommand::from_byte(0), Some(OutputCommand::Off));
        assert_eq!(OutputCommand::from_byte(1), Some(OutputCommand::On));
        assert_eq!(OutputCommand::from_byte(2), Some(OutputCommand::Pwm));
        assert_eq!(OutputCommand::from_byte(3), None);
    }

    #[test]
    fn calculated_sensor_is_not_a_profinet_input() {
        let calc = SensorConfig::Calculated {
            formula: "s0 + s1".into(),
            input_sensors: vec![1, 2],
            poll_rate_ms: 100,
        };
        assert!(!calc.is_profinet_input());

        let adc = SensorConfig::Adc {
            adc: 0,
            channel: 0,
            gain: 1.0,
            reference_voltage: 3.3,
            raw_min: 0.0,
            raw_max: 4095.0,
            eng_min: 0.0,
            eng_max: 100.0,
            poll_rate_ms: 100,
        };
        assert!(adc.is_profinet_input());
    }
}
