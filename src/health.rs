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

//! Aggregated health snapshot and structured event log (spec.md §2 row H).
//!
//! Grounded on spec.md §5's own description of the health updater: "reads a
//! snapshot under its own mutex; producers write atomically by replace" —
//! the same replace-on-write idiom the teacher uses for `DashChannel`'s
//! target, generalized here from "a channel" to "a whole status struct" so
//! readers (a future TUI, an operator poll) never block a producer and vice
//! versa. The HTTP health-check surface itself is out of scope (spec.md
//! §1); this module is the snapshot it would serve.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::logger::LoggerStats;
use crate::model::ActuatorState;
use crate::profinet::ConnectionState;

/// Maximum recent events retained in memory (older ones are still in
/// `storage::Persistence` if `health` is wired to it).
pub const EVENT_RING_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Severity of a structured event.
pub enum EventSeverity {
    /// Routine, informational.
    Info,
    /// Worth operator attention.
    Warning,
    /// Requires prompt attention.
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A closed set of machine-readable event categories, persisted alongside
/// an event's free text so retention cleanup and the events view can query
/// on something other than a message string.
pub enum EventKind {
    /// A sensor driver failed a read or crossed the failure threshold.
    SensorFailure,
    /// An alarm rule was raised.
    AlarmRaised,
    /// An alarm instance was cleared.
    AlarmCleared,
    /// An actuator safety watchdog fired (max-on-time or degraded mode).
    ActuatorFault,
    /// The PROFINET bridge left the `Connected` state.
    ProfinetDisconnect,
    /// The data logger entered or remained in remote-delivery backoff.
    LoggerBackoff,
    /// Anything else worth recording.
    Generic,
}

#[derive(Debug, Clone)]
/// One structured event: a timestamped, sourced, human-readable line.
pub struct Event {
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Severity.
    pub severity: EventSeverity,
    /// The subsystem that raised it (e.g. "alarm", "actuator", "profinet").
    pub source: String,
    /// A human-readable description.
    pub message: String,
    /// The machine-readable category, if classified.
    pub kind: Option<EventKind>,
}

#[derive(Debug, Clone, PartialEq)]
/// One actuator's state as pushed by the actuator controller's dedicated
/// status thread, mirroring the teacher's `driver_status_listen` output.
pub struct ActuatorStatus {
    /// The PROFINET slot this actuator occupies.
    pub slot: u8,
    /// The configured name.
    pub name: String,
    /// Current commanded state.
    pub state: ActuatorState,
    /// Current PWM duty cycle, 0..=100.
    pub pwm_duty: u8,
    /// Whether the actuator is under manual override.
    pub manual_mode: bool,
}

#[derive(Debug, Clone)]
/// A point-in-time rollup of every component's status.
pub struct HealthSnapshot {
    /// When this snapshot was produced.
    pub timestamp: DateTime<Utc>,
    /// Whether the sensor sampler's worker thread is running.
    pub sensor_manager_running: bool,
    /// Whether the actuator controller's watchdog thread is running.
    pub actuator_controller_running: bool,
    /// Whether the actuator controller is currently in degraded
    /// (last-state-hold) mode.
    pub actuator_controller_degraded: bool,
    /// Whether the data logger's worker thread is running.
    pub logger_running: bool,
    /// Current PROFINET connection state.
    pub profinet_state: ConnectionState,
    /// Count of currently-active (unacknowledged) alarm instances.
    pub active_alarm_count: usize,
    /// Count of acknowledged-but-not-cleared alarm instances.
    pub acknowledged_alarm_count: usize,
    /// Latest data logger counters.
    pub logger_stats: LoggerStats,
    /// Per-actuator detail, as last reported by the status thread.
    pub actuator_statuses: Vec<ActuatorStatus>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        HealthSnapshot {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            sensor_manager_running: false,
            actuator_controller_running: false,
            actuator_controller_degraded: false,
            logger_running: false,
            profinet_state: ConnectionState::Idle,
            active_alarm_count: 0,
            acknowledged_alarm_count: 0,
            logger_stats: LoggerStats::default(),
            actuator_statuses: Vec::new(),
        }
    }
}

/// Owns the current health snapshot and a bounded ring of recent events.
/// Safe to share across every component as an `Arc`.
pub struct HealthMonitor {
    snapshot: RwLock<Arc<HealthSnapshot>>,
    events: RwLock<VecDeque<Event>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        HealthMonitor { snapshot: RwLock::new(Arc::new(HealthSnapshot::default())), events: RwLock::new(VecDeque::new()) }
    }
}

impl HealthMonitor {
    #[must_use]
    /// Construct a monitor with an empty, default-valued snapshot.
    pub fn new() -> HealthMonitor {
        HealthMonitor::default()
    }

    #[must_use]
    /// A cheap, lock-free-after-clone handle to the current snapshot.
    pub fn snapshot(&self) -> Arc<HealthSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the current snapshot wholesale. Producers build a fresh
    /// `HealthSnapshot` (typically cloning the previous one and touching a
    /// few fields) and call this rather than mutating shared state in
    /// place.
    pub fn publish(&self, snapshot: HealthSnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }

    /// Merge a fresh per-actuator report into the current snapshot without
    /// waiting for the next full health-updater pass: the actuator status
    /// thread and the health updater are independent producers, both
    /// writing by whole-struct replace.
    pub fn update_actuator_statuses(&self, statuses: Vec<ActuatorStatus>) {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        let mut next = (**guard).clone();
        next.actuator_statuses = statuses;
        *guard = Arc::new(next);
    }

    /// Record an event, evicting the oldest if the in-memory ring is full.
    pub fn record_event(
        &self,
        timestamp: DateTime<Utc>,
        severity: EventSeverity,
        source: impl Into<String>,
        message: impl Into<String>,
        kind: Option<EventKind>,
    ) {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        if events.len() >= EVENT_RING_SIZE {
            events.pop_front();
        }
        events.push_back(Event { timestamp, severity, source: source.into(), message: message.into(), kind });
    }

    #[must_use]
    /// A snapshot of the most recent events, oldest first.
    pub fn recent_events(&self) -> Vec<Event> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).iter().cloned().collect()
    }

    #[must_use]
    /// Recent events at or above `min_severity`, oldest first.
    pub fn recent_events_at_least(&self, min_severity: EventSeverity) -> Vec<Event> {
        self.events.read().unwrap_or_else(|e| e.into_inner()).iter().filter(|e| e.severity >= min_severity).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_reports_everything_stopped_and_idle() {
        let monitor = HealthMonitor::new();
        let snap = monitor.snapshot();
        assert!(!snap.sensor_manager_running);
        assert_eq!(snap.profinet_state, ConnectionState::Idle);
    }

    #[test]
    fn publish_replaces_the_snapshot_atomically() {
        let monitor = HealthMonitor::new();
        let before = monitor.snapshot();
        monitor.publish(HealthSnapshot { sensor_manager_running: true, ..HealthSnapshot::default() });
        let after = monitor.snapshot();
        assert!(!before.sensor_manager_running);
        assert!(after.sensor_manager_running);
    }

    #[test]
    fn actuator_statuses_merge_without_disturbing_other_fields() {
        let monitor = HealthMonitor::new();
        monitor.publish(HealthSnapshot { sensor_manager_running: true, ..HealthSnapshot::default() });
        monitor.update_actuator_statuses(vec![ActuatorStatus { slot: 9, name: "pump".into(), state: ActuatorState::On, pwm_duty: 0, manual_mode: false }]);
        let snap = monitor.snapshot();
        assert!(snap.sensor_manager_running);
        assert_eq!(snap.actuator_statuses.len(), 1);
        assert_eq!(snap.actuator_statuses[0].slot, 9);
    }

    #[test]
    fn event_ring_evicts_oldest_when_full() {
        let monitor = HealthMonitor::new();
        let now = Utc::now();
        for i in 0..EVENT_RING_SIZE + 10 {
            monitor.record_event(now, EventSeverity::Info, "test", format!("event {i}"), None);
        }
        let events = monitor.recent_events();
        assert_eq!(events.len(), EVENT_RING_SIZE);
        assert_eq!(events[0].message, "event 10");
    }

    #[test]
    fn severity_filter_only_returns_at_least_that_severe() {
        let monitor = HealthMonitor::new();
        let now = Utc::now();
        monitor.record_event(now, EventSeverity::Info, "test", "routine", None);
        monitor.record_event(now, EventSeverity::Critical, "test", "uh oh", Some(EventKind::ActuatorFault));
        let filtered = monitor.recent_events_at_least(EventSeverity::Warning);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].message, "uh oh");
    }
}
