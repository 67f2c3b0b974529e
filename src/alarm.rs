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

//! The alarm engine: rule evaluation with hysteresis, the raise/acknowledge/
//! clear state machine, and interlock dispatch.
//!
//! The range check and emergency-stop dispatch in the teacher's
//! `data::sensor_listen` ("if rolling average went out of bounds ... spin up
//! another thread to emergency stop") is the seed this module generalizes:
//! a bound check in the hot read path that, on violation, reaches past the
//! sensor loop to command an actuator. Here the bound check gains
//! hysteresis and a persistent instance history, and the single hardcoded
//! emergency stop becomes a per-rule configurable interlock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::callbacks::Slot;
use crate::error::{ErrorKind, RtuError};
use crate::model::{AlarmCondition, AlarmInstance, AlarmRule, AlarmState, AlarmTarget, InterlockAction};

/// An interlock command dispatched to the actuator controller. Carries
/// strictly higher precedence than a PROFINET output command (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterlockCommand {
    /// The actuator slot to command.
    pub target_slot: u8,
    /// The action to apply.
    pub action: InterlockAction,
    /// The PWM duty cycle, when `action == Pwm`.
    pub pwm_duty: u8,
    /// Whether this interlock is currently held (raised) or released
    /// (the alarm cleared and `release_on_clear` is set).
    pub held: bool,
}

struct TargetHistory {
    last_value: f64,
    last_time: DateTime<Utc>,
}

/// The alarm engine. One instance serves every rule in the configuration.
pub struct AlarmEngine {
    rules: Mutex<Vec<AlarmRule>>,
    /// At most one non-`Cleared` instance per rule id, per spec.md's
    /// invariant.
    active: Mutex<HashMap<i64, AlarmInstance>>,
    rate_history: Mutex<HashMap<AlarmTarget, TargetHistory>>,
    next_instance_id: AtomicI64,
    /// Fired when an instance transitions into `Active`.
    pub on_raised: Slot<dyn Fn(AlarmInstance) + Send + Sync>,
    /// Fired when an instance transitions into `Cleared`.
    pub on_cleared: Slot<dyn Fn(AlarmInstance) + Send + Sync>,
    /// Fired whenever an interlock is asserted or released.
    pub on_interlock: Slot<dyn Fn(InterlockCommand) + Send + Sync>,
}

impl Default for AlarmEngine {
    fn default() -> Self {
        AlarmEngine {
            rules: Mutex::new(Vec::new()),
            active: Mutex::new(HashMap::new()),
            rate_history: Mutex::new(HashMap::new()),
            next_instance_id: AtomicI64::new(1),
            on_raised: Slot::default(),
            on_cleared: Slot::default(),
            on_interlock: Slot::default(),
        }
    }
}

impl AlarmEngine {
    #[must_use]
    /// Construct an empty alarm engine.
    pub fn new() -> AlarmEngine {
        AlarmEngine::default()
    }

    /// Replace the rule set wholesale, e.g. after an administrative edit.
    pub fn set_rules(&self, rules: Vec<AlarmRule>) {
        *self.rules.lock().unwrap_or_else(|e| e.into_inner()) = rules;
    }

    /// Evaluate every enabled rule targeting `target` against a fresh
    /// `value`, advancing the raise/clear state machine and dispatching any
    /// interlocks. Returns every instance that changed state this call.
    pub fn check_value(&self, target: AlarmTarget, value: f64, now: DateTime<Utc>) -> Vec<AlarmInstance> {
        let (prev_value, dt_seconds) = {
            let mut history = self.rate_history.lock().unwrap_or_else(|e| e.into_inner());
            let (prev_value, dt_seconds) = match history.get(&target) {
                Some(prev) => {
                    let dt = (now - prev.last_time).num_milliseconds().max(0) as f64 / 1000.0;
                    (prev.last_value, dt)
                }
                None => (value, 0.0),
            };
            history.insert(target, TargetHistory { last_value: value, last_time: now });
            (prev_value, dt_seconds)
        };

        let rules: Vec<AlarmRule> = {
            let guard = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            guard.iter().filter(|r| r.enabled && r.target == target).cloned().collect()
        };

        let mut changed = Vec::new();
        for rule in rules {
            if let Some(instance) = self.evaluate_rule(&rule, value, prev_value, dt_seconds, now) {
                changed.push(instance);
            }
        }
        changed
    }

    fn evaluate_rule(&self, rule: &AlarmRule, value: f64, prev_value: f64, dt_seconds: f64, now: DateTime<Utc>) -> Option<AlarmInstance> {
        let gap_high = rule.threshold_high.abs() * rule.hysteresis_percent / 100.0;
        let gap_low = rule.threshold_low.abs() * rule.hysteresis_percent / 100.0;

        let raising = match rule.condition {
            AlarmCondition::Above => value > rule.threshold_high,
            AlarmCondition::Below => value < rule.threshold_low,
            AlarmCondition::OutOfRange => value > rule.threshold_high || value < rule.threshold_low,
            AlarmCondition::Rate => dt_seconds > 0.0 && (value - prev_value).abs() / dt_seconds > rule.threshold_high,
            AlarmCondition::Deviation => (value - rule.setpoint).abs() > rule.threshold_high,
        };
        // The condition used to *clear* an already-raised instance is never
        // the plain negation of `raising`: it is offset inward by the
        // hysteresis gap, so a value oscillating right at the raise
        // threshold cannot chatter the alarm. A value that never raised the
        // alarm in the first place has nothing to clear, so this only
        // matters once `active` holds an instance for this rule.
        let clearing = match rule.condition {
            AlarmCondition::Above => value <= rule.threshold_high - gap_high,
            AlarmCondition::Below => value >= rule.threshold_low + gap_low,
            AlarmCondition::OutOfRange => value <= rule.threshold_high - gap_high && value >= rule.threshold_low + gap_low,
            AlarmCondition::Rate => dt_seconds > 0.0 && (value - prev_value).abs() / dt_seconds <= rule.threshold_high - gap_high,
            AlarmCondition::Deviation => (value - rule.setpoint).abs() <= rule.threshold_high - gap_high,
        };

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let currently_active = active.contains_key(&rule.id);

        if raising && !currently_active {
            let instance = AlarmInstance {
                id: self.next_instance_id.fetch_add(1, Ordering::SeqCst),
                rule_id: rule.id,
                target: rule.target,
                severity: rule.severity,
                state: AlarmState::Active,
                trigger_value: value,
                message: format!("{} raised at {value}", rule.name),
                raised_at: now,
                acknowledged_at: None,
                cleared_at: None,
                acknowledged_by: None,
            };
            active.insert(rule.id, instance.clone());
            drop(active);
            self.on_raised.invoke(instance.clone());
            self.dispatch_interlock(rule, true);
            Some(instance)
        } else if currently_active && rule.auto_clear && clearing {
            let mut instance = active.remove(&rule.id).unwrap();
            instance.state = AlarmState::Cleared;
            instance.cleared_at = Some(now);
            drop(active);
            self.on_cleared.invoke(instance.clone());
            self.dispatch_interlock(rule, false);
            Some(instance)
        } else {
            None
        }
    }

    fn dispatch_interlock(&self, rule: &AlarmRule, raised: bool) {
        if !rule.interlock.enabled {
            return;
        }
        let held = raised || !rule.interlock.release_on_clear;
        self.on_interlock.invoke(InterlockCommand {
            target_slot: rule.interlock.target_slot,
            action: rule.interlock.action,
            pwm_duty: rule.interlock.pwm_duty,
            held,
        });
    }

    /// Acknowledge a single active instance by rule id.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::NotFound` if no active instance exists for that
    /// rule.
    pub fn acknowledge(&self, rule_id: i64, by: &str, now: DateTime<Utc>) -> Result<AlarmInstance, RtuError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        let instance = active
            .get_mut(&rule_id)
            .ok_or_else(|| RtuError::new(ErrorKind::NotFound, format!("no active alarm for rule {rule_id}")))?;
        instance.state = AlarmState::Acknowledged;
        instance.acknowledged_at = Some(now);
        instance.acknowledged_by = Some(by.to_string());
        Ok(instance.clone())
    }

    /// Acknowledge every currently active (not yet acknowledged) instance.
    pub fn acknowledge_all(&self, by: &str, now: DateTime<Utc>) -> Vec<AlarmInstance> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active
            .values_mut()
            .filter(|i| i.state == AlarmState::Active)
            .map(|i| {
                i.state = AlarmState::Acknowledged;
                i.acknowledged_at = Some(now);
                i.acknowledged_by = Some(by.to_string());
                i.clone()
            })
            .collect()
    }

    #[must_use]
    /// Snapshot of every currently non-cleared instance.
    pub fn active_instances(&self) -> Vec<AlarmInstance> {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Interlock, Severity};

    fn rule(id: i64, condition: AlarmCondition, threshold_high: f64, threshold_low: f64, hysteresis: f64, auto_clear: bool) -> AlarmRule {
        AlarmRule {
            id,
            target: AlarmTarget::Module(1),
            name: format!("rule-{id}"),
            condition,
            threshold_high,
            threshold_low,
            setpoint: 0.0,
            severity: Severity::High,
            enabled: true,
            auto_clear,
            hysteresis_percent: hysteresis,
            interlock: Interlock { enabled: false, target_slot: 0, action: InterlockAction::None, pwm_duty: 0, release_on_clear: true },
        }
    }

    #[test]
    fn above_threshold_raises_once() {
        let engine = AlarmEngine::new();
        engine.set_rules(vec![rule(1, AlarmCondition::Above, 100.0, 0.0, 5.0, true)]);
        let now = Utc::now();
        let first = engine.check_value(AlarmTarget::Module(1), 150.0, now);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].state, AlarmState::Active);
        // A second reading still above threshold must not raise again.
        let second = engine.check_value(AlarmTarget::Module(1), 160.0, now);
        assert!(second.is_empty());
        assert_eq!(engine.active_instances().len(), 1);
    }

    #[test]
    fn hysteresis_prevents_chatter_at_the_raise_threshold() {
        let engine = AlarmEngine::new();
        engine.set_rules(vec![rule(1, AlarmCondition::Above, 100.0, 0.0, 10.0, true)]);
        let now = Utc::now();
        engine.check_value(AlarmTarget::Module(1), 105.0, now);
        assert_eq!(engine.active_instances().len(), 1);
        // Drops just below the raise threshold, but still above the
        // hysteresis-adjusted clear threshold (90.0): must stay active.
        let still_active = engine.check_value(AlarmTarget::Module(1), 95.0, now);
        assert!(still_active.is_empty());
        assert_eq!(engine.active_instances().len(), 1);
        // Drops below the clear threshold: now it clears.
        let cleared = engine.check_value(AlarmTarget::Module(1), 85.0, now);
        assert_eq!(cleared.len(), 1);
        assert_eq!(cleared[0].state, AlarmState::Cleared);
        assert!(engine.active_instances().is_empty());
    }

    #[test]
    fn manual_clear_rules_never_auto_clear() {
        let engine = AlarmEngine::new();
        engine.set_rules(vec![rule(1, AlarmCondition::Above, 100.0, 0.0, 5.0, false)]);
        let now = Utc::now();
        engine.check_value(AlarmTarget::Module(1), 150.0, now);
        let result = engine.check_value(AlarmTarget::Module(1), 0.0, now);
        assert!(result.is_empty());
        assert_eq!(engine.active_instances().len(), 1);
    }

    #[test]
    fn acknowledge_marks_instance_without_clearing_it() {
        let engine = AlarmEngine::new();
        engine.set_rules(vec![rule(1, AlarmCondition::Above, 100.0, 0.0, 5.0, true)]);
        let now = Utc::now();
        engine.check_value(AlarmTarget::Module(1), 150.0, now);
        let ack = engine.acknowledge(1, "operator", now).unwrap();
        assert_eq!(ack.state, AlarmState::Acknowledged);
        assert_eq!(ack.acknowledged_by.as_deref(), Some("operator"));
        assert_eq!(engine.active_instances().len(), 1);
    }

    #[test]
    fn acknowledge_unknown_rule_is_not_found() {
        let engine = AlarmEngine::new();
        let err = engine.acknowledge(99, "operator", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn interlock_fires_on_raise_and_releases_on_clear() {
        let engine = AlarmEngine::new();
        let mut r = rule(1, AlarmCondition::Above, 100.0, 0.0, 5.0, true);
        r.interlock = Interlock { enabled: true, target_slot: 9, action: InterlockAction::Off, pwm_duty: 0, release_on_clear: true };
        engine.set_rules(vec![r]);

        let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
        let seen_clone = std::sync::Arc::clone(&seen);
        engine.on_interlock.set(Box::new(move |cmd| seen_clone.lock().unwrap().push(cmd)));

        let now = Utc::now();
        engine.check_value(AlarmTarget::Module(1), 150.0, now);
        engine.check_value(AlarmTarget::Module(1), 0.0, now);

        let recorded = seen.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(recorded[0].held);
        assert!(!recorded[1].held);
    }

    #[test]
    fn out_of_range_raises_on_either_side() {
        let engine = AlarmEngine::new();
        engine.set_rules(vec![rule(1, AlarmCondition::OutOfRange, 100.0, 0.0, 5.0, true)]);
        let now = Utc::now();
        assert_eq!(engine.check_value(AlarmTarget::Module(1), 150.0, now).len(), 1);
        engine.acknowledge(1, "op", now).ok();
        let cleared = engine.check_value(AlarmTarget::Module(1), 50.0, now);
        assert_eq!(cleared.len(), 1);

        assert_eq!(engine.check_value(AlarmTarget::Module(1), -50.0, now).len(), 1);
    }

    #[test]
    fn system_target_is_a_first_class_alarm_target() {
        let engine = AlarmEngine::new();
        let mut r = rule(1, AlarmCondition::Above, 1.0, 0.0, 5.0, true);
        r.target = AlarmTarget::System;
        engine.set_rules(vec![r]);
        let raised = engine.check_value(AlarmTarget::System, 2.0, Utc::now());
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].target, AlarmTarget::System);
    }
}
