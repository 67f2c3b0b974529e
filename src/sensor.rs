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

//! One sensor's read pipeline: raw acquisition feeds calibration, then EMA
//! smoothing, then quality tagging (spec.md §4.1 step 5). Per-variant raw
//! acquisition (GPIO/ADC/web poll/formula) lives in `sensor_manager` and
//! `hardware`; this module owns only what happens to a raw number once the
//! driver has produced (or failed to produce) one.

use chrono::{DateTime, Utc};

use crate::calibration::push_ema;
use crate::model::{Quality, SensorConfig, SensorRuntime};

#[derive(Debug, Clone, PartialEq)]
/// Why a raw read attempt did not produce a usable value.
pub enum DriverError {
    /// The read exceeded its configured timeout.
    Timeout,
    /// The underlying link reports down (e.g. a one-wire bus with no
    /// response, an HTTP connection refused).
    NotConnected,
    /// Any other I/O or protocol failure, with a description.
    IoError(String),
    /// A `Calculated` sensor's formula hit a divide-by-zero or domain error.
    FormulaError(String),
}

/// One sensor's identity plus its live configuration and runtime state,
/// as tracked by the sensor manager.
pub struct SensorInstance<'a> {
    /// The owning module id.
    pub module_id: i64,
    config: &'a SensorConfig,
    runtime: &'a mut SensorRuntime,
}

impl<'a> SensorInstance<'a> {
    /// Borrow a module's config and runtime together for one read cycle.
    pub fn new(module_id: i64, config: &'a SensorConfig, runtime: &'a mut SensorRuntime) -> SensorInstance<'a> {
        SensorInstance { module_id, config, runtime }
    }

    /// Apply the outcome of a raw acquisition attempt: on success, run
    /// calibration and EMA smoothing and compute quality from the valid
    /// range and freshness; on failure, bump failure counters and compute
    /// quality from the failure threshold. Returns the quality reached.
    ///
    /// This is the one place spec.md §4.1 step 5's quality rules are
    /// implemented, shared by every sensor variant.
    pub fn apply_raw_reading(&mut self, raw: Result<f64, DriverError>, now: DateTime<Utc>) -> Quality {
        self.runtime.total_reads += 1;

        match raw {
            Ok(value) => {
                self.runtime.raw_value = value;
                let calibrated = self.runtime.calibration.apply(value);
                let smoothed = match self.runtime.ema_width {
                    Some(width) if width > 1 => push_ema(&mut self.runtime.ema_buffer, width, calibrated),
                    _ => calibrated,
                };
                self.runtime.current_value = smoothed;
                self.runtime.last_read_timestamp = now;
                self.runtime.consecutive_successes += 1;
                self.runtime.consecutive_failures = 0;
                self.runtime.connected = true;

                let in_range = match self.runtime.valid_range {
                    Some((lo, hi)) => smoothed >= lo && smoothed <= hi,
                    None => true,
                };
                self.runtime.quality = if in_range { Quality::Good } else { Quality::Uncertain };
            }
            Err(DriverError::NotConnected) => {
                self.runtime.total_failures += 1;
                self.runtime.consecutive_failures += 1;
                self.runtime.consecutive_successes = 0;
                self.runtime.connected = false;
                self.runtime.quality = Quality::NotConnected;
            }
            Err(_) => {
                self.runtime.total_failures += 1;
                self.runtime.consecutive_failures += 1;
                self.runtime.consecutive_successes = 0;
                self.runtime.quality = if self.runtime.consecutive_failures >= self.runtime.failure_threshold {
                    Quality::Bad
                } else {
                    Quality::Uncertain
                };
            }
        }

        self.recheck_staleness(now);
        self.runtime.quality
    }

    /// Demote a currently-GOOD reading to UNCERTAIN if it has aged past
    /// `stale_timeout_ms` without a fresh successful read, per spec.md
    /// §4.1 ("aging but not yet stale" / "uncertain" distinction).
    fn recheck_staleness(&mut self, now: DateTime<Utc>) {
        if self.runtime.quality != Quality::Good {
            return;
        }
        let age_ms = (now - self.runtime.last_read_timestamp).num_milliseconds();
        if age_ms < 0 || age_ms as u64 > u64::from(self.runtime.stale_timeout_ms) {
            self.runtime.quality = Quality::Uncertain;
        }
    }

    #[must_use]
    /// The sensor's declared poll rate.
    pub fn poll_rate_ms(&self) -> u32 {
        self.config.poll_rate_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;
    use std::collections::VecDeque;

    fn fresh_runtime() -> SensorRuntime {
        let mut rt = SensorRuntime::new(5_000, 3, Some((0.0, 100.0)));
        rt.calibration = Calibration::Linear { scale: 1.0, offset: 0.0 };
        rt
    }

    fn cfg() -> SensorConfig {
        SensorConfig::Adc {
            adc: 0,
            channel: 0,
            gain: 1.0,
            reference_voltage: 3.3,
            raw_min: 0.0,
            raw_max: 4095.0,
            eng_min: 0.0,
            eng_max: 100.0,
            poll_rate_ms: 100,
        }
    }

    #[test]
    fn successful_in_range_read_is_good() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        let now = Utc::now();
        let mut inst = SensorInstance::new(1, &cfg, &mut rt);
        let q = inst.apply_raw_reading(Ok(50.0), now);
        assert_eq!(q, Quality::Good);
        assert!((rt.current_value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_value_is_uncertain() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        let now = Utc::now();
        let mut inst = SensorInstance::new(1, &cfg, &mut rt);
        let q = inst.apply_raw_reading(Ok(500.0), now);
        assert_eq!(q, Quality::Uncertain);
    }

    #[test]
    fn not_connected_error_sets_not_connected_quality() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        let now = Utc::now();
        let mut inst = SensorInstance::new(1, &cfg, &mut rt);
        let q = inst.apply_raw_reading(Err(DriverError::NotConnected), now);
        assert_eq!(q, Quality::NotConnected);
        assert!(!rt.connected);
    }

    #[test]
    fn failures_below_threshold_are_uncertain_not_bad() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        let now = Utc::now();
        {
            let mut inst = SensorInstance::new(1, &cfg, &mut rt);
            inst.apply_raw_reading(Err(DriverError::Timeout), now);
        }
        assert_eq!(rt.quality, Quality::Uncertain);
        assert_eq!(rt.consecutive_failures, 1);
    }

    #[test]
    fn failures_reaching_threshold_become_bad() {
        let cfg = cfg();
        let mut rt = fresh_runtime(); // failure_threshold = 3
        let now = Utc::now();
        for _ in 0..3 {
            let mut inst = SensorInstance::new(1, &cfg, &mut rt);
            inst.apply_raw_reading(Err(DriverError::Timeout), now);
        }
        assert_eq!(rt.quality, Quality::Bad);
        assert_eq!(rt.consecutive_failures, 3);
    }

    #[test]
    fn a_success_resets_the_failure_streak() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        let now = Utc::now();
        {
            let mut inst = SensorInstance::new(1, &cfg, &mut rt);
            inst.apply_raw_reading(Err(DriverError::Timeout), now);
            inst.apply_raw_reading(Err(DriverError::Timeout), now);
            inst.apply_raw_reading(Ok(10.0), now);
        }
        assert_eq!(rt.consecutive_failures, 0);
        assert_eq!(rt.quality, Quality::Good);
    }

    #[test]
    fn stale_good_reading_degrades_to_uncertain() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        let first = Utc::now();
        {
            let mut inst = SensorInstance::new(1, &cfg, &mut rt);
            inst.apply_raw_reading(Ok(10.0), first);
        }
        assert_eq!(rt.quality, Quality::Good);

        // Simulate staleness by rechecking far in the future without a new
        // read, mirroring what the sensor manager would observe on its next
        // tick if the driver never came back.
        let much_later = first + chrono::Duration::milliseconds(10_000);
        let mut inst = SensorInstance::new(1, &cfg, &mut rt);
        inst.recheck_staleness(much_later);
        assert_eq!(rt.quality, Quality::Uncertain);
    }

    #[test]
    fn ema_smooths_successive_successes() {
        let cfg = cfg();
        let mut rt = fresh_runtime();
        rt.ema_width = Some(2);
        rt.ema_buffer = VecDeque::new();
        let now = Utc::now();
        let mut inst = SensorInstance::new(1, &cfg, &mut rt);
        inst.apply_raw_reading(Ok(10.0), now);
        inst.apply_raw_reading(Ok(20.0), now);
        assert!((rt.current_value - 15.0).abs() < 1e-9);
    }
}
