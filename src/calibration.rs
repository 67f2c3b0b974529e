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

//! Calibration pipelines that turn a raw driver reading into an
//! engineering-unit value, and the EMA smoothing applied afterward.
//!
//! The linear case generalizes the teacher's `calibration_slope`/
//! `calibration_intercept` fields from `config::Sensor`; the rest of the
//! variants are new, since spec.md §4.1 step 2 calls for more calibration
//! kinds than the teacher's single rocket-engine linear map needed.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A calibration pipeline stage, applied to a raw value to produce an
/// engineering-unit value.
pub enum Calibration {
    /// `scale * x + offset`.
    Linear {
        /// The multiplicative factor.
        scale: f64,
        /// The additive offset.
        offset: f64,
    },
    /// Scale/offset derived from one calibration pair `(raw, engineering)`
    /// relative to a known zero point `(raw0, engineering0)`.
    TwoPoint {
        /// The first calibration point.
        point0: (f64, f64),
        /// The second calibration point.
        point1: (f64, f64),
    },
    /// Horner-evaluated polynomial, lowest-degree coefficient first.
    Polynomial {
        /// Coefficients `[c0, c1, c2, ...]` for `c0 + c1*x + c2*x^2 + ...`.
        coefficients: Vec<f64>,
    },
    /// Piecewise-linear interpolation over a lookup table, clamped outside
    /// its domain.
    Lookup {
        /// Sorted `(raw, engineering)` pairs.
        table: Vec<(f64, f64)>,
    },
    /// The Steinhart-Hart thermistor equation.
    SteinhartHart {
        /// Coefficient A.
        a: f64,
        /// Coefficient B.
        b: f64,
        /// Coefficient C.
        c: f64,
    },
}

impl Calibration {
    #[must_use]
    /// Apply this calibration to a raw reading.
    ///
    /// `SteinhartHart` treats `raw` as a thermistor resistance in ohms and
    /// returns a temperature in Kelvin; callers wanting Celsius subtract
    /// 273.15 themselves, matching how the equation is conventionally
    /// quoted.
    pub fn apply(&self, raw: f64) -> f64 {
        match self {
            Calibration::Linear { scale, offset } => scale * raw + offset,
            Calibration::TwoPoint { point0, point1 } => {
                let (raw0, eng0) = *point0;
                let (raw1, eng1) = *point1;
                if (raw1 - raw0).abs() < f64::EPSILON {
                    return eng0;
                }
                let scale = (eng1 - eng0) / (raw1 - raw0);
                scale * (raw - raw0) + eng0
            }
            Calibration::Polynomial { coefficients } => {
                // Horner's method, highest-degree coefficient evaluated first.
                coefficients
                    .iter()
                    .rev()
                    .fold(0.0, |acc, coeff| acc * raw + coeff)
            }
            Calibration::Lookup { table } => lookup_interpolate(table, raw),
            Calibration::SteinhartHart { a, b, c } => {
                if raw <= 0.0 {
                    return f64::NAN;
                }
                let ln_r = raw.ln();
                1.0 / (a + b * ln_r + c * ln_r.powi(3))
            }
        }
    }
}

/// Piecewise-linear interpolation over a sorted `(x, y)` table, clamping to
/// the table's endpoints outside its domain.
fn lookup_interpolate(table: &[(f64, f64)], x: f64) -> f64 {
    if table.is_empty() {
        return f64::NAN;
    }
    if table.len() == 1 || x <= table[0].0 {
        return table[0].1;
    }
    if x >= table[table.len() - 1].0 {
        return table[table.len() - 1].1;
    }
    for window in table.windows(2) {
        let (x0, y0) = window[0];
        let (x1, y1) = window[1];
        if x >= x0 && x <= x1 {
            if (x1 - x0).abs() < f64::EPSILON {
                return y0;
            }
            let t = (x - x0) / (x1 - x0);
            return y0 + t * (y1 - y0);
        }
    }
    table[table.len() - 1].1
}

/// Push a fresh value into an EMA ring buffer of the given width and return
/// the mean of its (valid) contents.
///
/// This generalizes the teacher's `sensor_listen` rolling-average update
/// (`data.rs`), which kept a single running value instead of a ring buffer;
/// here we keep the buffer explicitly so quality computation can later
/// distinguish "not enough samples yet" from "smoothed value."
pub fn push_ema(buffer: &mut VecDeque<f64>, width: usize, value: f64) -> f64 {
    if width <= 1 {
        return value;
    }
    buffer.push_back(value);
    while buffer.len() > width {
        buffer.pop_front();
    }
    buffer.iter().sum::<f64>() / buffer.len() as f64
}
