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

//! A leveled, timestamped, ANSI-colored log, generalized from the teacher's
//! `console::UserLog<W: Write>`. It keeps the same four levels and mirrors
//! every line to a file handle, but `warn`/`critical` calls can also carry
//! a machine-readable `EventKind`, in which case the line is additionally
//! recorded into the `health` module's structured event log — the same
//! data that would be persisted to the `events` table.

use std::fmt::Display;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use chrono::Utc;

use crate::health::{EventKind, EventSeverity, HealthMonitor};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
/// The levels for logging, least to most severe.
pub enum LogLevel {
    /// Garbage to help a developer debug, not meant for an operator.
    Debug = 0,
    /// Information that might be useful to have after an event occurs.
    Info = 1,
    /// A nonfatal problem worth an operator's attention.
    Warn = 2,
    /// Fatal or safety-relevant information.
    Critical = 3,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LogLevel::Debug => "DEBUG",
                LogLevel::Info => "INFO",
                LogLevel::Warn => "WARN",
                LogLevel::Critical => "CRITICAL",
            }
        )
    }
}

/// A log for operator-facing information. Need not be machine-readable on
/// its own; `health` is where that lives.
pub struct EventLog<W: Write> {
    log_buffer: Mutex<W>,
    health: Option<Arc<HealthMonitor>>,
}

impl<W: Write> EventLog<W> {
    #[must_use]
    /// Construct a new `EventLog`. Lines are copied to `buf` as well as
    /// stdout.
    pub fn new(buf: W) -> EventLog<W> {
        EventLog { log_buffer: Mutex::new(buf), health: None }
    }

    #[must_use]
    /// Also record `warn`/`critical` lines into `health`'s structured
    /// event log.
    pub fn with_health(mut self, health: Arc<HealthMonitor>) -> Self {
        self.health = Some(health);
        self
    }

    #[allow(clippy::missing_errors_doc)]
    /// Log debug information, uninteresting to most operators.
    pub fn debug(&self, string: &str) -> std::io::Result<()> {
        self.write(LogLevel::Debug, "log", string, None)
    }

    #[allow(clippy::missing_errors_doc)]
    /// Log routine information.
    pub fn info(&self, string: &str) -> std::io::Result<()> {
        self.write(LogLevel::Info, "log", string, None)
    }

    #[allow(clippy::missing_errors_doc)]
    /// Write a warning, nonfatal but possibly precursory to a future error.
    pub fn warn(&self, source: &str, string: &str, kind: Option<EventKind>) -> std::io::Result<()> {
        self.write(LogLevel::Warn, source, string, kind)
    }

    #[allow(clippy::missing_errors_doc)]
    /// Log critical, safety- or liveness-relevant information.
    pub fn critical(&self, source: &str, string: &str, kind: Option<EventKind>) -> std::io::Result<()> {
        self.write(LogLevel::Critical, source, string, kind)
    }

    fn write(&self, level: LogLevel, source: &str, string: &str, kind: Option<EventKind>) -> std::io::Result<()> {
        let log_time_nanos = SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap().as_nanos();

        match level {
            LogLevel::Critical => print!("\x1b[31m"), // red
            LogLevel::Warn => print!("\x1b[33m"),     // yellow
            LogLevel::Info => (),
            LogLevel::Debug => print!("\x1b[90m"), // faded
        };
        println!("[{log_time_nanos}] [{level}] {source}: {string}");
        print!("\x1b[0m"); // wipe previous coloring

        writeln!(self.log_buffer.lock().unwrap(), "[{log_time_nanos}] [{level}] {source}: {string}")?;

        if let (Some(health), true) = (&self.health, level >= LogLevel::Warn) {
            let severity = if level == LogLevel::Critical { EventSeverity::Critical } else { EventSeverity::Warning };
            health.record_event(Utc::now(), severity, source, string, kind);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_mirrored_to_the_log_buffer() {
        let log = EventLog::new(Vec::<u8>::new());
        log.info("hello").unwrap();
        log.warn("test", "uh oh", Some(EventKind::Generic)).unwrap();
        let buf = log.log_buffer.lock().unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("[INFO] log: hello"));
        assert!(text.contains("[WARN] test: uh oh"));
    }

    #[test]
    fn warnings_and_above_are_recorded_to_health_but_info_is_not() {
        let health = Arc::new(HealthMonitor::new());
        let log = EventLog::new(Vec::<u8>::new()).with_health(Arc::clone(&health));
        log.info("routine").unwrap();
        log.warn("sensor", "getting flaky", Some(EventKind::SensorFailure)).unwrap();
        log.critical("actuator", "watchdog fired", Some(EventKind::ActuatorFault)).unwrap();

        let events = health.recent_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "getting flaky");
        assert_eq!(events[1].message, "watchdog fired");
    }
}
