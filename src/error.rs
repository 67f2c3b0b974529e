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

//! The shared error taxonomy used at the process surface (`get_stats`,
//! administrative operations). Individual subsystems keep their own local
//! `Error` enums and convert into this one only at the boundary.

use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The kinds of failure that can be reported across the process surface.
pub enum ErrorKind {
    /// A caller-supplied parameter was out of range or otherwise invalid.
    InvalidParam,
    /// The subsystem was used before `init`/`start` completed.
    NotInitialized,
    /// A referenced id (module, rule, actuator, slot) does not exist.
    NotFound,
    /// A create operation collided with an existing id.
    AlreadyExists,
    /// An allocation or bounded-capacity structure was exhausted.
    NoMemory,
    /// A driver, persistence, or network I/O operation failed.
    IoError,
    /// The requested operation is not supported for this configuration.
    NotSupported,
    /// A blocking operation exceeded its deadline.
    Timeout,
    /// Any other failure that doesn't fit a more specific kind.
    Generic,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidParam => "invalid parameter",
            ErrorKind::NotInitialized => "not initialized",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::NoMemory => "out of memory",
            ErrorKind::IoError => "I/O error",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Generic => "generic failure",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
/// A process-surface error: a kind plus a human-readable description.
pub struct RtuError {
    /// The taxonomy kind of this error.
    pub kind: ErrorKind,
    /// A human-readable description, for logs.
    pub message: String,
}

impl RtuError {
    #[must_use]
    /// Construct a new `RtuError`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> RtuError {
        RtuError {
            kind,
            message: message.into(),
        }
    }
}

impl Display for RtuError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RtuError {}

impl From<rusqlite::Error> for RtuError {
    fn from(e: rusqlite::Error) -> Self {
        RtuError::new(ErrorKind::IoError, e.to_string())
    }
}

impl From<std::io::Error> for RtuError {
    fn from(e: std::io::Error) -> Self {
        RtuError::new(ErrorKind::IoError, e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for RtuError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        RtuError::new(ErrorKind::Generic, "a lock was poisoned")
    }
}

impl From<serde_json::Error> for RtuError {
    fn from(e: serde_json::Error) -> Self {
        RtuError::new(ErrorKind::IoError, e.to_string())
    }
}

impl From<gpio_cdev::Error> for RtuError {
    fn from(e: gpio_cdev::Error) -> Self {
        RtuError::new(ErrorKind::IoError, e.to_string())
    }
}
