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

//! The process-wide `init`/`start`/`stop`/`shutdown` run guard (spec.md
//! §5/§6.5), generalized from the teacher's `state::Guard`: the same
//! validated-transition `RwLock<State>` idiom, but with an ignition state
//! machine replaced by the plain lifecycle every long-running subsystem
//! here actually has.

use std::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The lifecycle phases of the orchestrator (or any subsystem that wants
/// one): construction happens outside this guard; `Uninitialized` is the
/// state right after `LifecycleGuard::new`.
pub enum LifecycleState {
    /// Constructed, but `init` has not yet run.
    Uninitialized,
    /// Configuration loaded and resources acquired; not yet sampling/
    /// actuating/bridging.
    Initialized,
    /// Worker threads are live.
    Running,
    /// Worker threads have been joined; the process may exit.
    Stopped,
}

#[derive(Debug)]
/// Failure transitioning a `LifecycleGuard`.
pub enum LifecycleError {
    /// The guard's lock was poisoned by a panicked thread.
    Poisoned,
    /// `to` is not reachable from `from`.
    IllegalTransition { from: LifecycleState, to: LifecycleState },
}

/// A validated state machine for a subsystem's or the process's overall
/// lifecycle. `move_to` is idempotent for the `Stopped` state (spec.md
/// §5's "start/stop is idempotent" requirement): repeated shutdown
/// requests are not an error.
pub struct LifecycleGuard {
    state: RwLock<LifecycleState>,
}

impl Default for LifecycleGuard {
    fn default() -> Self {
        LifecycleGuard { state: RwLock::new(LifecycleState::Uninitialized) }
    }
}

impl LifecycleGuard {
    #[must_use]
    /// Construct a guard starting at `Uninitialized`.
    pub fn new() -> LifecycleGuard {
        LifecycleGuard::default()
    }

    /// The current lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Poisoned` if the internal lock was
    /// poisoned by a panicking thread.
    pub fn status(&self) -> Result<LifecycleState, LifecycleError> {
        self.state.read().map(|s| *s).map_err(|_| LifecycleError::Poisoned)
    }

    /// Attempt to move into `to`. Valid transitions:
    /// `Uninitialized -> Initialized -> Running -> Stopped`, and
    /// `Stopped -> Stopped` (idempotent shutdown).
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::IllegalTransition` for any other pair, or
    /// `LifecycleError::Poisoned` if the lock was poisoned.
    pub fn move_to(&self, to: LifecycleState) -> Result<(), LifecycleError> {
        let mut guard = self.state.write().map_err(|_| LifecycleError::Poisoned)?;
        let from = *guard;
        let valid = matches!(
            (from, to),
            (LifecycleState::Uninitialized, LifecycleState::Initialized)
                | (LifecycleState::Initialized, LifecycleState::Running)
                | (LifecycleState::Running, LifecycleState::Stopped)
                | (LifecycleState::Stopped, LifecycleState::Stopped)
        );
        if !valid {
            return Err(LifecycleError::IllegalTransition { from, to });
        }
        *guard = to;
        Ok(())
    }

    #[must_use]
    /// Whether the guard is currently `Running`.
    pub fn is_running(&self) -> bool {
        matches!(self.status(), Ok(LifecycleState::Running))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_phase_in_order() {
        let guard = LifecycleGuard::new();
        assert_eq!(guard.status().unwrap(), LifecycleState::Uninitialized);
        guard.move_to(LifecycleState::Initialized).unwrap();
        guard.move_to(LifecycleState::Running).unwrap();
        assert!(guard.is_running());
        guard.move_to(LifecycleState::Stopped).unwrap();
        assert!(!guard.is_running());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let guard = LifecycleGuard::new();
        guard.move_to(LifecycleState::Initialized).unwrap();
        guard.move_to(LifecycleState::Running).unwrap();
        guard.move_to(LifecycleState::Stopped).unwrap();
        guard.move_to(LifecycleState::Stopped).unwrap(); // must not error
    }

    #[test]
    fn skipping_a_phase_is_rejected() {
        let guard = LifecycleGuard::new();
        let err = guard.move_to(LifecycleState::Running).unwrap_err();
        assert!(matches!(err, LifecycleError::IllegalTransition { from: LifecycleState::Uninitialized, to: LifecycleState::Running }));
    }

    #[test]
    fn resuming_after_stop_is_rejected() {
        let guard = LifecycleGuard::new();
        guard.move_to(LifecycleState::Initialized).unwrap();
        guard.move_to(LifecycleState::Running).unwrap();
        guard.move_to(LifecycleState::Stopped).unwrap();
        assert!(guard.move_to(LifecycleState::Running).is_err());
    }
}
