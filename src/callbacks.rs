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

//! One-directional event callbacks (spec.md §9), generalizing the teacher's
//! `outgoing::DashChannel` "replace on write, read through a lock" idiom: a
//! registrant hands over a closure once, and the owning subsystem invokes it
//! without knowing who, if anyone, is listening.

use std::sync::{Arc, RwLock};

/// A single replaceable callback slot. Cloning a `Slot` shares the same
/// underlying registration, mirroring `DashChannel`'s `Arc<RwLock<Option<C>>>`.
pub struct Slot<F: ?Sized> {
    inner: Arc<RwLock<Option<Box<F>>>>,
}

impl<F: ?Sized> Clone for Slot<F> {
    fn clone(&self) -> Self {
        Slot { inner: Arc::clone(&self.inner) }
    }
}

impl<F: ?Sized> Default for Slot<F> {
    fn default() -> Self {
        Slot { inner: Arc::new(RwLock::new(None)) }
    }
}

impl<F: ?Sized> Slot<F> {
    /// Register `f` as the callback, replacing any previous registration.
    pub fn set(&self, f: Box<F>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(f);
        }
    }

    /// Remove any registered callback.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }

    #[must_use]
    /// Whether a callback is currently registered.
    pub fn is_set(&self) -> bool {
        self.inner.read().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl<A> Slot<dyn Fn(A) + Send + Sync> {
    /// Invoke the registered callback, if any, with `arg`. Does nothing if
    /// no callback is registered or the lock is poisoned.
    pub fn invoke(&self, arg: A) {
        if let Ok(guard) = self.inner.read() {
            if let Some(f) = guard.as_ref() {
                f(arg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unset_slot_invokes_nothing() {
        let slot: Slot<dyn Fn(i32) + Send + Sync> = Slot::default();
        slot.invoke(42); // must not panic
        assert!(!slot.is_set());
    }

    #[test]
    fn registered_callback_runs_on_invoke() {
        let slot: Slot<dyn Fn(i32) + Send + Sync> = Slot::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        slot.set(Box::new(move |n| {
            c.fetch_add(n as usize, Ordering::SeqCst);
        }));
        slot.invoke(5);
        slot.invoke(7);
        assert_eq!(counter.load(Ordering::SeqCst), 12);
    }

    #[test]
    fn setting_again_replaces_the_previous_callback() {
        let slot: Slot<dyn Fn(i32) + Send + Sync> = Slot::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&counter);
        slot.set(Box::new(move |_| {
            c1.fetch_add(100, Ordering::SeqCst);
        }));
        let c2 = Arc::clone(&counter);
        slot.set(Box::new(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));
        slot.invoke(0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clearing_stops_future_invocations() {
        let slot: Slot<dyn Fn(i32) + Send + Sync> = Slot::default();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        slot.set(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        slot.clear();
        slot.invoke(0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cloned_slot_shares_registration() {
        let slot: Slot<dyn Fn(i32) + Send + Sync> = Slot::default();
        let other = slot.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        other.set(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        slot.invoke(0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
