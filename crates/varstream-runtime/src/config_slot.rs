//! [`ConfigSlot`] – lock-free-for-the-reader configuration handoff.
//!
//! The control thread builds a value off the processing thread and
//! [`publish`][ConfigSlot::publish]es it. The processing thread calls
//! [`poll`][ConfigSlot::poll] once per cycle; it only ever uses `try_lock`,
//! so it never waits on the control thread. When it takes the new value,
//! the value it replaces is parked in a retired cell instead of being
//! dropped, and the control thread drops it later with
//! [`collect`][ConfigSlot::collect].
//!
//! ```text
//! control:     publish(v2) ──► pending ──┐
//! processing:  poll(&mut current)        ├─► current = v2, retired = v1
//! control:     collect() ◄── retired ────┘   (v1 dropped here)
//! ```
//!
//! If either lock is contended or the retired cell is still occupied, the
//! processing thread keeps its current value and tries again next cycle.

use std::sync::{Mutex, PoisonError, TryLockError};

/// Single-producer handoff cell between a control thread and a processing
/// thread.
#[derive(Debug)]
pub struct ConfigSlot<T> {
    pending: Mutex<Option<T>>,
    retired: Mutex<Option<T>>,
}

impl<T> Default for ConfigSlot<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(None),
            retired: Mutex::new(None),
        }
    }
}

impl<T> ConfigSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer `value` to the processing thread. An earlier value that was
    /// never picked up is dropped here.
    pub fn publish(&self, value: T) {
        self.collect();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value);
        drop(previous);
    }

    /// Processing side. Swap a pending value into `current`.
    ///
    /// Returns `true` when `current` changed. Never blocks and never drops a
    /// `T`.
    pub fn poll(&self, current: &mut Option<T>) -> bool {
        let mut pending = match self.pending.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        if pending.is_none() {
            return false;
        }
        let mut retired = match self.retired.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        if retired.is_some() {
            return false;
        }
        *retired = std::mem::replace(current, pending.take());
        true
    }

    /// Drop a value retired by the processing thread. Returns `true` if there
    /// was one.
    pub fn collect(&self) -> bool {
        let retired = self
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        retired.is_some()
    }

    /// Drop any pending and retired value.
    pub fn clear(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(pending);
        self.collect();
    }

    /// `true` while a published value waits for the processing thread.
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
