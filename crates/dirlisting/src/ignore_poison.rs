//! Extension trait to ignore mutex poisoning.
//!
//! The stat cache stores plain metadata snapshots behind a `Mutex`. A panic while the
//! lock was held cannot leave a snapshot half-updated, so poison is irrelevant there.

use std::sync::{Mutex, MutexGuard};

pub(crate) trait IgnorePoison<T> {
    /// Locks the mutex, ignoring poison.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;
}

impl<T> IgnorePoison<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|e| e.into_inner())
    }
}
