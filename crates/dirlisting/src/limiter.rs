//! Upper bound on directory scans in progress per worker.
//!
//! Large directories take many scheduler turns to list. Capping the number of scans
//! that may be in flight at once keeps a burst of listing requests from starving the
//! other requests served by the same worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts admitted scans against a fixed bound.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    in_progress: AtomicUsize,
    max_in_progress: usize,
}

impl ConcurrencyLimiter {
    /// Creates a limiter admitting at most `max_in_progress` scans (at least one).
    pub fn new(max_in_progress: usize) -> Self {
        Self {
            in_progress: AtomicUsize::new(0),
            max_in_progress: max_in_progress.max(1),
        }
    }

    /// Derives the bound from the worker's connection limit: one scan per 16 connections.
    pub fn for_max_connections(max_connections: usize) -> Self {
        Self::new(max_connections >> 4)
    }

    /// Takes a slot. Returns false when the bound is reached; the caller must answer
    /// with a retry-later response and not start scanning.
    pub fn admit(&self) -> bool {
        self.in_progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_in_progress).then_some(current + 1)
            })
            .is_ok()
    }

    /// Returns a slot taken by [`admit`](Self::admit).
    pub fn release(&self) {
        let released = self
            .in_progress
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_sub(1));
        if released.is_err() {
            log::warn!("ConcurrencyLimiter::release called with no scan in progress");
        }
    }

    /// Takes a slot that is returned when the permit is dropped.
    pub fn try_admit(self: &Arc<Self>) -> Option<AdmissionPermit> {
        self.admit().then(|| AdmissionPermit {
            limiter: Arc::clone(self),
        })
    }

    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::Acquire)
    }

    pub fn max_in_progress(&self) -> usize {
        self.max_in_progress
    }
}

/// A slot held by one listing request. Dropping it releases the slot exactly once,
/// whether the listing completed or was torn down early.
#[derive(Debug)]
pub struct AdmissionPermit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_derived_from_max_connections() {
        assert_eq!(ConcurrencyLimiter::for_max_connections(1024).max_in_progress(), 64);
        assert_eq!(ConcurrencyLimiter::for_max_connections(15).max_in_progress(), 1);
        assert_eq!(ConcurrencyLimiter::for_max_connections(0).max_in_progress(), 1);
    }

    #[test]
    fn test_admit_fails_at_bound_and_recovers_after_release() {
        let limiter = ConcurrencyLimiter::new(3);
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
        assert_eq!(limiter.in_progress(), 3);

        limiter.release();
        assert!(limiter.admit());
        assert!(!limiter.admit());
    }

    #[test]
    fn test_release_without_admit_does_not_underflow() {
        let limiter = ConcurrencyLimiter::new(1);
        limiter.release();
        assert_eq!(limiter.in_progress(), 0);
        assert!(limiter.admit());
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let permit = limiter.try_admit();
        assert!(permit.is_some());
        assert!(limiter.try_admit().is_none());

        drop(permit);
        assert_eq!(limiter.in_progress(), 0);
        assert!(limiter.try_admit().is_some());
    }
}
