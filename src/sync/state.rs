/*!
 * Synchronization State
 *
 * The single atomic integer whose meaning is defined entirely by the
 * policy: a hold count for a lock, permits remaining for a semaphore, a
 * countdown for a latch. All successful transitions establish
 * happens-before: writes made before a releasing transition are visible
 * to the thread whose acquiring transition observes it.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

/// The atomic state word of a synchronizer
pub struct SyncState(AtomicUsize);

impl SyncState {
    pub const fn new(initial: usize) -> Self {
        Self(AtomicUsize::new(initial))
    }

    /// Current value (acquire ordering)
    #[inline]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Unconditional write (release ordering). Use only when the caller
    /// already excludes racing writers, e.g. while holding exclusively.
    #[inline]
    pub fn set(&self, value: usize) {
        self.0.store(value, Ordering::Release);
    }

    /// Atomic transition; the edge every acquire/release protocol rides on
    #[inline]
    pub fn compare_and_set(&self, expected: usize, update: usize) -> bool {
        self.0
            .compare_exchange(expected, update, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncState({})", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_and_set() {
        let state = SyncState::new(0);
        assert!(state.compare_and_set(0, 5));
        assert!(!state.compare_and_set(0, 9));
        assert_eq!(state.get(), 5);
    }

    #[test]
    fn test_set_and_get() {
        let state = SyncState::new(3);
        state.set(7);
        assert_eq!(state.get(), 7);
    }
}
