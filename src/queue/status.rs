/*!
 * Wait Status
 *
 * Per-node status tag with the sign conventions the queue protocols rely
 * on: negative values mean "a wake-up concern is recorded here", positive
 * means the node is dead.
 */

use std::sync::atomic::{AtomicI8, Ordering};

/// Status tag of a queued node
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitStatus {
    /// A shared release must be propagated to further waiters
    Propagate = -3,
    /// The node is waiting on a condition list, not the sync queue
    Condition = -2,
    /// The node's successor is (or may soon be) parked and needs unparking
    Signal = -1,
    /// Freshly enqueued; none of the above
    None = 0,
    /// Cancelled by timeout or interrupt. Terminal: a cancelled node never
    /// transitions to any other status.
    Cancelled = 1,
}

impl WaitStatus {
    #[inline]
    pub(crate) fn from_raw(raw: i8) -> Self {
        match raw {
            -3 => WaitStatus::Propagate,
            -2 => WaitStatus::Condition,
            -1 => WaitStatus::Signal,
            0 => WaitStatus::None,
            _ => WaitStatus::Cancelled,
        }
    }

    /// Terminal dead state
    #[inline]
    pub(crate) fn is_cancelled(self) -> bool {
        self == WaitStatus::Cancelled
    }

    /// Negative statuses record a pending wake-up concern
    #[inline]
    pub(crate) fn needs_signal(self) -> bool {
        (self as i8) < 0
    }
}

/// Atomic cell holding a `WaitStatus`
pub(crate) struct AtomicStatus(AtomicI8);

impl AtomicStatus {
    pub(crate) const fn new(status: WaitStatus) -> Self {
        Self(AtomicI8::new(status as i8))
    }

    #[inline]
    pub(crate) fn load(&self) -> WaitStatus {
        WaitStatus::from_raw(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, status: WaitStatus) {
        self.0.store(status as i8, Ordering::Release);
    }

    /// CAS; failure means another thread got there first, which every call
    /// site treats as "re-derive and retry or move on"
    #[inline]
    pub(crate) fn compare_and_set(&self, current: WaitStatus, new: WaitStatus) -> bool {
        self.0
            .compare_exchange(current as i8, new as i8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl std::fmt::Debug for AtomicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.load())
    }
}
