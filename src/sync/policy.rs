/*!
 * Synchronization Policy
 *
 * The seam between the framework and concrete primitives. A policy gives
 * the state word its meaning through non-blocking transition attempts; the
 * framework supplies all queueing, parking, and wake-up mechanics.
 *
 * Implementations must be:
 * - **Retry-safe**: every attempt may be re-invoked any number of times
 * - **Non-blocking**: attempts never park or spin unboundedly
 * - **State-pure**: attempts touch only the supplied `SyncState` (plus
 *   policy-owned bookkeeping such as an owner cell)
 */

use parking_lot::Mutex;
use std::thread::{self, ThreadId};

use crate::core::errors::{SyncError, SyncResult};

use super::state::SyncState;

/// Outcome of a shared acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedGrant {
    /// The attempt failed; the caller must wait
    Failure,
    /// Acquired, but no further shared acquires are known to succeed
    Success,
    /// Acquired, and remaining capacity makes it worth waking the next
    /// shared waiter immediately
    SuccessMoreAvailable,
}

impl SharedGrant {
    /// True for either success variant
    #[inline]
    pub fn acquired(self) -> bool {
        !matches!(self, SharedGrant::Failure)
    }

    /// True when the grant asks for immediate propagation
    #[inline]
    pub fn more_available(self) -> bool {
        matches!(self, SharedGrant::SuccessMoreAvailable)
    }
}

/// Interpretation of the state word, supplied by the primitive being built.
///
/// Only the modes a primitive actually uses need implementing; the defaults
/// report `Unsupported`. `is_held_exclusively` is required whenever
/// conditions are used.
pub trait SyncPolicy: Send + Sync + 'static {
    /// Non-blocking exclusive acquisition attempt.
    /// `Ok(true)` on success, `Ok(false)` to queue the caller.
    fn try_acquire(&self, state: &SyncState, arg: usize) -> SyncResult<bool> {
        let _ = (state, arg);
        Err(SyncError::Unsupported)
    }

    /// Exclusive release. `Ok(true)` iff the resource is now fully free,
    /// enabling successor wake-up.
    fn try_release(&self, state: &SyncState, arg: usize) -> SyncResult<bool> {
        let _ = (state, arg);
        Err(SyncError::Unsupported)
    }

    /// Non-blocking shared acquisition attempt
    fn try_acquire_shared(&self, state: &SyncState, arg: usize) -> SyncResult<SharedGrant> {
        let _ = (state, arg);
        Err(SyncError::Unsupported)
    }

    /// Shared release. `Ok(true)` iff the release may allow a waiting
    /// acquire to succeed.
    fn try_release_shared(&self, state: &SyncState, arg: usize) -> SyncResult<bool> {
        let _ = (state, arg);
        Err(SyncError::Unsupported)
    }

    /// Whether the calling thread holds the synchronizer exclusively
    fn is_held_exclusively(&self, state: &SyncState) -> bool {
        let _ = state;
        false
    }
}

/// Tracks which thread holds a synchronizer exclusively.
///
/// Convenience for policies of owner-aware primitives (mutexes, reentrant
/// locks). Set after winning the acquiring transition, cleared before the
/// releasing one; both happen on the owner thread, so plain mutex-guarded
/// reads are enough for the cross-thread `is_current` checks.
#[derive(Debug, Default)]
pub struct ExclusiveOwner(Mutex<Option<ThreadId>>);

impl ExclusiveOwner {
    pub fn new() -> Self {
        Self(Mutex::new(None))
    }

    /// Record the calling thread as owner
    #[inline]
    pub fn set_current(&self) {
        *self.0.lock() = Some(thread::current().id());
    }

    /// Clear the owner record
    #[inline]
    pub fn clear(&self) {
        *self.0.lock() = None;
    }

    /// Whether the calling thread is the recorded owner
    #[inline]
    pub fn is_current(&self) -> bool {
        *self.0.lock() == Some(thread::current().id())
    }

    /// The recorded owner, if any
    #[inline]
    pub fn get(&self) -> Option<ThreadId> {
        *self.0.lock()
    }
}
