/*!
 * Shared Test Policies
 *
 * The concrete primitives stay outside this crate; these minimal policies
 * exist only to drive the framework from the integration tests.
 */
#![allow(dead_code)]

use qsync::{ExclusiveOwner, SharedGrant, SyncError, SyncPolicy, SyncResult, SyncState};

/// Binary owner-aware mutex: state 0 = free, 1 = held
pub struct MutexPolicy {
    owner: ExclusiveOwner,
}

impl MutexPolicy {
    pub fn new() -> Self {
        Self {
            owner: ExclusiveOwner::new(),
        }
    }
}

impl SyncPolicy for MutexPolicy {
    fn try_acquire(&self, state: &SyncState, _arg: usize) -> SyncResult<bool> {
        if state.compare_and_set(0, 1) {
            self.owner.set_current();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn try_release(&self, state: &SyncState, _arg: usize) -> SyncResult<bool> {
        if !self.owner.is_current() {
            return Err(SyncError::NotHeld);
        }
        self.owner.clear();
        state.set(0);
        Ok(true)
    }

    fn is_held_exclusively(&self, state: &SyncState) -> bool {
        state.get() != 0 && self.owner.is_current()
    }
}

/// Counting semaphore: state = permits remaining
pub struct SemaphorePolicy;

impl SyncPolicy for SemaphorePolicy {
    fn try_acquire_shared(&self, state: &SyncState, arg: usize) -> SyncResult<SharedGrant> {
        loop {
            let available = state.get();
            if available < arg {
                return Ok(SharedGrant::Failure);
            }
            let remaining = available - arg;
            if state.compare_and_set(available, remaining) {
                return Ok(if remaining > 0 {
                    SharedGrant::SuccessMoreAvailable
                } else {
                    SharedGrant::Success
                });
            }
        }
    }

    fn try_release_shared(&self, state: &SyncState, arg: usize) -> SyncResult<bool> {
        loop {
            let available = state.get();
            if state.compare_and_set(available, available + arg) {
                return Ok(true);
            }
        }
    }
}

/// Countdown latch: state = remaining count, shared acquire passes at zero
pub struct LatchPolicy;

impl SyncPolicy for LatchPolicy {
    fn try_acquire_shared(&self, state: &SyncState, _arg: usize) -> SyncResult<SharedGrant> {
        Ok(if state.get() == 0 {
            SharedGrant::SuccessMoreAvailable
        } else {
            SharedGrant::Failure
        })
    }

    fn try_release_shared(&self, state: &SyncState, _arg: usize) -> SyncResult<bool> {
        loop {
            let remaining = state.get();
            if remaining == 0 {
                return Ok(false);
            }
            if state.compare_and_set(remaining, remaining - 1) {
                // Opening the gate (reaching zero) is what frees waiters
                return Ok(remaining == 1);
            }
        }
    }
}
