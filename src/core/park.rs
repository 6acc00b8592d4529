/*!
 * Thread Parking
 *
 * Portable park/unpark primitive with a pending-interrupt flag.
 *
 * # Design: Permit Over Raw Blocking
 *
 * A `Parker` carries a single binary permit. `unpark` deposits the permit;
 * `park` consumes it, blocking only when it is absent. An unpark that
 * arrives before the park therefore makes the park return immediately,
 * which is what lets acquire loops re-check their condition between the
 * check and the block without losing wake-ups.
 *
 * Parks may return spuriously; callers always loop around a re-check.
 *
 * # Interruption
 *
 * Interruption is a property of the handle, not of an OS thread: any holder
 * of the `Arc<Parker>` may call `interrupt`, which wakes the owner and sets
 * a pending flag. Interruptible waits consume the flag exactly once via
 * `take_interrupted`; uninterruptible waits observe it, keep looping, and
 * re-assert it before returning.
 */

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::Instant;

/// Per-thread wakeable handle used for wake targeting in the wait queue
pub struct Parker {
    /// Binary permit; true when an unpark has been deposited
    permit: Mutex<bool>,
    condvar: Condvar,
    /// Pending-interrupt flag
    interrupted: AtomicBool,
    /// Owning thread, for introspection and wake targeting
    thread: Thread,
}

thread_local! {
    static CURRENT: Arc<Parker> = Arc::new(Parker::new());
}

impl Parker {
    /// Create a parker owned by the calling thread
    pub fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            condvar: Condvar::new(),
            interrupted: AtomicBool::new(false),
            thread: thread::current(),
        }
    }

    /// The calling thread's shared parker.
    ///
    /// The same handle is returned for every call on a given thread, so it
    /// can be cloned out to other threads that need to interrupt this one.
    pub fn current() -> Arc<Parker> {
        CURRENT.with(Arc::clone)
    }

    /// The thread that owns this parker
    #[inline]
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// Block until a permit is available or the handle is interrupted.
    ///
    /// Consumes the permit when one is taken. Returns without consuming
    /// anything when the pending-interrupt flag is set.
    pub fn park(&self) {
        let mut permit = self.permit.lock();
        loop {
            if *permit {
                *permit = false;
                return;
            }
            if self.interrupted.load(Ordering::Acquire) {
                return;
            }
            self.condvar.wait(&mut permit);
        }
    }

    /// Block until a permit is available, the handle is interrupted, or the
    /// deadline passes. Returns true iff a permit was consumed.
    pub fn park_until(&self, deadline: Instant) -> bool {
        let mut permit = self.permit.lock();
        loop {
            if *permit {
                *permit = false;
                return true;
            }
            if self.interrupted.load(Ordering::Acquire) {
                return false;
            }
            if self.condvar.wait_until(&mut permit, deadline).timed_out() {
                // A final racing unpark may have landed while timing out
                if *permit {
                    *permit = false;
                    return true;
                }
                return false;
            }
        }
    }

    /// Deposit the permit, waking the owner if it is parked
    pub fn unpark(&self) {
        let mut permit = self.permit.lock();
        *permit = true;
        drop(permit);
        self.condvar.notify_one();
    }

    /// Set the pending-interrupt flag and wake the owner if it is parked
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        // Take the lock so the store cannot slip between the owner's flag
        // check and its wait
        let permit = self.permit.lock();
        drop(permit);
        self.condvar.notify_one();
    }

    /// Read the pending-interrupt flag without consuming it
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Consume the pending-interrupt flag, returning its previous value
    #[inline]
    pub fn take_interrupted(&self) -> bool {
        self.interrupted.swap(false, Ordering::AcqRel)
    }

    /// Re-assert the pending-interrupt flag.
    ///
    /// Used by uninterruptible waits that observed an interrupt mid-loop and
    /// must hand it back to the caller on return.
    #[inline]
    pub fn set_interrupted(&self) {
        self.interrupted.store(true, Ordering::Release);
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Parker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parker")
            .field("thread", &self.thread.id())
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}
