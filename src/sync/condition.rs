/*!
 * Condition Queue
 *
 * Per-condition singly-linked list of waiters, layered on the exclusive
 * protocol. A waiting thread moves through three phases: on the condition
 * list with status `Condition`; transferred onto the sync queue by a
 * signal (or by its own cancellation); and finally reacquiring the
 * exclusive state it fully released on entry.
 *
 * # Precondition
 *
 * The list is only ever touched while the caller holds the associated
 * exclusive state. That is what makes a plain singly-linked list safe
 * here; it is checked eagerly against the policy's `is_held_exclusively`
 * and surfaced as `SyncError::NotHeld`.
 *
 * # Interrupt vs. signal ordering
 *
 * An interrupt that lands before a signal cancels the wait and surfaces
 * as `Err(Interrupted)`; one that lands after the signal must not, so the
 * wait returns normally with the pending-interrupt flag re-asserted.
 */

use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use log::trace;

use crate::core::errors::{SyncError, SyncResult};
use crate::core::park::Parker;
use crate::queue::{Node, WaitStatus};

use super::policy::SyncPolicy;
use super::synchronizer::QueuedSync;

/// Whether a timed condition wait returned because its timeout elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeoutResult(pub(crate) bool);

impl WaitTimeoutResult {
    #[inline]
    pub fn timed_out(&self) -> bool {
        self.0
    }
}

/// How an interrupt observed during a wait must be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptMode {
    /// No interrupt observed
    None,
    /// Interrupted after being signalled: re-assert the flag, return Ok
    Reassert,
    /// Interrupted before being signalled: surface `Err(Interrupted)`
    Throw,
}

/// A condition variable bound to one [`QueuedSync`] instance.
///
/// Holding the owning synchronizer by `Arc` makes "signalling a condition
/// of some other synchronizer" unrepresentable.
pub struct Condition<P: SyncPolicy> {
    sync: Arc<QueuedSync<P>>,
    first_waiter: ArcSwapOption<Node>,
    last_waiter: ArcSwapOption<Node>,
}

impl<P: SyncPolicy> Condition<P> {
    /// Create a condition owned by the given synchronizer
    pub fn new(sync: Arc<QueuedSync<P>>) -> Self {
        Self {
            sync,
            first_waiter: ArcSwapOption::const_empty(),
            last_waiter: ArcSwapOption::const_empty(),
        }
    }

    /// Whether this condition was created by the given synchronizer
    pub fn belongs_to(&self, sync: &Arc<QueuedSync<P>>) -> bool {
        Arc::ptr_eq(&self.sync, sync)
    }

    fn check_owner(&self) -> SyncResult<()> {
        if self.sync.policy().is_held_exclusively(self.sync.state()) {
            Ok(())
        } else {
            Err(SyncError::NotHeld)
        }
    }

    // --- Waiting ---

    /// Release the exclusive state, wait to be signalled, reacquire.
    ///
    /// On return the exclusive state is held exactly as before the call,
    /// whatever mix of signals and interrupts occurred in between.
    pub fn wait(&self) -> SyncResult<()> {
        let parker = Parker::current();
        if parker.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.check_owner()?;

        let node = self.add_condition_waiter(&parker);
        let saved_state = self.fully_release(&node)?;
        let mut interrupt = InterruptMode::None;

        while !self.sync.sync_queue().is_on_sync_queue(&node) {
            parker.park();
            interrupt = self.check_interrupt_while_waiting(&parker, &node);
            if interrupt != InterruptMode::None {
                break;
            }
        }

        if self.sync.acquire_queued(&node, saved_state)? && interrupt != InterruptMode::Throw {
            interrupt = InterruptMode::Reassert;
        }
        if node.next_waiter.load().is_some() {
            self.unlink_cancelled_waiters();
        }
        self.report_after_wait(&parker, interrupt)
    }

    /// Wait without responding to interrupts; an interrupt observed while
    /// waiting is re-asserted on return
    pub fn wait_uninterruptibly(&self) -> SyncResult<()> {
        let parker = Parker::current();
        self.check_owner()?;

        let node = self.add_condition_waiter(&parker);
        let saved_state = self.fully_release(&node)?;
        let mut interrupted = false;

        while !self.sync.sync_queue().is_on_sync_queue(&node) {
            parker.park();
            if parker.take_interrupted() {
                interrupted = true;
            }
        }

        if self.sync.acquire_queued(&node, saved_state)? || interrupted {
            parker.set_interrupted();
        }
        Ok(())
    }

    /// Timed wait. Returns whether the timeout elapsed before a signal;
    /// the exclusive state is reacquired either way.
    pub fn wait_for(&self, timeout: Duration) -> SyncResult<WaitTimeoutResult> {
        self.wait_until(Instant::now() + timeout)
    }

    /// Deadline form of [`wait_for`](Self::wait_for)
    pub fn wait_until(&self, deadline: Instant) -> SyncResult<WaitTimeoutResult> {
        let parker = Parker::current();
        if parker.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.check_owner()?;

        let node = self.add_condition_waiter(&parker);
        let saved_state = self.fully_release(&node)?;
        let mut interrupt = InterruptMode::None;
        let mut timed_out = false;

        while !self.sync.sync_queue().is_on_sync_queue(&node) {
            let now = Instant::now();
            if now >= deadline {
                // Lost the race against time: move ourselves onto the sync
                // queue for ordinary reacquisition
                timed_out = self.transfer_after_cancelled_wait(&node);
                break;
            }
            if deadline - now > self.sync.config().timed_spin_threshold {
                parker.park_until(deadline);
            }
            interrupt = self.check_interrupt_while_waiting(&parker, &node);
            if interrupt != InterruptMode::None {
                break;
            }
        }

        if self.sync.acquire_queued(&node, saved_state)? && interrupt != InterruptMode::Throw {
            interrupt = InterruptMode::Reassert;
        }
        if node.next_waiter.load().is_some() {
            self.unlink_cancelled_waiters();
        }
        match self.report_after_wait(&parker, interrupt) {
            Ok(()) => Ok(WaitTimeoutResult(timed_out)),
            Err(e) => Err(e),
        }
    }

    // --- Signalling ---

    /// Move the longest-waiting waiter onto the sync queue
    pub fn signal(&self) -> SyncResult<()> {
        self.check_owner()?;
        if let Some(first) = self.first_waiter.load_full() {
            self.do_signal(first);
        }
        Ok(())
    }

    /// Move every waiter onto the sync queue
    pub fn signal_all(&self) -> SyncResult<()> {
        self.check_owner()?;
        if let Some(first) = self.first_waiter.load_full() {
            self.do_signal_all(first);
        }
        Ok(())
    }

    // --- Introspection (requires the exclusive hold) ---

    /// Whether any thread is waiting on this condition
    pub fn has_waiters(&self) -> SyncResult<bool> {
        self.check_owner()?;
        let mut cursor = self.first_waiter.load_full();
        while let Some(node) = cursor {
            if node.status.load() == WaitStatus::Condition {
                return Ok(true);
            }
            cursor = node.next_waiter.load_full();
        }
        Ok(false)
    }

    /// Approximate number of waiters on this condition
    pub fn wait_queue_len(&self) -> SyncResult<usize> {
        self.check_owner()?;
        let mut count = 0;
        let mut cursor = self.first_waiter.load_full();
        while let Some(node) = cursor {
            if node.status.load() == WaitStatus::Condition {
                count += 1;
            }
            cursor = node.next_waiter.load_full();
        }
        Ok(count)
    }

    /// Threads currently waiting on this condition
    pub fn waiting_threads(&self) -> SyncResult<Vec<Thread>> {
        self.check_owner()?;
        let mut threads = Vec::new();
        let mut cursor = self.first_waiter.load_full();
        while let Some(node) = cursor {
            if node.status.load() == WaitStatus::Condition {
                if let Some(thread) = node.owner_thread() {
                    threads.push(thread);
                }
            }
            cursor = node.next_waiter.load_full();
        }
        Ok(threads)
    }

    // --- Internals; all run while the exclusive state is held unless noted ---

    /// Append a fresh waiter, opportunistically clearing out cancelled
    /// entries when the last-known waiter turns out to be dead
    fn add_condition_waiter(&self, parker: &Arc<Parker>) -> Arc<Node> {
        debug_assert!(self.sync.policy().is_held_exclusively(self.sync.state()));

        let mut last = self.last_waiter.load_full();
        if let Some(ref tail) = last {
            if tail.status.load() != WaitStatus::Condition {
                self.unlink_cancelled_waiters();
                last = self.last_waiter.load_full();
            }
        }

        let node = Node::condition_waiter(Arc::clone(parker));
        match last {
            None => self.first_waiter.store(Some(Arc::clone(&node))),
            Some(tail) => tail.next_waiter.store(Some(Arc::clone(&node))),
        }
        self.last_waiter.store(Some(Arc::clone(&node)));
        node
    }

    /// Release the entire saved state; a failure poisons the fresh waiter
    /// so it is skipped and unlinked by later traffic
    fn fully_release(&self, node: &Arc<Node>) -> SyncResult<usize> {
        let saved_state = self.sync.state().get();
        match self.sync.release(saved_state) {
            Ok(true) => Ok(saved_state),
            Ok(false) => {
                node.status.store(WaitStatus::Cancelled);
                Err(SyncError::NotHeld)
            }
            Err(e) => {
                node.status.store(WaitStatus::Cancelled);
                Err(e)
            }
        }
    }

    /// Pop waiters until one transfer succeeds
    fn do_signal(&self, mut first: Arc<Node>) {
        loop {
            let next = first.next_waiter.load_full();
            self.first_waiter.store(next.clone());
            if next.is_none() {
                self.last_waiter.store(None);
            }
            first.next_waiter.store(None);

            if self.transfer_for_signal(&first) {
                return;
            }
            match self.first_waiter.load_full() {
                Some(node) => first = node,
                None => return,
            }
        }
    }

    /// Detach the whole list, then transfer every entry
    fn do_signal_all(&self, mut first: Arc<Node>) {
        self.first_waiter.store(None);
        self.last_waiter.store(None);
        loop {
            let next = first.next_waiter.load_full();
            first.next_waiter.store(None);
            self.transfer_for_signal(&first);
            match next {
                Some(node) => first = node,
                None => return,
            }
        }
    }

    /// Move a signalled node onto the sync queue. False when the waiter
    /// already cancelled its wait.
    fn transfer_for_signal(&self, node: &Arc<Node>) -> bool {
        if !node
            .status
            .compare_and_set(WaitStatus::Condition, WaitStatus::None)
        {
            return false;
        }

        let pred = self.sync.sync_queue().enqueue(node);
        let status = pred.status.load();
        // If the predecessor cannot promise a signal, wake the waiter now
        // so it can resynchronize inside the acquire loop
        if status.is_cancelled() || !pred.status.compare_and_set(status, WaitStatus::Signal) {
            node.unpark_owner();
        }
        true
    }

    /// After a timeout or interrupt: claim the cancelled wait if the node
    /// was not yet signalled (true), otherwise wait out the signalling
    /// thread's in-flight transfer (false). May run without the hold.
    fn transfer_after_cancelled_wait(&self, node: &Arc<Node>) -> bool {
        if node
            .status
            .compare_and_set(WaitStatus::Condition, WaitStatus::None)
        {
            trace!("condition wait cancelled before signal; self-transferring");
            self.sync.sync_queue().enqueue(node);
            return true;
        }
        while !self.sync.sync_queue().is_on_sync_queue(node) {
            thread::yield_now();
        }
        false
    }

    fn check_interrupt_while_waiting(&self, parker: &Parker, node: &Arc<Node>) -> InterruptMode {
        if parker.take_interrupted() {
            if self.transfer_after_cancelled_wait(node) {
                InterruptMode::Throw
            } else {
                InterruptMode::Reassert
            }
        } else {
            InterruptMode::None
        }
    }

    fn report_after_wait(&self, parker: &Parker, interrupt: InterruptMode) -> SyncResult<()> {
        match interrupt {
            InterruptMode::Throw => Err(SyncError::Interrupted),
            InterruptMode::Reassert => {
                parker.set_interrupted();
                Ok(())
            }
            InterruptMode::None => Ok(()),
        }
    }

    /// Sweep dead entries out of the list. Called on append when the tail
    /// is dead and after a cancelled wait; both hold the exclusive state.
    fn unlink_cancelled_waiters(&self) {
        debug_assert!(self.sync.policy().is_held_exclusively(self.sync.state()));

        let mut cursor = self.first_waiter.load_full();
        let mut trail: Option<Arc<Node>> = None;
        while let Some(node) = cursor {
            let next = node.next_waiter.load_full();
            if node.status.load() != WaitStatus::Condition {
                node.next_waiter.store(None);
                match &trail {
                    None => self.first_waiter.store(next.clone()),
                    Some(live) => live.next_waiter.store(next.clone()),
                }
                if next.is_none() {
                    self.last_waiter.store(trail.clone());
                }
            } else {
                trail = Some(node);
            }
            cursor = next;
        }
    }
}

impl<P: SyncPolicy> std::fmt::Debug for Condition<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("has_waiters", &self.first_waiter.load().is_some())
            .finish()
    }
}
