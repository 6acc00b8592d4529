/*!
 * Queued Synchronizer
 *
 * The blocking framework: exclusive and shared acquire/release protocols
 * driving the wait queue, with interruptible and timed variants.
 *
 * # Control Flow
 *
 * A caller first attempts the policy's state transition (the fast path —
 * under the default barging configuration this may overtake parked
 * waiters). On failure it appends a node and loops: when its predecessor
 * is the head it retries the transition; otherwise it records a signal
 * request in the predecessor's status and parks. Release finds the head
 * and unparks the nearest live successor.
 *
 * # Cancellation
 *
 * Timeout and interruption cancel cooperatively: the waiter unlinks its
 * own node and reports failure. A drop guard performs the same cleanup if
 * a policy attempt panics mid-loop, so a misbehaving policy cannot strand
 * a dead node in the queue.
 */

use std::sync::Arc;
use std::thread::{Thread, ThreadId};
use std::time::{Duration, Instant};

use crate::core::config::SyncConfig;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::park::Parker;
use crate::queue::{is_node, Node, NodeMode, SyncQueue, WaitStatus};

use super::policy::{SharedGrant, SyncPolicy};
use super::state::SyncState;

/// A blocking synchronizer: one state word, one wait queue, one policy
pub struct QueuedSync<P: SyncPolicy> {
    state: SyncState,
    queue: SyncQueue,
    policy: P,
    config: SyncConfig,
}

/// Cancels a queued node unless disarmed by a successful acquire
struct CancelOnDrop<'a> {
    queue: &'a SyncQueue,
    node: &'a Arc<Node>,
    armed: bool,
}

impl<'a> CancelOnDrop<'a> {
    fn new(queue: &'a SyncQueue, node: &'a Arc<Node>) -> Self {
        Self {
            queue,
            node,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.cancel(self.node);
        }
    }
}

impl<P: SyncPolicy> QueuedSync<P> {
    /// Create with the default (barging) configuration
    pub fn new(policy: P, initial_state: usize) -> Self {
        Self::with_config(policy, initial_state, SyncConfig::default())
    }

    pub fn with_config(policy: P, initial_state: usize, config: SyncConfig) -> Self {
        Self {
            state: SyncState::new(initial_state),
            queue: SyncQueue::new(),
            policy,
            config,
        }
    }

    /// The atomic state word
    #[inline]
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// The policy interpreting the state word
    #[inline]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    #[inline]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline]
    pub(crate) fn sync_queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// Whether the entry fast path may run now. Always true when barging;
    /// under the fair configuration only when no one has waited longer.
    #[inline]
    fn fast_path_allowed(&self) -> bool {
        self.config.allows_barging() || !self.queue.has_queued_predecessors()
    }

    // --- Exclusive mode ---

    /// Acquire in exclusive mode, ignoring interrupts.
    ///
    /// An interrupt observed while parked is re-asserted on the caller's
    /// parker before returning instead of aborting the wait.
    pub fn acquire(&self, arg: usize) -> SyncResult<()> {
        if self.fast_path_allowed() && self.policy.try_acquire(&self.state, arg)? {
            return Ok(());
        }
        let node = self.queue.add_waiter(NodeMode::Exclusive);
        if self.acquire_queued(&node, arg)? {
            Parker::current().set_interrupted();
        }
        Ok(())
    }

    /// Acquire in exclusive mode, aborting with `Interrupted` if the
    /// caller's parker is or becomes interrupted
    pub fn acquire_interruptibly(&self, arg: usize) -> SyncResult<()> {
        let parker = Parker::current();
        if parker.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.fast_path_allowed() && self.policy.try_acquire(&self.state, arg)? {
            return Ok(());
        }
        self.do_acquire_interruptibly(&parker, arg)
    }

    /// Timed exclusive acquire. `Ok(false)` on timeout; the queue retains
    /// no trace of the caller afterwards.
    pub fn try_acquire_for(&self, arg: usize, timeout: Duration) -> SyncResult<bool> {
        self.try_acquire_until(arg, Instant::now() + timeout)
    }

    /// Deadline form of [`try_acquire_for`](Self::try_acquire_for)
    pub fn try_acquire_until(&self, arg: usize, deadline: Instant) -> SyncResult<bool> {
        let parker = Parker::current();
        if parker.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.fast_path_allowed() && self.policy.try_acquire(&self.state, arg)? {
            return Ok(true);
        }
        self.do_acquire_timed(&parker, arg, deadline)
    }

    /// Release in exclusive mode. When the policy reports the resource
    /// fully free and the head records a pending concern, the successor is
    /// unparked. Returns the policy's verdict.
    pub fn release(&self, arg: usize) -> SyncResult<bool> {
        if self.policy.try_release(&self.state, arg)? {
            if let Some(head) = self.queue.head_full() {
                if head.status.load() != WaitStatus::None {
                    self.queue.unpark_successor(&head);
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Park-and-retry loop for an already queued exclusive node. Returns
    /// whether an interrupt was observed while waiting. Also used by
    /// conditions to reacquire after a wait.
    pub(crate) fn acquire_queued(&self, node: &Arc<Node>, arg: usize) -> SyncResult<bool> {
        let parker = Parker::current();
        let mut guard = CancelOnDrop::new(&self.queue, node);
        let mut interrupted = false;
        loop {
            let pred = node
                .prev
                .load_full()
                .expect("queued node always has a predecessor");
            if is_node(&self.queue.head_full(), &pred) && self.policy.try_acquire(&self.state, arg)?
            {
                self.queue.set_head(node);
                guard.disarm();
                return Ok(interrupted);
            }
            if SyncQueue::should_park_after_failed_acquire(&pred, node) {
                parker.park();
                if parker.take_interrupted() {
                    interrupted = true;
                }
            }
        }
    }

    fn do_acquire_interruptibly(&self, parker: &Parker, arg: usize) -> SyncResult<()> {
        let node = self.queue.add_waiter(NodeMode::Exclusive);
        let mut guard = CancelOnDrop::new(&self.queue, &node);
        loop {
            let pred = node
                .prev
                .load_full()
                .expect("queued node always has a predecessor");
            if is_node(&self.queue.head_full(), &pred) && self.policy.try_acquire(&self.state, arg)?
            {
                self.queue.set_head(&node);
                guard.disarm();
                return Ok(());
            }
            if SyncQueue::should_park_after_failed_acquire(&pred, &node) {
                parker.park();
                if parker.take_interrupted() {
                    // guard unlinks the node on the way out
                    return Err(SyncError::Interrupted);
                }
            }
        }
    }

    fn do_acquire_timed(&self, parker: &Parker, arg: usize, deadline: Instant) -> SyncResult<bool> {
        let node = self.queue.add_waiter(NodeMode::Exclusive);
        let mut guard = CancelOnDrop::new(&self.queue, &node);
        loop {
            let pred = node
                .prev
                .load_full()
                .expect("queued node always has a predecessor");
            if is_node(&self.queue.head_full(), &pred) && self.policy.try_acquire(&self.state, arg)?
            {
                self.queue.set_head(&node);
                guard.disarm();
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            // Near the deadline a park costs more than the wait itself
            if SyncQueue::should_park_after_failed_acquire(&pred, &node)
                && deadline - now > self.config.timed_spin_threshold
            {
                parker.park_until(deadline);
            }
            if parker.take_interrupted() {
                return Err(SyncError::Interrupted);
            }
        }
    }

    // --- Shared mode ---

    /// Acquire in shared mode, ignoring interrupts
    pub fn acquire_shared(&self, arg: usize) -> SyncResult<()> {
        if self.fast_path_allowed() && self.policy.try_acquire_shared(&self.state, arg)?.acquired()
        {
            return Ok(());
        }
        self.do_acquire_shared(arg)
    }

    /// Acquire in shared mode, aborting with `Interrupted`
    pub fn acquire_shared_interruptibly(&self, arg: usize) -> SyncResult<()> {
        let parker = Parker::current();
        if parker.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.fast_path_allowed() && self.policy.try_acquire_shared(&self.state, arg)?.acquired()
        {
            return Ok(());
        }
        self.do_acquire_shared_interruptibly(&parker, arg)
    }

    /// Timed shared acquire. `Ok(false)` on timeout.
    pub fn try_acquire_shared_for(&self, arg: usize, timeout: Duration) -> SyncResult<bool> {
        self.try_acquire_shared_until(arg, Instant::now() + timeout)
    }

    /// Deadline form of [`try_acquire_shared_for`](Self::try_acquire_shared_for)
    pub fn try_acquire_shared_until(&self, arg: usize, deadline: Instant) -> SyncResult<bool> {
        let parker = Parker::current();
        if parker.take_interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.fast_path_allowed() && self.policy.try_acquire_shared(&self.state, arg)?.acquired()
        {
            return Ok(true);
        }
        self.do_acquire_shared_timed(&parker, arg, deadline)
    }

    /// Release in shared mode; always runs the propagation sweep when the
    /// policy reports that waiters may now succeed
    pub fn release_shared(&self, arg: usize) -> SyncResult<bool> {
        if self.policy.try_release_shared(&self.state, arg)? {
            self.queue.do_release_shared();
            return Ok(true);
        }
        Ok(false)
    }

    /// Become head and cascade the wake-up when the grant, a recorded
    /// status, or an unknown/shared successor says further waiters may
    /// proceed. This is what lets one release wake N shared waiters
    /// without N round-trips.
    fn set_head_and_propagate(&self, node: &Arc<Node>, grant: SharedGrant) {
        let recorded = |head: &Option<Arc<Node>>| {
            head.as_ref().map_or(true, |h| h.status.load().needs_signal())
        };
        let old_head = self.queue.head_full();
        self.queue.set_head(node);

        if grant.more_available() || recorded(&old_head) || recorded(&self.queue.head_full()) {
            match node.next_node() {
                None => self.queue.do_release_shared(),
                Some(successor) if successor.mode == NodeMode::Shared => {
                    self.queue.do_release_shared()
                }
                Some(_) => {}
            }
        }
    }

    fn do_acquire_shared(&self, arg: usize) -> SyncResult<()> {
        let parker = Parker::current();
        let node = self.queue.add_waiter(NodeMode::Shared);
        let mut guard = CancelOnDrop::new(&self.queue, &node);
        let mut interrupted = false;
        loop {
            let pred = node
                .prev
                .load_full()
                .expect("queued node always has a predecessor");
            if is_node(&self.queue.head_full(), &pred) {
                let grant = self.policy.try_acquire_shared(&self.state, arg)?;
                if grant.acquired() {
                    self.set_head_and_propagate(&node, grant);
                    guard.disarm();
                    if interrupted {
                        parker.set_interrupted();
                    }
                    return Ok(());
                }
            }
            if SyncQueue::should_park_after_failed_acquire(&pred, &node) {
                parker.park();
                if parker.take_interrupted() {
                    interrupted = true;
                }
            }
        }
    }

    fn do_acquire_shared_interruptibly(&self, parker: &Parker, arg: usize) -> SyncResult<()> {
        let node = self.queue.add_waiter(NodeMode::Shared);
        let mut guard = CancelOnDrop::new(&self.queue, &node);
        loop {
            let pred = node
                .prev
                .load_full()
                .expect("queued node always has a predecessor");
            if is_node(&self.queue.head_full(), &pred) {
                let grant = self.policy.try_acquire_shared(&self.state, arg)?;
                if grant.acquired() {
                    self.set_head_and_propagate(&node, grant);
                    guard.disarm();
                    return Ok(());
                }
            }
            if SyncQueue::should_park_after_failed_acquire(&pred, &node) {
                parker.park();
                if parker.take_interrupted() {
                    return Err(SyncError::Interrupted);
                }
            }
        }
    }

    fn do_acquire_shared_timed(
        &self,
        parker: &Parker,
        arg: usize,
        deadline: Instant,
    ) -> SyncResult<bool> {
        let node = self.queue.add_waiter(NodeMode::Shared);
        let mut guard = CancelOnDrop::new(&self.queue, &node);
        loop {
            let pred = node
                .prev
                .load_full()
                .expect("queued node always has a predecessor");
            if is_node(&self.queue.head_full(), &pred) {
                let grant = self.policy.try_acquire_shared(&self.state, arg)?;
                if grant.acquired() {
                    self.set_head_and_propagate(&node, grant);
                    guard.disarm();
                    return Ok(true);
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            if SyncQueue::should_park_after_failed_acquire(&pred, &node)
                && deadline - now > self.config.timed_spin_threshold
            {
                parker.park_until(deadline);
            }
            if parker.take_interrupted() {
                return Err(SyncError::Interrupted);
            }
        }
    }

    // --- Introspection; best-effort, stale the instant it returns ---

    /// Whether any thread is waiting to acquire
    pub fn has_queued_threads(&self) -> bool {
        self.queue.has_queued()
    }

    /// Whether any thread has ever contended (the queue was initialized)
    pub fn has_contended(&self) -> bool {
        self.queue.has_contended()
    }

    /// Approximate number of queued waiters
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Threads currently queued, in no particular order
    pub fn queued_threads(&self) -> Vec<Thread> {
        self.queue.threads()
    }

    /// Queued threads waiting in exclusive mode
    pub fn exclusive_queued_threads(&self) -> Vec<Thread> {
        self.queue.threads_in_mode(NodeMode::Exclusive)
    }

    /// Queued threads waiting in shared mode
    pub fn shared_queued_threads(&self) -> Vec<Thread> {
        self.queue.threads_in_mode(NodeMode::Shared)
    }

    /// The longest-waiting queued thread, if any
    pub fn first_queued_thread(&self) -> Option<Thread> {
        self.queue.first_queued_thread()
    }

    /// Whether the given thread is currently queued
    pub fn is_queued(&self, id: ThreadId) -> bool {
        self.queue.is_queued_thread(id)
    }

    /// Whether any thread has been waiting longer than the caller. A fair
    /// policy's `try_acquire` should fail when this is true (unless the
    /// acquire is reentrant).
    pub fn has_queued_predecessors(&self) -> bool {
        self.queue.has_queued_predecessors()
    }
}

impl<P: SyncPolicy> std::fmt::Debug for QueuedSync<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedSync")
            .field("state", &self.state)
            .field("has_queued", &self.queue.has_queued())
            .finish()
    }
}
