/*!
 * Wait Queue
 *
 * CLH-variant queue of blocked waiters: a doubly-linked list with a lazily
 * installed sentinel head, maintained entirely with CAS. Enqueue is a
 * single tail-CAS; dequeue happens by advancing head. Interior nodes are
 * unlinked only during cancellation cleanup.
 *
 * # Invariants
 *
 * - head/tail are absent until the first contention event; once installed,
 *   head never reverts to absent.
 * - A node becomes head only via a successful acquire by its owning thread,
 *   and the head's status is never `Cancelled`.
 * - The backward `prev` chain is always intact; forward `next` links are
 *   hints that may lag or dangle, and every forward traversal falls back to
 *   a backward scan from tail when they do.
 */

use std::sync::Arc;
use std::thread::{self, Thread, ThreadId};

use arc_swap::ArcSwapOption;
use log::trace;

use crate::core::park::Parker;

use super::node::{cas_link, cas_weak_link, is_node, same_node, Node, NodeMode};
use super::status::WaitStatus;

/// The sync queue: sentinel head plus CAS-appended tail
pub(crate) struct SyncQueue {
    head: ArcSwapOption<Node>,
    tail: ArcSwapOption<Node>,
}

impl SyncQueue {
    pub(crate) const fn new() -> Self {
        Self {
            head: ArcSwapOption::const_empty(),
            tail: ArcSwapOption::const_empty(),
        }
    }

    #[inline]
    pub(crate) fn head_full(&self) -> Option<Arc<Node>> {
        self.head.load_full()
    }

    #[inline]
    pub(crate) fn tail_full(&self) -> Option<Arc<Node>> {
        self.tail.load_full()
    }

    /// Create a node for the calling thread and append it
    pub(crate) fn add_waiter(&self, mode: NodeMode) -> Arc<Node> {
        let node = Node::waiter(mode, Parker::current());
        self.enqueue(&node);
        node
    }

    /// CAS-append `node`, lazily installing the sentinel head first.
    /// Loops until the tail CAS succeeds; returns the observed predecessor.
    pub(crate) fn enqueue(&self, node: &Arc<Node>) -> Arc<Node> {
        loop {
            let tail = self.tail.load_full();
            match tail {
                None => {
                    // First contention: install a sentinel, then retry
                    let sentinel = Node::sentinel();
                    if cas_link(&self.head, &None, Some(Arc::clone(&sentinel))) {
                        self.tail.store(Some(sentinel));
                    }
                }
                Some(ref t) => {
                    node.prev.store(Some(Arc::clone(t)));
                    if cas_link(&self.tail, &tail, Some(Arc::clone(node))) {
                        t.set_next(node);
                        return Arc::clone(t);
                    }
                }
            }
        }
    }

    /// Make `node` the head after its thread acquired. Only the owning
    /// thread may call this, and only while `node` is head's successor.
    pub(crate) fn set_head(&self, node: &Arc<Node>) {
        self.head.store(Some(Arc::clone(node)));
        node.prev.store(None);
        node.waker.store(None);
    }

    /// Wake the nearest live successor of `node`.
    ///
    /// Clears a negative status first (losing that CAS is fine; it means a
    /// waiter or another release already handled it). When the forward hint
    /// is missing or cancelled, scans backward from tail, since `next` may
    /// not be linked yet for freshly enqueued nodes.
    pub(crate) fn unpark_successor(&self, node: &Arc<Node>) {
        let status = node.status.load();
        if status.needs_signal() {
            node.status.compare_and_set(status, WaitStatus::None);
        }

        let mut successor = node.next_node();
        if successor
            .as_ref()
            .map_or(true, |s| s.status.load().is_cancelled())
        {
            successor = None;
            let mut cursor = self.tail.load_full();
            while let Some(current) = cursor {
                if Arc::ptr_eq(&current, node) {
                    break;
                }
                if !current.status.load().is_cancelled() {
                    successor = Some(Arc::clone(&current));
                }
                cursor = current.prev.load_full();
            }
        }

        if let Some(successor) = successor {
            successor.unpark_owner();
        }
    }

    /// Release-propagation sweep for shared mode.
    ///
    /// For a settled head: `Signal` is CAS-cleared and the successor woken;
    /// a still-`None` status is CAS-raised to `Propagate` so a later
    /// `set_head_and_propagate` keeps cascading. Loops until the head stops
    /// moving underneath us.
    pub(crate) fn do_release_shared(&self) {
        loop {
            let snapshot = self.head.load_full();
            if let Some(ref head) = snapshot {
                if !same_node(&snapshot, &self.tail.load_full()) {
                    match head.status.load() {
                        WaitStatus::Signal => {
                            if !head
                                .status
                                .compare_and_set(WaitStatus::Signal, WaitStatus::None)
                            {
                                continue; // recheck from the new head
                            }
                            self.unpark_successor(head);
                        }
                        WaitStatus::None => {
                            if !head
                                .status
                                .compare_and_set(WaitStatus::None, WaitStatus::Propagate)
                            {
                                continue;
                            }
                        }
                        _ => {}
                    }
                }
            }
            if same_node(&self.head.load_full(), &snapshot) {
                break;
            }
        }
    }

    /// Decide whether the failed acquirer should park, repairing the queue
    /// as a side effect. Requires `pred` to be the current `node.prev`.
    pub(crate) fn should_park_after_failed_acquire(pred: &Arc<Node>, node: &Arc<Node>) -> bool {
        let status = pred.status.load();
        if status == WaitStatus::Signal {
            // Predecessor already promised to signal us
            return true;
        }
        if status.is_cancelled() {
            // Walk backward past the dead run and splice onto the first
            // live node. Forward links of fresh nodes may not exist yet,
            // so the walk always goes backward.
            let mut live = Arc::clone(pred);
            while live.status.load().is_cancelled() {
                match live.prev.load_full() {
                    Some(prev) => {
                        node.prev.store(Some(Arc::clone(&prev)));
                        live = prev;
                    }
                    None => break,
                }
            }
            live.set_next(node);
        } else {
            // None or Propagate: request a signal, but let the caller make
            // one more acquire attempt before actually parking
            pred.status.compare_and_set(status, WaitStatus::Signal);
        }
        false
    }

    /// Cancel a queued acquire. Idempotent; never disturbs other waiters'
    /// progress beyond relinking around the dead node.
    pub(crate) fn cancel(&self, node: &Arc<Node>) {
        trace!(
            "cancelling queued waiter {:?}",
            node.owner_thread().map(|t| t.id())
        );
        node.waker.store(None);

        // Skip over predecessors that are themselves cancelled
        let mut pred = match node.prev.load_full() {
            Some(pred) => pred,
            None => return,
        };
        while pred.status.load().is_cancelled() {
            match pred.prev.load_full() {
                Some(prev) => {
                    node.prev.store(Some(Arc::clone(&prev)));
                    pred = prev;
                }
                None => break,
            }
        }

        // Snapshot for the link CASes below: if they fail we lost a race to
        // another cancel or signal and no further repair is needed
        let pred_next = pred.next.load_full();

        node.status.store(WaitStatus::Cancelled);

        let tail = self.tail.load_full();
        if is_node(&tail, node) && cas_link(&self.tail, &tail, Some(Arc::clone(&pred))) {
            // We were last: retreat the tail and drop pred's stale hint
            cas_weak_link(&pred.next, &pred_next, std::sync::Weak::new());
        } else {
            // If the predecessor can deliver a signal, splice it straight to
            // our successor; otherwise wake the successor so it re-derives a
            // valid predecessor itself
            let head = self.head.load_full();
            let pred_status = pred.status.load();
            let pred_can_signal = !is_node(&head, &pred)
                && (pred_status == WaitStatus::Signal
                    || (!pred_status.is_cancelled()
                        && pred.status.compare_and_set(pred_status, WaitStatus::Signal)))
                && pred.waker.load().is_some();

            if pred_can_signal {
                if let Some(next) = node.next_node() {
                    if !next.status.load().is_cancelled() {
                        cas_weak_link(&pred.next, &pred_next, Arc::downgrade(&next));
                    }
                }
            } else {
                self.unpark_successor(node);
            }
        }
    }

    /// Whether a (condition) node has been transferred onto the sync queue
    pub(crate) fn is_on_sync_queue(&self, node: &Arc<Node>) -> bool {
        if node.status.load() == WaitStatus::Condition || node.prev.load().is_none() {
            return false;
        }
        if node.next_node().is_some() {
            // Has a successor, so it must be on the queue
            return true;
        }
        // prev is set but the tail CAS may not have completed; the backward
        // scan settles it
        self.find_node_from_tail(node)
    }

    fn find_node_from_tail(&self, node: &Arc<Node>) -> bool {
        let mut cursor = self.tail.load_full();
        loop {
            match cursor {
                Some(current) if Arc::ptr_eq(&current, node) => return true,
                Some(current) => cursor = current.prev.load_full(),
                None => return false,
            }
        }
    }

    // --- Best-effort introspection; answers may be stale immediately ---

    /// True when any waiter is (apparently) queued
    pub(crate) fn has_queued(&self) -> bool {
        !same_node(&self.head_full(), &self.tail_full())
    }

    /// True once contention has ever occurred
    pub(crate) fn has_contended(&self) -> bool {
        self.head.load().is_some()
    }

    /// Approximate number of queued waiters
    pub(crate) fn len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.tail.load_full();
        while let Some(current) = cursor {
            if current.waker.load().is_some() {
                count += 1;
            }
            cursor = current.prev.load_full();
        }
        count
    }

    /// Threads of queued waiters, in no particular order
    pub(crate) fn threads(&self) -> Vec<Thread> {
        self.collect_threads(|_| true)
    }

    /// Threads queued in the given mode
    pub(crate) fn threads_in_mode(&self, mode: NodeMode) -> Vec<Thread> {
        self.collect_threads(|node| node.mode == mode)
    }

    fn collect_threads(&self, keep: impl Fn(&Node) -> bool) -> Vec<Thread> {
        let mut threads = Vec::new();
        let mut cursor = self.tail.load_full();
        while let Some(current) = cursor {
            if keep(&current) {
                if let Some(thread) = current.owner_thread() {
                    threads.push(thread);
                }
            }
            cursor = current.prev.load_full();
        }
        threads
    }

    /// True if the given thread is currently queued
    pub(crate) fn is_queued_thread(&self, id: ThreadId) -> bool {
        let mut cursor = self.tail.load_full();
        while let Some(current) = cursor {
            if current.owner_thread().map(|t| t.id()) == Some(id) {
                return true;
            }
            cursor = current.prev.load_full();
        }
        false
    }

    /// The longest-waiting queued thread, if any
    pub(crate) fn first_queued_thread(&self) -> Option<Thread> {
        let head = self.head.load_full();
        if same_node(&head, &self.tail.load_full()) {
            return None;
        }
        // Fast path: head's successor with consistent reads
        if let Some(ref h) = head {
            if let Some(s) = h.next_node() {
                if is_node(&s.prev.load_full(), h) {
                    if let Some(thread) = s.owner_thread() {
                        return Some(thread);
                    }
                }
            }
        }
        // A concurrent set_head raced with us; the backward walk is exact
        let mut first = None;
        let mut cursor = self.tail.load_full();
        while let Some(current) = cursor {
            if is_node(&head, &current) {
                break;
            }
            if let Some(thread) = current.owner_thread() {
                first = Some(thread);
            }
            cursor = current.prev.load_full();
        }
        first
    }

    /// Whether any thread has waited longer than the caller. Used by fair
    /// entry paths to decline barging.
    pub(crate) fn has_queued_predecessors(&self) -> bool {
        let head = self.head.load_full();
        if same_node(&head, &self.tail.load_full()) {
            return false;
        }
        let Some(head) = head else {
            return false;
        };
        match head.next_node() {
            // Unknown successor: answer conservatively
            None => true,
            Some(s) => s
                .owner_thread()
                .map_or(true, |t| t.id() != thread::current().id()),
        }
    }
}
