/*!
 * Queue Node
 *
 * Intrusive element of the wait queue. All links are CAS-updated cells;
 * races are resolved by retry, never by locking.
 *
 * # Design: Reference-Counted Links
 *
 * The backward `prev` chain is the authoritative one and holds strong
 * references; the forward `next` link is a weak hint that may lag behind
 * (a freshly enqueued node sets its predecessor's `next` only after the
 * tail CAS). A failed upgrade of `next` is exactly the "stale link"
 * condition that routes traversals into the backward scan from tail.
 *
 * Strong edges point only backward in queue order (plus the forward-only
 * condition list), so they cannot form a permanent cycle: a dead node is
 * freed as soon as the head passes it and its successor rewrites `prev`.
 */

use arc_swap::{ArcSwapOption, ArcSwapWeak};
use std::sync::{Arc, Weak};
use std::thread::Thread;

use crate::core::park::Parker;

use super::status::{AtomicStatus, WaitStatus};

/// Atomic cell holding a weak forward link
pub(crate) type WeakLink = ArcSwapWeak<Node>;

/// Acquisition mode a node is queued in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeMode {
    Exclusive,
    Shared,
}

/// One waiter (or the sentinel) in the wait queue
pub(crate) struct Node {
    pub(crate) status: AtomicStatus,
    /// Strong backward link; authoritative chain for traversal
    pub(crate) prev: ArcSwapOption<Node>,
    /// Weak forward hint; may be stale or not yet linked
    pub(crate) next: WeakLink,
    /// Link in a condition's singly-linked wait list
    pub(crate) next_waiter: ArcSwapOption<Node>,
    pub(crate) mode: NodeMode,
    /// Wake handle of the blocked owner; cleared once no longer needed so
    /// the parker is not retained past the wait
    pub(crate) waker: ArcSwapOption<Parker>,
}

impl Node {
    /// Sentinel head installed lazily on first contention
    pub(crate) fn sentinel() -> Arc<Node> {
        Arc::new(Node {
            status: AtomicStatus::new(WaitStatus::None),
            prev: ArcSwapOption::const_empty(),
            next: WeakLink::new(Weak::new()),
            next_waiter: ArcSwapOption::const_empty(),
            mode: NodeMode::Exclusive,
            waker: ArcSwapOption::const_empty(),
        })
    }

    /// Node for a caller entering the sync queue
    pub(crate) fn waiter(mode: NodeMode, parker: Arc<Parker>) -> Arc<Node> {
        Arc::new(Node {
            status: AtomicStatus::new(WaitStatus::None),
            prev: ArcSwapOption::const_empty(),
            next: WeakLink::new(Weak::new()),
            next_waiter: ArcSwapOption::const_empty(),
            mode,
            waker: ArcSwapOption::new(Some(parker)),
        })
    }

    /// Node for a caller entering a condition wait list
    pub(crate) fn condition_waiter(parker: Arc<Parker>) -> Arc<Node> {
        Arc::new(Node {
            status: AtomicStatus::new(WaitStatus::Condition),
            prev: ArcSwapOption::const_empty(),
            next: WeakLink::new(Weak::new()),
            next_waiter: ArcSwapOption::const_empty(),
            mode: NodeMode::Exclusive,
            waker: ArcSwapOption::new(Some(parker)),
        })
    }

    /// Upgraded forward link, `None` when unset, stale, or already freed
    #[inline]
    pub(crate) fn next_node(&self) -> Option<Arc<Node>> {
        self.next.load_full().upgrade()
    }

    #[inline]
    pub(crate) fn set_next(&self, node: &Arc<Node>) {
        self.next.store(Arc::downgrade(node));
    }

    /// Wake the blocked owner, if any
    pub(crate) fn unpark_owner(&self) {
        if let Some(waker) = self.waker.load_full() {
            waker.unpark();
        }
    }

    /// Owning thread, for introspection
    pub(crate) fn owner_thread(&self) -> Option<Thread> {
        self.waker.load_full().map(|p| p.thread().clone())
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("status", &self.status)
            .field("mode", &self.mode)
            .field("owner", &self.owner_thread().map(|t| t.id()))
            .finish()
    }
}

/// Raw pointer of an optional node, null when absent
#[inline]
pub(crate) fn ptr_of(node: &Option<Arc<Node>>) -> *const Node {
    node.as_ref().map_or(std::ptr::null(), Arc::as_ptr)
}

/// Pointer equality of two optional nodes
#[inline]
pub(crate) fn same_node(a: &Option<Arc<Node>>, b: &Option<Arc<Node>>) -> bool {
    ptr_of(a) == ptr_of(b)
}

/// True when `slot` holds exactly `node`
#[inline]
pub(crate) fn is_node(slot: &Option<Arc<Node>>, node: &Arc<Node>) -> bool {
    ptr_of(slot) == Arc::as_ptr(node)
}

/// CAS on a strong link cell. Failure means a concurrent writer won; all
/// call sites re-derive their snapshot and retry.
#[inline]
pub(crate) fn cas_link(
    cell: &ArcSwapOption<Node>,
    current: &Option<Arc<Node>>,
    new: Option<Arc<Node>>,
) -> bool {
    let previous = cell.compare_and_swap(current, new);
    ptr_of(&previous) == ptr_of(current)
}

/// CAS on a weak forward link cell
#[inline]
pub(crate) fn cas_weak_link(cell: &WeakLink, current: &Weak<Node>, new: Weak<Node>) -> bool {
    let previous = cell.compare_and_swap(current, new);
    previous.ptr_eq(current)
}
