/*!
 * qsync - Queued Blocking Synchronization Framework
 *
 * A reusable engine for building blocking primitives (mutexes, counting
 * semaphores, latches, read/write locks, condition variables) out of two
 * ingredients: one atomically-updated integer state word, interpreted by a
 * [`SyncPolicy`], and one intrusive FIFO wait queue maintained entirely
 * with compare-and-swap.
 *
 * # Architecture
 *
 * - `core` - ambient concerns: errors, configuration, thread parking
 * - `queue` - the CAS-maintained wait queue engine (crate-internal)
 * - `sync` - the public framework: [`QueuedSync`], [`Condition`], the
 *   policy seam
 *
 * # Example
 *
 * A binary mutex is a policy plus a synchronizer:
 *
 * ```
 * use qsync::{QueuedSync, SyncPolicy, SyncResult, SyncState};
 *
 * struct Binary;
 *
 * impl SyncPolicy for Binary {
 *     fn try_acquire(&self, state: &SyncState, _arg: usize) -> SyncResult<bool> {
 *         Ok(state.compare_and_set(0, 1))
 *     }
 *     fn try_release(&self, state: &SyncState, _arg: usize) -> SyncResult<bool> {
 *         state.set(0);
 *         Ok(true)
 *     }
 * }
 *
 * let lock = QueuedSync::new(Binary, 0);
 * lock.acquire(1).unwrap();
 * lock.release(1).unwrap();
 * ```
 *
 * # Ordering
 *
 * Queue order is arrival order, but acquisition order may "barge": the
 * entry fast path runs before any queue check. [`SyncConfig::fair`]
 * disables that, and [`QueuedSync::has_queued_predecessors`] lets fair
 * policies do the same inside `try_acquire`.
 */

pub mod core;
mod queue;
pub mod sync;

// Re-exports
pub use crate::core::config::{Fairness, SyncConfig};
pub use crate::core::errors::{SyncError, SyncResult};
pub use crate::core::park::Parker;
pub use crate::sync::condition::{Condition, WaitTimeoutResult};
pub use crate::sync::policy::{ExclusiveOwner, SharedGrant, SyncPolicy};
pub use crate::sync::state::SyncState;
pub use crate::sync::synchronizer::QueuedSync;
