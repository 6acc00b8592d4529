/*!
 * Synchronization Configuration
 *
 * Runtime configuration for acquisition ordering and timed-wait tuning
 */

use std::time::Duration;

/// Acquisition ordering policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fairness {
    /// A newly arriving caller may attempt the state transition before
    /// consulting the queue, and so may acquire ahead of parked waiters.
    /// This matches the default behavior of most lock implementations and
    /// gives the highest throughput under contention.
    Barging,
    /// The entry fast path first checks for queued predecessors and falls
    /// through to queueing if any exist, giving strict arrival ordering at
    /// the cost of extra queue traffic.
    Fair,
}

/// Synchronization configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Acquisition ordering
    pub fairness: Fairness,
    /// Timed waits with less than this remaining spin instead of parking.
    /// Very short parks cost more than the wait itself.
    pub timed_spin_threshold: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fairness: Fairness::Barging,
            timed_spin_threshold: Duration::from_micros(1),
        }
    }
}

impl SyncConfig {
    /// Default barging configuration
    pub const fn barging() -> Self {
        Self {
            fairness: Fairness::Barging,
            timed_spin_threshold: Duration::from_micros(1),
        }
    }

    /// Fair configuration: queued predecessors win over new arrivals
    pub const fn fair() -> Self {
        Self {
            fairness: Fairness::Fair,
            timed_spin_threshold: Duration::from_micros(1),
        }
    }

    /// True if the entry fast path may run ahead of queued waiters
    #[inline]
    pub fn allows_barging(&self) -> bool {
        self.fairness == Fairness::Barging
    }
}
