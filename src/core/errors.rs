/*!
 * Error Types
 *
 * Error taxonomy for the synchronization framework. Only externally
 * meaningful outcomes cross the public boundary: interruption, misuse,
 * and unsupported modes. Internal CAS failures are always retried and
 * never surfaced. Timeouts are reported as values, not errors.
 */

use thiserror::Error;

/// Result type for framework operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Synchronization errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// An interruptible wait was interrupted. The caller's pending-interrupt
    /// flag is consumed exactly once when this is returned.
    #[error("wait was interrupted")]
    Interrupted,

    /// The operation requires the exclusive state to be held by the calling
    /// thread, and it is not.
    #[error("synchronizer is not held exclusively")]
    NotHeld,

    /// The policy does not implement the requested acquisition mode.
    #[error("operation not supported by this synchronization policy")]
    Unsupported,
}
