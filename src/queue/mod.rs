/*!
 * Wait Queue Engine
 *
 * The intrusive CLH-variant queue that every blocking protocol in this
 * crate is built on. Internal to the crate; callers go through
 * `sync::QueuedSync`.
 */

mod node;
#[allow(clippy::module_inception)]
mod queue;
mod status;

pub(crate) use node::{is_node, Node, NodeMode};
pub(crate) use queue::SyncQueue;
pub(crate) use status::WaitStatus;
