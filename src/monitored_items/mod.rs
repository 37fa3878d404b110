//! Monitored items and the node change fan-out.
//!
//! Every item is indexed three ways: by id, by the node it watches and by the
//! subscription it reports to. A change on a node reads the node's current
//! value once per item and queues a notification on each owning
//! subscription.

mod registry;
mod types;

pub use registry::MonitoredItemRegistry;
pub use types::MonitoredItem;
