//! Client sessions.
//!
//! A session is registered under its authentication token and owns the
//! bounded queue of publish requests its client has sent. Subscription
//! workers of the session take requests from that queue when they have
//! something to send.

mod registry;
mod types;

pub use registry::SessionRegistry;
pub use types::{PublishRequestEnvelope, Session};
