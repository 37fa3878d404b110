//! Subscriptions and their publish engines.
//!
//! Each subscription runs one worker thread that batches change
//! notifications and answers the session's queued publish requests:
//! - Notifications for the same client handle coalesce (last value wins)
//! - An interval tick with pending data waits for a publish request
//! - Empty intervals count towards a keep-alive response
//! - Intervals without a serviceable publish request count towards the
//!   subscription lifetime, after which the subscription times out
//!
//! # Example
//!
//! ```ignore
//! let info = registry.create_subscription(&session.auth_token, SubscriptionParameters {
//!     publishing_interval: 100.0,
//!     lifetime_count: 10,
//!     max_keep_alive_count: 3,
//! })?;
//!
//! // The worker answers publish requests queued on the session.
//! registry.publish(PublishRequestEnvelope { request, request_id: 7 });
//! ```

mod engine;
mod registry;
mod types;
mod worker;

pub use registry::SubscriptionRegistry;
pub use types::{StopReason, SubscriptionInfo, SubscriptionParameters};
