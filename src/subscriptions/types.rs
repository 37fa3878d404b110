//! Subscription types.

use crate::types::{AuthToken, SubscriptionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Revised timing parameters of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParameters {
    /// Milliseconds between interval ticks.
    pub publishing_interval: f64,
    /// Ticks without a serviceable publish request before the subscription
    /// times out.
    pub lifetime_count: u32,
    /// Empty ticks before a keep-alive response is sent.
    pub max_keep_alive_count: u32,
}

/// Snapshot of a registered subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    /// Token of the owning session.
    pub session: AuthToken,
    pub parameters: SubscriptionParameters,
    pub running: bool,
    pub created: Timestamp,
}

/// Why a subscription worker stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Shutdown signal from the registry.
    Shutdown,
    /// Lifetime count exceeded without a publish request.
    Timeout,
    /// The transport failed to deliver a response.
    TransportFailed,
    /// The owning session is gone.
    SessionClosed,
}
