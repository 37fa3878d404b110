//! Engine configuration.

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Longest tick period the engine will schedule.
const MAX_PUBLISHING_INTERVAL_MS: f64 = u32::MAX as f64;

/// Engine configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pending publish requests kept per session. Newer requests are
    /// dropped once the queue is full.
    /// Default: 100
    pub publish_request_queue_capacity: usize,

    /// Notifications buffered per subscription before producers block.
    /// Default: 100
    pub notification_queue_capacity: usize,

    /// Parameter updates buffered per subscription.
    /// Default: 2
    pub modify_queue_capacity: usize,

    /// Tick period (ms) used when a subscription asks for a publishing
    /// interval that is not a positive finite number.
    /// Default: 1000
    pub fallback_publishing_interval_ms: f64,

    /// Push the current value of every newly monitored node.
    /// Default: true
    pub initial_value_fetch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            publish_request_queue_capacity: 100,
            notification_queue_capacity: 100,
            modify_queue_capacity: 2,
            fallback_publishing_interval_ms: 1000.0,
            initial_value_fetch: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Tick period for a requested publishing interval in milliseconds.
    pub fn tick_period(&self, publishing_interval_ms: f64) -> Duration {
        let ms = if publishing_interval_ms.is_finite() && publishing_interval_ms > 0.0 {
            publishing_interval_ms
        } else {
            self.fallback_publishing_interval_ms.max(1.0)
        };
        Duration::from_secs_f64(ms.min(MAX_PUBLISHING_INTERVAL_MS) / 1000.0)
    }
}
