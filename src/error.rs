//! Error types for the subscription engine.

use crate::types::{AttributeId, AuthToken, NodeId, SubscriptionId};
use thiserror::Error;

/// Main error type for engine operations.
///
/// These are request-level failures. Per-element problems inside a batch
/// are reported as status codes in the batch result instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Session not found for token {0}")]
    SessionNotFound(AuthToken),

    #[error("Subscription {subscription} belongs to another session")]
    SessionMismatch { subscription: SubscriptionId },

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(u16),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Attribute {attribute} not supported on {node}")]
    AttributeNotSupported { node: NodeId, attribute: AttributeId },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
