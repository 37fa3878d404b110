//! # UA Subscriptions
//!
//! Subscription and monitored-item services for an OPC-UA server.
//!
//! ## Core Concepts
//!
//! - **Sessions**: Authenticated client connections, each with a bounded
//!   queue of outstanding publish requests
//! - **Subscriptions**: One worker thread each, batching change notifications
//!   into publish responses at the publishing interval
//! - **Monitored items**: Node attributes registered under a subscription
//! - **Namespaces**: Providers of the current attribute values
//!
//! ## Example
//!
//! ```ignore
//! use ua_subscriptions::{EngineConfig, MemoryNamespace, SubscriptionServer};
//!
//! let namespace = Arc::new(MemoryNamespace::new(2));
//! let server = SubscriptionServer::new(EngineConfig::default(), namespace.clone(), transport);
//!
//! let session = server.create_session();
//! let sub = server.create_subscription(&CreateSubscriptionRequest {
//!     header: RequestHeader::new(session.auth_token, 1),
//!     requested_publishing_interval: 100.0,
//!     requested_lifetime_count: 10,
//!     requested_max_keep_alive_count: 3,
//! })?;
//!
//! // Publish a value change to every subscriber of the node
//! let node = namespace.set_value("Pump.Speed", 1450.0);
//! server.change_notification(&node);
//! ```

pub mod config;
pub mod error;
pub mod messages;
pub mod monitored_items;
pub mod namespace;
pub mod server;
pub mod sessions;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use messages::*;
pub use monitored_items::{MonitoredItem, MonitoredItemRegistry};
pub use namespace::{MemoryNamespace, NamespaceProvider, NamespaceRouter};
pub use server::{ServerStats, SubscriptionServer};
pub use sessions::{PublishRequestEnvelope, Session, SessionRegistry};
pub use subscriptions::{StopReason, SubscriptionInfo, SubscriptionParameters, SubscriptionRegistry};
pub use transport::Transport;
pub use types::*;
