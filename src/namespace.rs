//! Attribute value providers.
//!
//! Change notifications read the current value of a monitored node through a
//! [`NamespaceProvider`]. The engine never caches values itself; after an
//! application changes a value it calls
//! [`SubscriptionServer::change_notification`](crate::SubscriptionServer::change_notification)
//! for the node so subscribers pick it up.

use crate::error::{EngineError, Result};
use crate::types::{AttributeId, DataValue, NodeId, Variant};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Source of current attribute values.
pub trait NamespaceProvider: Send + Sync {
    /// Read one attribute of one node.
    fn attribute(&self, node: &NodeId, attribute: AttributeId) -> Result<DataValue>;
}

/// Routes reads to the provider registered for the node's namespace index.
#[derive(Default)]
pub struct NamespaceRouter {
    namespaces: RwLock<HashMap<u16, Arc<dyn NamespaceProvider>>>,
}

impl NamespaceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for a namespace index.
    pub fn register(&self, index: u16, provider: Arc<dyn NamespaceProvider>) {
        self.namespaces.write().insert(index, provider);
    }

    pub fn unregister(&self, index: u16) -> bool {
        self.namespaces.write().remove(&index).is_some()
    }
}

impl NamespaceProvider for NamespaceRouter {
    fn attribute(&self, node: &NodeId, attribute: AttributeId) -> Result<DataValue> {
        let provider = self
            .namespaces
            .read()
            .get(&node.namespace())
            .cloned()
            .ok_or(EngineError::NamespaceNotFound(node.namespace()))?;
        provider.attribute(node, attribute)
    }
}

/// Map-backed namespace keyed by string node ids.
///
/// Only the value attribute is served.
pub struct MemoryNamespace {
    index: u16,
    values: RwLock<HashMap<String, DataValue>>,
}

impl MemoryNamespace {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    /// Node id under which `key` is published.
    pub fn node_id(&self, key: &str) -> NodeId {
        NodeId::string(self.index, key)
    }

    /// Store a value and return the node id to notify.
    pub fn set_value(&self, key: &str, value: impl Into<Variant>) -> NodeId {
        self.set_data_value(key, DataValue::new(value))
    }

    pub fn set_data_value(&self, key: &str, value: DataValue) -> NodeId {
        self.values.write().insert(key.to_string(), value);
        self.node_id(key)
    }

    pub fn value(&self, key: &str) -> Option<DataValue> {
        self.values.read().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<DataValue> {
        self.values.write().remove(key)
    }
}

impl NamespaceProvider for MemoryNamespace {
    fn attribute(&self, node: &NodeId, attribute: AttributeId) -> Result<DataValue> {
        let key = match node {
            NodeId::String { namespace, id } if *namespace == self.index => id,
            _ => return Err(EngineError::NodeNotFound(node.clone())),
        };
        if attribute != AttributeId::VALUE {
            return Err(EngineError::AttributeNotSupported {
                node: node.clone(),
                attribute,
            });
        }
        self.values
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::NodeNotFound(node.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_namespace_reads_value() {
        let ns = MemoryNamespace::new(2);
        let node = ns.set_value("Pump.Speed", 1450i32);

        let dv = ns.attribute(&node, AttributeId::VALUE).unwrap();
        assert_eq!(dv.value, Some(Variant::Int32(1450)));
    }

    #[test]
    fn test_memory_namespace_rejects_other_attributes() {
        let ns = MemoryNamespace::new(2);
        let node = ns.set_value("Pump.Speed", 1450i32);

        let result = ns.attribute(&node, AttributeId::DISPLAY_NAME);
        assert!(matches!(result, Err(EngineError::AttributeNotSupported { .. })));
    }

    #[test]
    fn test_memory_namespace_unknown_key() {
        let ns = MemoryNamespace::new(2);
        let result = ns.attribute(&ns.node_id("missing"), AttributeId::VALUE);
        assert!(matches!(result, Err(EngineError::NodeNotFound(_))));
    }

    #[test]
    fn test_router_dispatches_by_namespace_index() {
        let router = NamespaceRouter::new();
        let plant = Arc::new(MemoryNamespace::new(2));
        plant.set_value("Valve.Open", true);
        router.register(2, plant.clone());

        let dv = router.attribute(&plant.node_id("Valve.Open"), AttributeId::VALUE).unwrap();
        assert_eq!(dv.value, Some(Variant::Boolean(true)));

        let result = router.attribute(&NodeId::string(5, "Valve.Open"), AttributeId::VALUE);
        assert!(matches!(result, Err(EngineError::NamespaceNotFound(5))));

        assert!(router.unregister(2));
        assert!(router.attribute(&plant.node_id("Valve.Open"), AttributeId::VALUE).is_err());
    }
}
