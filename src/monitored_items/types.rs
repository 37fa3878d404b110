//! Monitored item types and the three-way item index.

use crate::messages::ReadValueId;
use crate::types::{AuthToken, MonitoredItemId, MonitoringMode, NodeId, SubscriptionId, Timestamp};
use std::collections::HashMap;

/// A (node, attribute) data point registered under a subscription.
#[derive(Clone, Debug)]
pub struct MonitoredItem {
    pub id: MonitoredItemId,
    pub subscription_id: SubscriptionId,
    /// Token of the session that owns the subscription.
    pub session: AuthToken,
    pub item_to_monitor: ReadValueId,
    pub client_handle: u32,
    /// Recorded only; sampling and reporting ignore it.
    pub mode: MonitoringMode,
    pub created: Timestamp,
}

impl MonitoredItem {
    pub fn node_id(&self) -> &NodeId {
        &self.item_to_monitor.node_id
    }
}

/// Items by id, by node and by subscription.
///
/// Every id in `items` appears in exactly one `by_node` bucket and exactly
/// one `by_subscription` bucket. Buckets are never left empty.
#[derive(Debug, Default)]
pub(crate) struct ItemIndex {
    pub(crate) items: HashMap<MonitoredItemId, MonitoredItem>,
    pub(crate) by_node: HashMap<NodeId, Vec<MonitoredItemId>>,
    pub(crate) by_subscription: HashMap<SubscriptionId, Vec<MonitoredItemId>>,
}

impl ItemIndex {
    pub(crate) fn insert(&mut self, item: MonitoredItem) {
        self.by_node
            .entry(item.node_id().clone())
            .or_default()
            .push(item.id);
        self.by_subscription
            .entry(item.subscription_id)
            .or_default()
            .push(item.id);
        self.items.insert(item.id, item);
    }

    /// Remove an item from all three indices. Missing ids or buckets are
    /// skipped silently.
    pub(crate) fn remove(&mut self, id: MonitoredItemId) -> Option<MonitoredItem> {
        let item = self.items.remove(&id)?;

        if let Some(bucket) = self.by_node.get_mut(item.node_id()) {
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.by_node.remove(item.node_id());
            }
        }

        if let Some(bucket) = self.by_subscription.get_mut(&item.subscription_id) {
            bucket.retain(|other| *other != id);
            if bucket.is_empty() {
                self.by_subscription.remove(&item.subscription_id);
            }
        }

        Some(item)
    }

    /// Detach and return a subscription's bucket.
    pub(crate) fn take_subscription(&mut self, id: SubscriptionId) -> Vec<MonitoredItemId> {
        self.by_subscription.remove(&id).unwrap_or_default()
    }

    /// Whether the three indices agree.
    pub(crate) fn is_consistent(&self) -> bool {
        let mut node_count = 0;
        for (node, bucket) in &self.by_node {
            if bucket.is_empty() {
                return false;
            }
            for id in bucket {
                match self.items.get(id) {
                    Some(item) if item.node_id() == node => node_count += 1,
                    _ => return false,
                }
            }
        }

        let mut sub_count = 0;
        for (sub, bucket) in &self.by_subscription {
            if bucket.is_empty() {
                return false;
            }
            for id in bucket {
                match self.items.get(id) {
                    Some(item) if item.subscription_id == *sub => sub_count += 1,
                    _ => return false,
                }
            }
        }

        node_count == self.items.len() && sub_count == self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttributeId;
    use proptest::prelude::*;

    fn make_item(id: u32, sub: u32, node: u32) -> MonitoredItem {
        MonitoredItem {
            id: MonitoredItemId(id),
            subscription_id: SubscriptionId(sub),
            session: AuthToken(uuid::Uuid::nil()),
            item_to_monitor: ReadValueId {
                node_id: NodeId::numeric(1, node),
                attribute_id: AttributeId::VALUE,
            },
            client_handle: id,
            mode: MonitoringMode::Reporting,
            created: Timestamp::now(),
        }
    }

    #[test]
    fn test_insert_indexes_three_ways() {
        let mut index = ItemIndex::default();
        index.insert(make_item(1, 10, 100));
        index.insert(make_item(2, 10, 100));
        index.insert(make_item(3, 11, 101));

        assert_eq!(index.by_node[&NodeId::numeric(1, 100)].len(), 2);
        assert_eq!(index.by_subscription[&SubscriptionId(10)].len(), 2);
        assert_eq!(index.by_subscription[&SubscriptionId(11)].len(), 1);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_remove_prunes_empty_buckets() {
        let mut index = ItemIndex::default();
        index.insert(make_item(1, 10, 100));
        index.insert(make_item(2, 11, 100));

        assert!(index.remove(MonitoredItemId(1)).is_some());
        assert!(!index.by_subscription.contains_key(&SubscriptionId(10)));
        assert_eq!(index.by_node[&NodeId::numeric(1, 100)], vec![MonitoredItemId(2)]);

        assert!(index.remove(MonitoredItemId(2)).is_some());
        assert!(index.by_node.is_empty());
        assert!(index.by_subscription.is_empty());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut index = ItemIndex::default();
        index.insert(make_item(1, 10, 100));
        assert!(index.remove(MonitoredItemId(1)).is_some());
        assert!(index.remove(MonitoredItemId(1)).is_none());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_take_subscription_then_remove() {
        let mut index = ItemIndex::default();
        index.insert(make_item(1, 10, 100));
        index.insert(make_item(2, 10, 101));

        let ids = index.take_subscription(SubscriptionId(10));
        assert_eq!(ids.len(), 2);
        for id in ids {
            index.remove(id);
        }
        assert!(index.items.is_empty());
        assert!(index.by_node.is_empty());
        assert!(index.is_consistent());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Create { sub: u32, node: u32 },
        Delete { id: u32 },
        DeleteSub { sub: u32 },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..4, 0u32..5).prop_map(|(sub, node)| Op::Create { sub, node }),
            (1u32..40).prop_map(|id| Op::Delete { id }),
            (0u32..4).prop_map(|sub| Op::DeleteSub { sub }),
        ]
    }

    proptest! {
        #[test]
        fn prop_indices_stay_consistent(ops in prop::collection::vec(op_strategy(), 0..80)) {
            let mut index = ItemIndex::default();
            let mut next_id = 0;
            for op in ops {
                match op {
                    Op::Create { sub, node } => {
                        next_id += 1;
                        index.insert(make_item(next_id, sub, node));
                    }
                    Op::Delete { id } => {
                        index.remove(MonitoredItemId(id));
                    }
                    Op::DeleteSub { sub } => {
                        for id in index.take_subscription(SubscriptionId(sub)) {
                            index.remove(id);
                        }
                    }
                }
                prop_assert!(index.is_consistent());
            }
        }
    }
}
