//! Monitored item registry and change fan-out.

use crate::error::{EngineError, Result};
use crate::messages::{
    MonitoredItemCreateRequest, MonitoredItemCreateResult, MonitoredItemNotification, ReadValueId,
};
use crate::namespace::NamespaceProvider;
use crate::subscriptions::SubscriptionRegistry;
use crate::types::{
    AuthToken, DataValue, IdGenerator, MonitoredItemId, MonitoringMode, NodeId, StatusCode,
    SubscriptionId, Timestamp,
};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, warn};

use super::types::{ItemIndex, MonitoredItem};

/// Queue size reported for every item. Queued retransmission is not
/// supported, so only the latest value per item is kept.
const REVISED_QUEUE_SIZE: u32 = 1;

/// Status carried by a notification whose value could not be read.
fn read_failure_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::NodeNotFound(_) | EngineError::NamespaceNotFound(_) => {
            StatusCode::BAD_NODE_ID_UNKNOWN
        }
        EngineError::AttributeNotSupported { .. } => StatusCode::BAD_ATTRIBUTE_ID_INVALID,
        _ => StatusCode::BAD,
    }
}

/// Owns every monitored item.
///
/// Subscriptions are referenced by id and looked up through the
/// [`SubscriptionRegistry`] when needed.
pub struct MonitoredItemRegistry {
    index: RwLock<ItemIndex>,
    ids: IdGenerator,
    provider: Arc<dyn NamespaceProvider>,
    subscriptions: Weak<SubscriptionRegistry>,
    initial_value_fetch: bool,
}

impl MonitoredItemRegistry {
    pub(crate) fn new(
        provider: Arc<dyn NamespaceProvider>,
        subscriptions: Weak<SubscriptionRegistry>,
        initial_value_fetch: bool,
    ) -> Self {
        Self {
            index: RwLock::new(ItemIndex::default()),
            ids: IdGenerator::new(),
            provider,
            subscriptions,
            initial_value_fetch,
        }
    }

    /// Register items under a subscription the caller owns.
    ///
    /// An unknown subscription or a foreign owner fails the whole call and
    /// registers nothing. Each registered node then gets an initial value
    /// pushed from a background thread.
    pub fn create_monitored_items(
        self: &Arc<Self>,
        subscription_id: SubscriptionId,
        token: &AuthToken,
        requests: &[MonitoredItemCreateRequest],
    ) -> Result<Vec<MonitoredItemCreateResult>> {
        let subscriptions = self
            .subscriptions
            .upgrade()
            .ok_or(EngineError::SubscriptionNotFound(subscription_id))?;
        let subscription = subscriptions
            .get(subscription_id)
            .ok_or(EngineError::SubscriptionNotFound(subscription_id))?;
        if subscription.session != *token {
            return Err(EngineError::SessionMismatch {
                subscription: subscription_id,
            });
        }

        let revised_sampling_interval = subscription.parameters.publishing_interval;
        let mut results = Vec::with_capacity(requests.len());
        let mut nodes = Vec::new();
        {
            let mut index = self.index.write();
            for request in requests {
                let item = MonitoredItem {
                    id: MonitoredItemId(self.ids.next_id()),
                    subscription_id,
                    session: subscription.session,
                    item_to_monitor: request.item_to_monitor.clone(),
                    client_handle: request.requested_parameters.client_handle,
                    mode: request.monitoring_mode,
                    created: Timestamp::now(),
                };
                debug!(
                    item_id = %item.id,
                    subscription_id = %subscription_id,
                    node_id = %item.node_id(),
                    client_handle = item.client_handle,
                    "Monitored item created"
                );
                results.push(MonitoredItemCreateResult {
                    status_code: StatusCode::GOOD,
                    monitored_item_id: item.id,
                    revised_sampling_interval,
                    revised_queue_size: REVISED_QUEUE_SIZE,
                });
                nodes.push(item.node_id().clone());
                index.insert(item);
            }
        }

        // The subscription may have been deleted while the items went in.
        if !subscriptions.contains(subscription_id) {
            self.delete_sub(subscription_id);
            return Err(EngineError::SubscriptionNotFound(subscription_id));
        }

        if self.initial_value_fetch && !nodes.is_empty() {
            self.fetch_initial_values(nodes);
        }
        Ok(results)
    }

    fn fetch_initial_values(self: &Arc<Self>, nodes: Vec<NodeId>) {
        let mut seen = HashSet::new();
        let nodes: Vec<NodeId> = nodes.into_iter().filter(|n| seen.insert(n.clone())).collect();

        let registry = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("ua-initial-values".to_string())
            .spawn(move || {
                for node in &nodes {
                    registry.change_notification(node);
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Unable to schedule initial value fetch");
        }
    }

    /// Delete the items `token` owns.
    ///
    /// Each id gets its own status. Removal has completed by the time this
    /// returns.
    pub fn delete_monitored_items(&self, ids: &[MonitoredItemId], token: &AuthToken) -> Vec<StatusCode> {
        let (results, doomed) = self.check_owner(ids, token);
        for id in doomed {
            self.delete_monitored_item(id);
        }
        results
    }

    /// Remove one item from all indices. Unknown ids are ignored.
    pub fn delete_monitored_item(&self, id: MonitoredItemId) -> bool {
        let removed = self.index.write().remove(id);
        match removed {
            Some(item) => {
                debug!(item_id = %id, subscription_id = %item.subscription_id, "Monitored item deleted");
                true
            }
            None => false,
        }
    }

    /// Remove every item of a subscription. Returns how many were removed.
    pub fn delete_sub(&self, subscription_id: SubscriptionId) -> usize {
        let ids = self.index.write().take_subscription(subscription_id);
        ids.into_iter()
            .filter(|id| self.delete_monitored_item(*id))
            .count()
    }

    /// Read the current value of every item watching `node` and queue a
    /// notification on each owning subscription.
    ///
    /// A failed read still produces a notification, carrying a bad status.
    /// Sending blocks while a subscription's notification queue is full.
    /// Returns the number of notifications queued.
    pub fn change_notification(&self, node: &NodeId) -> usize {
        let targets: Vec<(SubscriptionId, MonitoredItemId, u32, ReadValueId)> = {
            let index = self.index.read();
            match index.by_node.get(node) {
                Some(bucket) => bucket
                    .iter()
                    .filter_map(|id| index.items.get(id))
                    .map(|item| {
                        (
                            item.subscription_id,
                            item.id,
                            item.client_handle,
                            item.item_to_monitor.clone(),
                        )
                    })
                    .collect(),
                None => return 0,
            }
        };

        let Some(subscriptions) = self.subscriptions.upgrade() else {
            return 0;
        };

        let mut delivered = 0;
        for (subscription_id, item_id, client_handle, read) in targets {
            let value = match self.provider.attribute(&read.node_id, read.attribute_id) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        item_id = %item_id,
                        node_id = %read.node_id,
                        error = %e,
                        "Unable to read monitored value"
                    );
                    DataValue::bad(read_failure_status(&e))
                }
            };

            let Some(notifier) = subscriptions.notifier(subscription_id) else {
                continue;
            };
            let notification = MonitoredItemNotification { client_handle, value };
            if notifier.send(notification).is_ok() {
                delivered += 1;
            }
        }

        debug!(node_id = %node, delivered, "Change notification");
        delivered
    }

    /// Record a monitoring mode on the items `token` owns.
    ///
    /// The mode is stored only; sampling and reporting do not consult it.
    pub fn set_monitoring_mode(
        &self,
        ids: &[MonitoredItemId],
        token: &AuthToken,
        mode: MonitoringMode,
    ) -> Vec<StatusCode> {
        let mut index = self.index.write();
        ids.iter()
            .map(|id| match index.items.get_mut(id) {
                None => StatusCode::BAD_MONITORED_ITEM_ID_INVALID,
                Some(item) if item.session != *token => StatusCode::BAD_SESSION_ID_INVALID,
                Some(item) => {
                    item.mode = mode;
                    StatusCode::GOOD
                }
            })
            .collect()
    }

    fn check_owner(&self, ids: &[MonitoredItemId], token: &AuthToken) -> (Vec<StatusCode>, Vec<MonitoredItemId>) {
        let index = self.index.read();
        let mut results = Vec::with_capacity(ids.len());
        let mut owned = Vec::new();
        for id in ids {
            match index.items.get(id) {
                None => results.push(StatusCode::BAD_MONITORED_ITEM_ID_INVALID),
                Some(item) if item.session != *token => results.push(StatusCode::BAD_SESSION_ID_INVALID),
                Some(_) => {
                    results.push(StatusCode::GOOD);
                    owned.push(*id);
                }
            }
        }
        (results, owned)
    }

    pub fn get(&self, id: MonitoredItemId) -> Option<MonitoredItem> {
        self.index.read().items.get(&id).cloned()
    }

    pub fn items_for_node(&self, node: &NodeId) -> Vec<MonitoredItem> {
        let index = self.index.read();
        let mut items: Vec<_> = index
            .by_node
            .get(node)
            .into_iter()
            .flatten()
            .filter_map(|id| index.items.get(id).cloned())
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn items_for_subscription(&self, subscription_id: SubscriptionId) -> Vec<MonitoredItem> {
        let index = self.index.read();
        let mut items: Vec<_> = index
            .by_subscription
            .get(&subscription_id)
            .into_iter()
            .flatten()
            .filter_map(|id| index.items.get(id).cloned())
            .collect();
        items.sort_by_key(|item| item.id);
        items
    }

    pub fn len(&self) -> usize {
        self.index.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().items.is_empty()
    }

    /// Whether the id, node and subscription indices agree.
    pub fn is_consistent(&self) -> bool {
        self.index.read().is_consistent()
    }
}
