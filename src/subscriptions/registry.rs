//! Subscription registry.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::messages::{MonitoredItemNotification, PublishResponse};
use crate::monitored_items::MonitoredItemRegistry;
use crate::namespace::NamespaceProvider;
use crate::sessions::{PublishRequestEnvelope, SessionRegistry};
use crate::transport::Transport;
use crate::types::{AuthToken, IdGenerator, StatusCode, SubscriptionId, Timestamp};
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::engine::PublishEngine;
use super::types::{SubscriptionInfo, SubscriptionParameters};
use super::worker::{self, WorkerChannels};

/// Registry-side state of a subscription. The worker thread only holds the
/// receiving ends of its channels.
struct Subscription {
    id: SubscriptionId,
    session: AuthToken,
    parameters: SubscriptionParameters,
    created: Timestamp,
    running: bool,
    /// Dropping the sender is the shutdown signal.
    shutdown: Option<Sender<()>>,
    notifications: Sender<MonitoredItemNotification>,
    modifications: Sender<SubscriptionParameters>,
}

impl Subscription {
    /// Fire the shutdown signal. Only the first call has an effect.
    fn stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.shutdown.take();
        true
    }

    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            session: self.session,
            parameters: self.parameters,
            running: self.running,
            created: self.created,
        }
    }
}

/// Owns every subscription and starts its worker.
///
/// Deleting a subscription cascades into the [`MonitoredItemRegistry`] it
/// owns. Neither registry ever calls into the other while holding its own
/// lock.
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    ids: IdGenerator,
    sessions: Arc<SessionRegistry>,
    items: Arc<MonitoredItemRegistry>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    /// Handed to workers so they can deregister themselves.
    self_ref: Weak<SubscriptionRegistry>,
}

impl SubscriptionRegistry {
    pub fn new(
        config: EngineConfig,
        sessions: Arc<SessionRegistry>,
        provider: Arc<dyn NamespaceProvider>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref: &Weak<Self>| {
            let items = Arc::new(MonitoredItemRegistry::new(
                provider,
                self_ref.clone(),
                config.initial_value_fetch,
            ));
            Self {
                subscriptions: RwLock::new(HashMap::new()),
                ids: IdGenerator::new(),
                sessions,
                items,
                transport,
                config,
                self_ref: self_ref.clone(),
            }
        })
    }

    /// The monitored-item registry whose items cascade with subscriptions.
    pub fn monitored_items(&self) -> &Arc<MonitoredItemRegistry> {
        &self.items
    }

    /// Create a subscription for the session owning `token` and start its
    /// worker. The requested parameters are used as the revised ones.
    pub fn create_subscription(
        &self,
        token: &AuthToken,
        requested: SubscriptionParameters,
    ) -> Result<SubscriptionInfo> {
        let session = self
            .sessions
            .session(token)
            .ok_or(EngineError::SessionNotFound(*token))?;

        let id = SubscriptionId(self.ids.next_id());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (notify_tx, notify_rx) = bounded(self.config.notification_queue_capacity.max(1));
        let (modify_tx, modify_rx) = bounded(self.config.modify_queue_capacity.max(1));

        let subscription = Subscription {
            id,
            session: session.auth_token,
            parameters: requested,
            created: Timestamp::now(),
            running: true,
            shutdown: Some(shutdown_tx),
            notifications: notify_tx,
            modifications: modify_tx,
        };
        let info = subscription.info();

        let channels = WorkerChannels {
            shutdown: shutdown_rx,
            notifications: notify_rx,
            modifications: modify_rx,
            publish_requests: session.publish_queue(),
        };
        let tick_period = self.config.tick_period(requested.publishing_interval);

        // Register before the worker runs so that an immediate exit finds
        // the entry to remove.
        let mut subs = self.subscriptions.write();
        subs.insert(id, subscription);
        if let Err(e) = worker::spawn(
            PublishEngine::new(id, requested),
            id,
            tick_period,
            channels,
            Arc::clone(&self.transport),
            self.self_ref.clone(),
        ) {
            subs.remove(&id);
            return Err(e.into());
        }
        drop(subs);

        info!(
            subscription_id = %id,
            token = %session.auth_token,
            publishing_interval = requested.publishing_interval,
            lifetime_count = requested.lifetime_count,
            max_keep_alive_count = requested.max_keep_alive_count,
            "New subscription"
        );
        Ok(info)
    }

    /// Stop a subscription's worker, forget it and delete its monitored
    /// items. Safe to call more than once.
    pub fn delete_subscription(&self, id: SubscriptionId) -> bool {
        let removed = {
            let mut subs = self.subscriptions.write();
            subs.remove(&id).map(|mut sub| {
                sub.stop();
                sub
            })
        };
        let existed = removed.is_some();
        drop(removed);

        let items = self.items.delete_sub(id);
        if existed {
            info!(subscription_id = %id, items, "Subscription deleted");
        }
        existed
    }

    /// Delete the subscriptions `token` owns.
    ///
    /// Each id gets its own status; a bad id does not affect the others.
    /// Deletion has completed by the time this returns.
    pub fn delete_subscriptions(&self, ids: &[SubscriptionId], token: &AuthToken) -> Vec<StatusCode> {
        let mut results = Vec::with_capacity(ids.len());
        let mut doomed = Vec::new();
        {
            let subs = self.subscriptions.read();
            for id in ids {
                match subs.get(id) {
                    None => results.push(StatusCode::BAD_SUBSCRIPTION_ID_INVALID),
                    Some(sub) if sub.session != *token => {
                        results.push(StatusCode::BAD_SESSION_ID_INVALID)
                    }
                    Some(_) => {
                        results.push(StatusCode::GOOD);
                        doomed.push(*id);
                    }
                }
            }
        }

        for id in doomed {
            debug!(subscription_id = %id, "Subscription deleted by client");
            self.delete_subscription(id);
        }
        results
    }

    /// Queue a publish request on the session it was issued on.
    ///
    /// Returns an immediate response only when the session is unknown.
    /// Otherwise a subscription worker answers later through the transport;
    /// a request that does not fit in the session's queue is dropped and
    /// never answered.
    pub fn publish(&self, envelope: PublishRequestEnvelope) -> Option<PublishResponse> {
        let Some(session) = self.sessions.resolve(&envelope.request.header) else {
            return Some(PublishResponse::session_invalid(&envelope.request.header));
        };

        let request_id = envelope.request_id;
        if !session.enqueue_publish(envelope) {
            warn!(
                token = %session.auth_token,
                request_id,
                "Too many publish requests, dropping"
            );
        }
        None
    }

    /// Apply new timing parameters to a running subscription.
    ///
    /// Counter limits take effect at the worker's next event; the tick
    /// period stays what it was at creation.
    pub fn update_parameters(&self, id: SubscriptionId, parameters: SubscriptionParameters) -> Result<()> {
        let modifications = {
            let mut subs = self.subscriptions.write();
            let sub = subs
                .get_mut(&id)
                .ok_or(EngineError::SubscriptionNotFound(id))?;
            sub.parameters = parameters;
            sub.modifications.clone()
        };
        modifications
            .send(parameters)
            .map_err(|_| EngineError::SubscriptionNotFound(id))
    }

    /// Queue for notifications bound to a subscription.
    pub(crate) fn notifier(&self, id: SubscriptionId) -> Option<Sender<MonitoredItemNotification>> {
        self.subscriptions
            .read()
            .get(&id)
            .map(|sub| sub.notifications.clone())
    }

    pub fn get(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.subscriptions.read().get(&id).map(Subscription::info)
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.subscriptions.read().contains_key(&id)
    }

    pub fn ids(&self) -> Vec<SubscriptionId> {
        let mut ids: Vec<_> = self.subscriptions.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.read().is_empty()
    }

    /// Delete every subscription. Workers exit on their own once they
    /// observe the shutdown signal.
    pub fn shutdown(&self) -> usize {
        let ids = self.ids();
        for id in &ids {
            self.delete_subscription(*id);
        }
        ids.len()
    }
}
