//! Subscription service facade.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::messages::{
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSubscriptionRequest,
    CreateSubscriptionResponse, DeleteMonitoredItemsRequest, DeleteMonitoredItemsResponse,
    DeleteSubscriptionsRequest, DeleteSubscriptionsResponse, PublishRequest, PublishResponse,
    Request, RequestHeader, Response, ResponseHeader, ServiceFault, SetMonitoringModeRequest,
    SetMonitoringModeResponse,
};
use crate::monitored_items::MonitoredItemRegistry;
use crate::namespace::NamespaceProvider;
use crate::sessions::{PublishRequestEnvelope, Session, SessionRegistry};
use crate::subscriptions::{SubscriptionParameters, SubscriptionRegistry};
use crate::transport::Transport;
use crate::types::{AuthToken, NodeId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    pub sessions: usize,
    pub subscriptions: usize,
    pub monitored_items: usize,
}

/// The subscription and monitored-item services of one server.
///
/// Owns the three registries. Responses to publish requests are delivered
/// later through the [`Transport`]; every other operation answers directly.
pub struct SubscriptionServer {
    config: EngineConfig,
    sessions: Arc<SessionRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl SubscriptionServer {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn NamespaceProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(config.publish_request_queue_capacity));
        let subscriptions =
            SubscriptionRegistry::new(config.clone(), Arc::clone(&sessions), provider, transport);
        info!(
            publish_queue = config.publish_request_queue_capacity,
            notification_queue = config.notification_queue_capacity,
            "Subscription server started"
        );
        Self {
            config,
            sessions,
            subscriptions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
        &self.subscriptions
    }

    pub fn monitored_items(&self) -> &Arc<MonitoredItemRegistry> {
        self.subscriptions.monitored_items()
    }

    // --- Sessions ---

    pub fn create_session(&self) -> Arc<Session> {
        self.sessions.new_session()
    }

    /// Close a session. Its subscriptions stop once they next wait for a
    /// publish request and the last handle to the session is gone.
    pub fn close_session(&self, token: &AuthToken) -> bool {
        self.sessions.close(token)
    }

    pub fn resolve_session(&self, header: &RequestHeader) -> Option<Arc<Session>> {
        self.sessions.resolve(header)
    }

    // --- Dispatch ---

    /// Handle one decoded request.
    ///
    /// Returns `Ok(None)` for a publish request that was queued; its answer
    /// arrives through the transport. Unsupported services are answered
    /// with a service fault.
    pub fn handle(&self, request: Request, request_id: u32) -> Result<Option<Response>> {
        debug!(
            service = request.service_name(),
            request_id,
            request_handle = request.header().request_handle,
            "Handling request"
        );

        let response = match request {
            Request::CreateSubscription(r) => Response::CreateSubscription(self.create_subscription(&r)?),
            Request::Publish(r) => return Ok(self.publish(r, request_id).map(Response::Publish)),
            Request::DeleteSubscriptions(r) => Response::DeleteSubscriptions(self.delete_subscriptions(&r)?),
            Request::CreateMonitoredItems(r) => {
                Response::CreateMonitoredItems(self.create_monitored_items(&r)?)
            }
            Request::SetMonitoringMode(r) => Response::SetMonitoringMode(self.set_monitoring_mode(&r)?),
            Request::DeleteMonitoredItems(r) => {
                Response::DeleteMonitoredItems(self.delete_monitored_items(&r)?)
            }
            Request::ModifySubscription(header)
            | Request::SetPublishingMode(header)
            | Request::Republish(header)
            | Request::TransferSubscriptions(header)
            | Request::ModifyMonitoredItems(header)
            | Request::SetTriggering(header) => Response::ServiceFault(ServiceFault::unsupported(&header)),
        };
        Ok(Some(response))
    }

    // --- Subscription services ---

    pub fn create_subscription(&self, request: &CreateSubscriptionRequest) -> Result<CreateSubscriptionResponse> {
        let info = self.subscriptions.create_subscription(
            &request.header.authentication_token,
            SubscriptionParameters {
                publishing_interval: request.requested_publishing_interval,
                lifetime_count: request.requested_lifetime_count,
                max_keep_alive_count: request.requested_max_keep_alive_count,
            },
        )?;
        Ok(CreateSubscriptionResponse {
            header: ResponseHeader::good(&request.header),
            subscription_id: info.id,
            revised_publishing_interval: info.parameters.publishing_interval,
            revised_lifetime_count: info.parameters.lifetime_count,
            revised_max_keep_alive_count: info.parameters.max_keep_alive_count,
        })
    }

    /// Queue a publish request. Only an unknown session is answered
    /// immediately.
    pub fn publish(&self, request: PublishRequest, request_id: u32) -> Option<PublishResponse> {
        self.subscriptions
            .publish(PublishRequestEnvelope { request, request_id })
    }

    pub fn delete_subscriptions(&self, request: &DeleteSubscriptionsRequest) -> Result<DeleteSubscriptionsResponse> {
        let token = self.caller(&request.header)?;
        let results = self
            .subscriptions
            .delete_subscriptions(&request.subscription_ids, &token);
        Ok(DeleteSubscriptionsResponse {
            header: ResponseHeader::good(&request.header),
            results,
        })
    }

    // --- Monitored item services ---

    pub fn create_monitored_items(
        &self,
        request: &CreateMonitoredItemsRequest,
    ) -> Result<CreateMonitoredItemsResponse> {
        let token = self.caller(&request.header)?;
        let results = self.monitored_items().create_monitored_items(
            request.subscription_id,
            &token,
            &request.items_to_create,
        )?;
        Ok(CreateMonitoredItemsResponse {
            header: ResponseHeader::good(&request.header),
            results,
        })
    }

    pub fn set_monitoring_mode(&self, request: &SetMonitoringModeRequest) -> Result<SetMonitoringModeResponse> {
        let token = self.caller(&request.header)?;
        let results = self.monitored_items().set_monitoring_mode(
            &request.monitored_item_ids,
            &token,
            request.monitoring_mode,
        );
        Ok(SetMonitoringModeResponse {
            header: ResponseHeader::good(&request.header),
            results,
        })
    }

    pub fn delete_monitored_items(
        &self,
        request: &DeleteMonitoredItemsRequest,
    ) -> Result<DeleteMonitoredItemsResponse> {
        let token = self.caller(&request.header)?;
        let results = self
            .monitored_items()
            .delete_monitored_items(&request.monitored_item_ids, &token);
        Ok(DeleteMonitoredItemsResponse {
            header: ResponseHeader::good(&request.header),
            results,
        })
    }

    // --- Data changes ---

    /// Push the current value of `node` to every subscription monitoring it.
    ///
    /// Blocks while a receiving subscription's notification queue is full.
    pub fn change_notification(&self, node: &NodeId) -> usize {
        self.monitored_items().change_notification(node)
    }

    // --- Server operations ---

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.sessions.len(),
            subscriptions: self.subscriptions.len(),
            monitored_items: self.monitored_items().len(),
        }
    }

    /// Delete every subscription and close every session.
    pub fn shutdown(&self) -> ServerStats {
        let stopped = ServerStats {
            monitored_items: self.monitored_items().len(),
            subscriptions: self.subscriptions.shutdown(),
            sessions: self.sessions.close_all(),
        };
        if stopped != ServerStats::default() {
            info!(
                sessions = stopped.sessions,
                subscriptions = stopped.subscriptions,
                monitored_items = stopped.monitored_items,
                "Subscription server shut down"
            );
        }
        stopped
    }

    fn caller(&self, header: &RequestHeader) -> Result<AuthToken> {
        self.sessions
            .resolve(header)
            .map(|session| session.auth_token)
            .ok_or(EngineError::SessionNotFound(header.authentication_token))
    }
}

impl Drop for SubscriptionServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::MemoryNamespace;
    use crate::types::StatusCode;

    struct NullTransport;

    impl Transport for NullTransport {
        fn send(&self, _request_id: u32, _response: Response) -> Result<()> {
            Ok(())
        }
    }

    fn server() -> SubscriptionServer {
        SubscriptionServer::new(
            EngineConfig::default(),
            Arc::new(MemoryNamespace::new(1)),
            Arc::new(NullTransport),
        )
    }

    #[test]
    fn test_unsupported_services_fault() {
        let server = server();
        let session = server.create_session();
        let header = RequestHeader::new(session.auth_token, 11);

        for request in [
            Request::ModifySubscription(header.clone()),
            Request::SetPublishingMode(header.clone()),
            Request::Republish(header.clone()),
            Request::TransferSubscriptions(header.clone()),
            Request::ModifyMonitoredItems(header.clone()),
            Request::SetTriggering(header.clone()),
        ] {
            let response = server.handle(request, 1).unwrap().unwrap();
            assert!(matches!(response, Response::ServiceFault(_)));
            assert_eq!(response.header().service_result, StatusCode::BAD_SERVICE_UNSUPPORTED);
            assert_eq!(response.header().request_handle, 11);
        }
    }

    #[test]
    fn test_create_subscription_echoes_request() {
        let server = server();
        let session = server.create_session();
        let request = CreateSubscriptionRequest {
            header: RequestHeader::new(session.auth_token, 5),
            requested_publishing_interval: 500.0,
            requested_lifetime_count: 30,
            requested_max_keep_alive_count: 10,
        };

        let response = match server.handle(Request::CreateSubscription(request), 1).unwrap() {
            Some(Response::CreateSubscription(r)) => r,
            other => panic!("unexpected response: {:?}", other),
        };
        assert_eq!(response.header.request_handle, 5);
        assert!(response.header.service_result.is_good());
        assert_eq!(response.revised_publishing_interval, 500.0);
        assert_eq!(response.revised_lifetime_count, 30);
        assert_eq!(response.revised_max_keep_alive_count, 10);
        assert!(server.subscriptions().contains(response.subscription_id));
    }

    #[test]
    fn test_unknown_session_is_request_level_error() {
        let server = server();
        let request = DeleteSubscriptionsRequest {
            header: RequestHeader::new(AuthToken::random(), 1),
            subscription_ids: vec![],
        };
        let result = server.handle(Request::DeleteSubscriptions(request), 1);
        assert!(matches!(result, Err(EngineError::SessionNotFound(_))));
    }

    #[test]
    fn test_publish_on_known_session_is_deferred() {
        let server = server();
        let session = server.create_session();
        let request = PublishRequest::new(RequestHeader::new(session.auth_token, 2));
        assert!(server.handle(Request::Publish(request), 9).unwrap().is_none());

        let stray = PublishRequest::new(RequestHeader::new(AuthToken::random(), 3));
        match server.handle(Request::Publish(stray), 10).unwrap() {
            Some(Response::Publish(r)) => {
                assert_eq!(r.header.service_result, StatusCode::BAD_SESSION_ID_INVALID)
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_shutdown_clears_registries() {
        let server = server();
        let session = server.create_session();
        server
            .create_subscription(&CreateSubscriptionRequest {
                header: RequestHeader::new(session.auth_token, 1),
                requested_publishing_interval: 1000.0,
                requested_lifetime_count: 10,
                requested_max_keep_alive_count: 3,
            })
            .unwrap();

        let stopped = server.shutdown();
        assert_eq!(stopped.sessions, 1);
        assert_eq!(stopped.subscriptions, 1);
        assert_eq!(server.stats(), ServerStats::default());
    }
}
