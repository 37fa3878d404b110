//! Request and response shapes of the subscription and monitored-item
//! service sets.
//!
//! These are semantic messages; encoding them for the wire is the job of the
//! codec layer that sits in front of the engine.

use crate::types::{
    AttributeId, AuthToken, DataValue, MonitoredItemId, MonitoringMode, NodeId, StatusCode,
    SubscriptionId, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Header common to every request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestHeader {
    pub authentication_token: AuthToken,
    /// Client-chosen handle echoed back in the response header.
    pub request_handle: u32,
    pub timestamp: Timestamp,
}

impl RequestHeader {
    pub fn new(authentication_token: AuthToken, request_handle: u32) -> Self {
        Self {
            authentication_token,
            request_handle,
            timestamp: Timestamp::now(),
        }
    }
}

/// Header common to every response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub timestamp: Timestamp,
    pub request_handle: u32,
    pub service_result: StatusCode,
}

impl ResponseHeader {
    pub fn new(request_handle: u32, service_result: StatusCode) -> Self {
        Self {
            timestamp: Timestamp::now(),
            request_handle,
            service_result,
        }
    }

    pub fn good(request: &RequestHeader) -> Self {
        Self::new(request.request_handle, StatusCode::GOOD)
    }
}

/// Response to a request the engine does not serve.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceFault {
    pub header: ResponseHeader,
}

impl ServiceFault {
    pub fn unsupported(request: &RequestHeader) -> Self {
        Self {
            header: ResponseHeader::new(request.request_handle, StatusCode::BAD_SERVICE_UNSUPPORTED),
        }
    }
}

// --- Subscriptions ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub header: RequestHeader,
    /// Milliseconds.
    pub requested_publishing_interval: f64,
    pub requested_lifetime_count: u32,
    pub requested_max_keep_alive_count: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateSubscriptionResponse {
    pub header: ResponseHeader,
    pub subscription_id: SubscriptionId,
    pub revised_publishing_interval: f64,
    pub revised_lifetime_count: u32,
    pub revised_max_keep_alive_count: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SubscriptionAcknowledgement {
    pub subscription_id: SubscriptionId,
    pub sequence_number: u32,
}

/// Long-poll request answered asynchronously by a subscription worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    pub header: RequestHeader,
    /// Accepted for compatibility. Retransmission is not supported so
    /// acknowledgements have nothing to release.
    pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
}

impl PublishRequest {
    pub fn new(header: RequestHeader) -> Self {
        Self {
            header,
            subscription_acknowledgements: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemNotification {
    pub client_handle: u32,
    pub value: DataValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataChangeNotification {
    pub monitored_items: Vec<MonitoredItemNotification>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationData {
    DataChange(DataChangeNotification),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub sequence_number: u32,
    pub publish_time: Timestamp,
    /// Empty for keep-alive messages.
    pub notification_data: Vec<NotificationData>,
}

impl NotificationMessage {
    pub fn is_keep_alive(&self) -> bool {
        self.notification_data.is_empty()
    }

    /// All monitored-item notifications carried by this message.
    pub fn data_changes(&self) -> impl Iterator<Item = &MonitoredItemNotification> {
        self.notification_data.iter().flat_map(|data| match data {
            NotificationData::DataChange(change) => change.monitored_items.iter(),
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub header: ResponseHeader,
    pub subscription_id: SubscriptionId,
    /// Always empty: sent messages are not kept for republishing.
    pub available_sequence_numbers: Vec<u32>,
    pub more_notifications: bool,
    pub notification_message: NotificationMessage,
    pub results: Vec<StatusCode>,
}

impl PublishResponse {
    /// Immediate answer to a publish request whose session is unknown.
    pub fn session_invalid(request: &RequestHeader) -> Self {
        Self {
            header: ResponseHeader::new(request.request_handle, StatusCode::BAD_SESSION_ID_INVALID),
            subscription_id: SubscriptionId(0),
            available_sequence_numbers: Vec::new(),
            more_notifications: false,
            notification_message: NotificationMessage {
                sequence_number: 0,
                publish_time: Timestamp::now(),
                notification_data: Vec::new(),
            },
            results: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteSubscriptionsRequest {
    pub header: RequestHeader,
    pub subscription_ids: Vec<SubscriptionId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteSubscriptionsResponse {
    pub header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

// --- Monitored items ---

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadValueId {
    pub node_id: NodeId,
    pub attribute_id: AttributeId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringParameters {
    pub client_handle: u32,
    /// Milliseconds. Not honoured: items report at the publishing interval.
    pub sampling_interval: f64,
    pub queue_size: u32,
    pub discard_oldest: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoredItemCreateRequest {
    pub item_to_monitor: ReadValueId,
    pub monitoring_mode: MonitoringMode,
    pub requested_parameters: MonitoringParameters,
}

impl MonitoredItemCreateRequest {
    /// Value-attribute item in reporting mode.
    pub fn value(node_id: NodeId, client_handle: u32) -> Self {
        Self {
            item_to_monitor: ReadValueId {
                node_id,
                attribute_id: AttributeId::VALUE,
            },
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                client_handle,
                sampling_interval: 0.0,
                queue_size: 1,
                discard_oldest: true,
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateMonitoredItemsRequest {
    pub header: RequestHeader,
    pub subscription_id: SubscriptionId,
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    pub status_code: StatusCode,
    pub monitored_item_id: MonitoredItemId,
    pub revised_sampling_interval: f64,
    pub revised_queue_size: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateMonitoredItemsResponse {
    pub header: ResponseHeader,
    pub results: Vec<MonitoredItemCreateResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetMonitoringModeRequest {
    pub header: RequestHeader,
    pub subscription_id: SubscriptionId,
    pub monitoring_mode: MonitoringMode,
    pub monitored_item_ids: Vec<MonitoredItemId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetMonitoringModeResponse {
    pub header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsRequest {
    pub header: RequestHeader,
    pub subscription_id: SubscriptionId,
    pub monitored_item_ids: Vec<MonitoredItemId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsResponse {
    pub header: ResponseHeader,
    pub results: Vec<StatusCode>,
}

// --- Dispatch ---

/// Every request of the two service sets.
///
/// Services the engine does not implement only carry their header; they are
/// answered with [`ServiceFault::unsupported`].
#[derive(Clone, Debug)]
pub enum Request {
    CreateSubscription(CreateSubscriptionRequest),
    ModifySubscription(RequestHeader),
    SetPublishingMode(RequestHeader),
    Publish(PublishRequest),
    Republish(RequestHeader),
    TransferSubscriptions(RequestHeader),
    DeleteSubscriptions(DeleteSubscriptionsRequest),
    CreateMonitoredItems(CreateMonitoredItemsRequest),
    ModifyMonitoredItems(RequestHeader),
    SetMonitoringMode(SetMonitoringModeRequest),
    SetTriggering(RequestHeader),
    DeleteMonitoredItems(DeleteMonitoredItemsRequest),
}

impl Request {
    pub fn header(&self) -> &RequestHeader {
        match self {
            Request::CreateSubscription(r) => &r.header,
            Request::Publish(r) => &r.header,
            Request::DeleteSubscriptions(r) => &r.header,
            Request::CreateMonitoredItems(r) => &r.header,
            Request::SetMonitoringMode(r) => &r.header,
            Request::DeleteMonitoredItems(r) => &r.header,
            Request::ModifySubscription(h)
            | Request::SetPublishingMode(h)
            | Request::Republish(h)
            | Request::TransferSubscriptions(h)
            | Request::ModifyMonitoredItems(h)
            | Request::SetTriggering(h) => h,
        }
    }

    /// Service name for logging.
    pub fn service_name(&self) -> &'static str {
        match self {
            Request::CreateSubscription(_) => "CreateSubscription",
            Request::ModifySubscription(_) => "ModifySubscription",
            Request::SetPublishingMode(_) => "SetPublishingMode",
            Request::Publish(_) => "Publish",
            Request::Republish(_) => "Republish",
            Request::TransferSubscriptions(_) => "TransferSubscriptions",
            Request::DeleteSubscriptions(_) => "DeleteSubscriptions",
            Request::CreateMonitoredItems(_) => "CreateMonitoredItems",
            Request::ModifyMonitoredItems(_) => "ModifyMonitoredItems",
            Request::SetMonitoringMode(_) => "SetMonitoringMode",
            Request::SetTriggering(_) => "SetTriggering",
            Request::DeleteMonitoredItems(_) => "DeleteMonitoredItems",
        }
    }
}

/// Every response the engine produces, including the unsolicited publish
/// responses handed to the transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    CreateSubscription(CreateSubscriptionResponse),
    Publish(PublishResponse),
    DeleteSubscriptions(DeleteSubscriptionsResponse),
    CreateMonitoredItems(CreateMonitoredItemsResponse),
    SetMonitoringMode(SetMonitoringModeResponse),
    DeleteMonitoredItems(DeleteMonitoredItemsResponse),
    ServiceFault(ServiceFault),
}

impl Response {
    pub fn header(&self) -> &ResponseHeader {
        match self {
            Response::CreateSubscription(r) => &r.header,
            Response::Publish(r) => &r.header,
            Response::DeleteSubscriptions(r) => &r.header,
            Response::CreateMonitoredItems(r) => &r.header,
            Response::SetMonitoringMode(r) => &r.header,
            Response::DeleteMonitoredItems(r) => &r.header,
            Response::ServiceFault(r) => &r.header,
        }
    }
}
