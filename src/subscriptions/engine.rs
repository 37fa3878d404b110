//! Publish engine state machine.
//!
//! The engine owns the per-subscription step state (pending notifications,
//! counters, sequence number) and advances on one event at a time. It never
//! waits; the worker thread does the waiting and feeds it events, which keeps
//! every transition testable without a live timer.

use crate::error::Result;
use crate::messages::{
    DataChangeNotification, MonitoredItemNotification, NotificationData, NotificationMessage,
    PublishResponse, ResponseHeader,
};
use crate::sessions::PublishRequestEnvelope;
use crate::types::{SubscriptionId, Timestamp};
use crossbeam_channel::TryRecvError;
use std::collections::HashMap;
use tracing::{debug, error, warn};

use super::types::{StopReason, SubscriptionParameters};

/// Where the worker currently is.
#[derive(Debug)]
pub(crate) enum EngineState {
    /// Waiting for the interval tick.
    CollectingTick,
    /// Data is pending; waiting for a publish request.
    CollectingRequest,
    /// Flushing pending data to the captured request.
    Sending(PublishRequestEnvelope),
    Stopped(StopReason),
}

/// Something the worker observed at a wait point.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Shutdown,
    SessionClosed,
    Tick,
    Notification(MonitoredItemNotification),
    Modify(SubscriptionParameters),
    PublishRequest(PublishRequestEnvelope),
}

/// The engine's view of the outside world.
pub(crate) trait PublishIo {
    /// Take one queued publish request without waiting.
    fn try_next_request(&mut self) -> std::result::Result<PublishRequestEnvelope, TryRecvError>;

    /// Deliver a publish response.
    fn send(&mut self, request_id: u32, response: PublishResponse) -> Result<()>;
}

/// Sequence number following `current`. 0 is reserved and skipped.
pub(crate) fn next_sequence_number(current: u32) -> u32 {
    match current.wrapping_add(1) {
        0 => 1,
        n => n,
    }
}

pub(crate) struct PublishEngine {
    subscription_id: SubscriptionId,
    parameters: SubscriptionParameters,
    sequence_number: u32,
    keep_alive_counter: u32,
    lifetime_counter: u32,
    /// Pending notifications by client handle.
    pending: HashMap<u32, MonitoredItemNotification>,
}

impl PublishEngine {
    pub(crate) fn new(subscription_id: SubscriptionId, parameters: SubscriptionParameters) -> Self {
        Self {
            subscription_id,
            parameters,
            sequence_number: 0,
            keep_alive_counter: 0,
            lifetime_counter: 0,
            pending: HashMap::new(),
        }
    }

    /// Advance from a waiting state on one event.
    pub(crate) fn step(
        &mut self,
        state: EngineState,
        event: WorkerEvent,
        io: &mut impl PublishIo,
    ) -> EngineState {
        match state {
            EngineState::CollectingTick => self.collecting_tick(event, io),
            EngineState::CollectingRequest => self.collecting_request(event),
            other => other,
        }
    }

    fn collecting_tick(&mut self, event: WorkerEvent, io: &mut impl PublishIo) -> EngineState {
        match event {
            WorkerEvent::Shutdown => EngineState::Stopped(StopReason::Shutdown),
            WorkerEvent::SessionClosed => EngineState::Stopped(StopReason::SessionClosed),
            WorkerEvent::Notification(n) => {
                self.merge(n);
                EngineState::CollectingTick
            }
            WorkerEvent::Modify(parameters) => {
                self.modify(parameters);
                EngineState::CollectingTick
            }
            // Not waited on in this state. A request handed over anyway is
            // served with whatever is pending.
            WorkerEvent::PublishRequest(envelope) => {
                if self.pending.is_empty() {
                    self.keep_alive(envelope, io)
                } else {
                    EngineState::Sending(envelope)
                }
            }
            WorkerEvent::Tick => {
                if !self.pending.is_empty() {
                    return EngineState::CollectingRequest;
                }

                self.keep_alive_counter = self.keep_alive_counter.saturating_add(1);
                if self.keep_alive_counter <= self.parameters.max_keep_alive_count {
                    return EngineState::CollectingTick;
                }

                match io.try_next_request() {
                    Ok(envelope) => self.keep_alive(envelope, io),
                    Err(TryRecvError::Empty) => self.count_lifetime(EngineState::CollectingTick),
                    Err(TryRecvError::Disconnected) => EngineState::Stopped(StopReason::SessionClosed),
                }
            }
        }
    }

    fn collecting_request(&mut self, event: WorkerEvent) -> EngineState {
        match event {
            WorkerEvent::Shutdown => EngineState::Stopped(StopReason::Shutdown),
            WorkerEvent::SessionClosed => EngineState::Stopped(StopReason::SessionClosed),
            WorkerEvent::Notification(n) => {
                self.merge(n);
                EngineState::CollectingRequest
            }
            WorkerEvent::Modify(parameters) => {
                self.modify(parameters);
                EngineState::CollectingRequest
            }
            WorkerEvent::PublishRequest(envelope) => EngineState::Sending(envelope),
            WorkerEvent::Tick => self.count_lifetime(EngineState::CollectingRequest),
        }
    }

    /// Flush every pending notification to `envelope` as one data change.
    pub(crate) fn send(&mut self, envelope: PublishRequestEnvelope, io: &mut impl PublishIo) -> EngineState {
        self.keep_alive_counter = 0;
        self.lifetime_counter = 0;

        self.sequence_number = next_sequence_number(self.sequence_number);

        let monitored_items: Vec<MonitoredItemNotification> =
            self.pending.drain().map(|(_, n)| n).collect();
        let item_count = monitored_items.len();

        let message = NotificationMessage {
            sequence_number: self.sequence_number,
            publish_time: Timestamp::now(),
            notification_data: vec![NotificationData::DataChange(DataChangeNotification {
                monitored_items,
            })],
        };
        let response = self.response(&envelope, message);

        match io.send(envelope.request_id, response) {
            Ok(()) => {
                debug!(
                    subscription_id = %self.subscription_id,
                    seq = self.sequence_number,
                    items = item_count,
                    "Published notifications"
                );
                EngineState::CollectingTick
            }
            Err(e) => {
                error!(
                    subscription_id = %self.subscription_id,
                    request_id = envelope.request_id,
                    error = %e,
                    "Failed to send publish response, killing subscription"
                );
                EngineState::Stopped(StopReason::TransportFailed)
            }
        }
    }

    /// Answer `envelope` with a content-free message.
    ///
    /// Keep-alives carry the sequence number the next data message will use
    /// without consuming it.
    fn keep_alive(&mut self, envelope: PublishRequestEnvelope, io: &mut impl PublishIo) -> EngineState {
        let message = NotificationMessage {
            sequence_number: next_sequence_number(self.sequence_number),
            publish_time: Timestamp::now(),
            notification_data: Vec::new(),
        };
        let response = self.response(&envelope, message);

        match io.send(envelope.request_id, response) {
            Ok(()) => {
                debug!(subscription_id = %self.subscription_id, "Sent keep-alive");
                self.keep_alive_counter = 0;
                self.lifetime_counter = 0;
                EngineState::CollectingTick
            }
            Err(e) => {
                warn!(
                    subscription_id = %self.subscription_id,
                    error = %e,
                    "Failed to send keep-alive, killing subscription"
                );
                EngineState::Stopped(StopReason::TransportFailed)
            }
        }
    }

    fn count_lifetime(&mut self, waiting: EngineState) -> EngineState {
        self.lifetime_counter = self.lifetime_counter.saturating_add(1);
        if self.lifetime_counter > self.parameters.lifetime_count {
            warn!(subscription_id = %self.subscription_id, "Subscription timed out");
            return EngineState::Stopped(StopReason::Timeout);
        }
        waiting
    }

    fn merge(&mut self, notification: MonitoredItemNotification) {
        self.pending.insert(notification.client_handle, notification);
    }

    // The tick period is fixed when the worker starts; only the counters'
    // limits follow a modification.
    fn modify(&mut self, parameters: SubscriptionParameters) {
        self.parameters = parameters;
    }

    fn response(&self, envelope: &PublishRequestEnvelope, message: NotificationMessage) -> PublishResponse {
        PublishResponse {
            header: ResponseHeader::good(&envelope.request.header),
            subscription_id: self.subscription_id,
            available_sequence_numbers: Vec::new(),
            more_notifications: false,
            notification_message: message,
            results: Vec::new(),
        }
    }
}
