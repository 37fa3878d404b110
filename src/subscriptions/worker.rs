//! Subscription worker thread.

use crate::error::Result;
use crate::messages::{MonitoredItemNotification, PublishResponse, Response};
use crate::sessions::PublishRequestEnvelope;
use crate::transport::Transport;
use crate::types::SubscriptionId;
use crossbeam_channel::{select, tick, Receiver, TryRecvError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::info;

use super::engine::{EngineState, PublishEngine, PublishIo, WorkerEvent};
use super::registry::SubscriptionRegistry;
use super::types::{StopReason, SubscriptionParameters};

/// Receiving ends of everything a worker waits on.
pub(crate) struct WorkerChannels {
    /// Never carries a message; disconnects when the registry stops the
    /// subscription.
    pub shutdown: Receiver<()>,
    pub notifications: Receiver<MonitoredItemNotification>,
    pub modifications: Receiver<SubscriptionParameters>,
    pub publish_requests: Receiver<PublishRequestEnvelope>,
}

struct TransportIo {
    publish_requests: Receiver<PublishRequestEnvelope>,
    transport: Arc<dyn Transport>,
}

impl PublishIo for TransportIo {
    fn try_next_request(&mut self) -> std::result::Result<PublishRequestEnvelope, TryRecvError> {
        self.publish_requests.try_recv()
    }

    fn send(&mut self, request_id: u32, response: PublishResponse) -> Result<()> {
        self.transport.send(request_id, Response::Publish(response))
    }
}

/// Deregisters the subscription when the worker exits, unwinding included.
struct Deregister {
    id: SubscriptionId,
    registry: Weak<SubscriptionRegistry>,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.delete_subscription(self.id);
        }
    }
}

pub(crate) fn spawn(
    engine: PublishEngine,
    id: SubscriptionId,
    tick_period: Duration,
    channels: WorkerChannels,
    transport: Arc<dyn Transport>,
    registry: Weak<SubscriptionRegistry>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("ua-sub-{}", id))
        .spawn(move || {
            let _deregister = Deregister { id, registry };
            let reason = run(engine, tick_period, channels, transport);
            info!(subscription_id = %id, reason = ?reason, "Subscription shutting down");
        })
}

fn run(
    mut engine: PublishEngine,
    tick_period: Duration,
    channels: WorkerChannels,
    transport: Arc<dyn Transport>,
) -> StopReason {
    let ticker = tick(tick_period);
    let mut io = TransportIo {
        publish_requests: channels.publish_requests.clone(),
        transport,
    };

    let mut state = EngineState::CollectingTick;
    loop {
        state = match state {
            EngineState::Sending(envelope) => engine.send(envelope, &mut io),
            EngineState::Stopped(reason) => return reason,
            EngineState::CollectingTick => {
                let event = wait_for_tick(&channels, &ticker);
                engine.step(EngineState::CollectingTick, event, &mut io)
            }
            EngineState::CollectingRequest => {
                let event = wait_for_request(&channels, &ticker);
                engine.step(EngineState::CollectingRequest, event, &mut io)
            }
        };
    }
}

fn wait_for_tick(channels: &WorkerChannels, ticker: &Receiver<Instant>) -> WorkerEvent {
    select! {
        recv(channels.shutdown) -> _ => WorkerEvent::Shutdown,
        recv(channels.notifications) -> msg => match msg {
            Ok(n) => WorkerEvent::Notification(n),
            Err(_) => WorkerEvent::Shutdown,
        },
        recv(channels.modifications) -> msg => match msg {
            Ok(p) => WorkerEvent::Modify(p),
            Err(_) => WorkerEvent::Shutdown,
        },
        recv(ticker) -> _ => WorkerEvent::Tick,
    }
}

fn wait_for_request(channels: &WorkerChannels, ticker: &Receiver<Instant>) -> WorkerEvent {
    select! {
        recv(channels.shutdown) -> _ => WorkerEvent::Shutdown,
        recv(channels.publish_requests) -> msg => match msg {
            Ok(envelope) => WorkerEvent::PublishRequest(envelope),
            Err(_) => WorkerEvent::SessionClosed,
        },
        recv(channels.notifications) -> msg => match msg {
            Ok(n) => WorkerEvent::Notification(n),
            Err(_) => WorkerEvent::Shutdown,
        },
        recv(channels.modifications) -> msg => match msg {
            Ok(p) => WorkerEvent::Modify(p),
            Err(_) => WorkerEvent::Shutdown,
        },
        recv(ticker) -> _ => WorkerEvent::Tick,
    }
}
