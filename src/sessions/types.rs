//! Session types.

use crate::messages::PublishRequest;
use crate::types::{AuthToken, SessionId, Timestamp};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// A publish request paired with the transport request id its response must
/// be addressed to.
#[derive(Clone, Debug)]
pub struct PublishRequestEnvelope {
    pub request: PublishRequest,
    pub request_id: u32,
}

/// A client session.
pub struct Session {
    pub id: SessionId,
    pub auth_token: AuthToken,
    pub created: Timestamp,
    publish_tx: Sender<PublishRequestEnvelope>,
    publish_rx: Receiver<PublishRequestEnvelope>,
}

impl Session {
    pub(crate) fn new(publish_queue_capacity: usize) -> Self {
        let (publish_tx, publish_rx) = bounded(publish_queue_capacity.max(1));
        Self {
            id: SessionId::new(),
            auth_token: AuthToken::random(),
            created: Timestamp::now(),
            publish_tx,
            publish_rx,
        }
    }

    /// Queue a publish request without blocking.
    ///
    /// Returns false when the queue is full; the request is dropped and will
    /// never be answered.
    pub fn enqueue_publish(&self, envelope: PublishRequestEnvelope) -> bool {
        match self.publish_tx.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            // We hold the receiver ourselves, so this cannot happen.
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Consumer end of the publish queue.
    ///
    /// Once the session is closed and dropped the queue disconnects, which is
    /// how subscription workers learn their session is gone.
    pub fn publish_queue(&self) -> Receiver<PublishRequestEnvelope> {
        self.publish_rx.clone()
    }

    /// Publish requests waiting for a subscription to answer them.
    pub fn pending_publish_requests(&self) -> usize {
        self.publish_rx.len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("auth_token", &self.auth_token)
            .field("pending_publish_requests", &self.pending_publish_requests())
            .finish()
    }
}
