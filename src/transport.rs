//! Response delivery.

use crate::error::Result;
use crate::messages::Response;

/// Delivers a response to the client that issued request `request_id`.
///
/// Publish responses are produced long after their request was received, by
/// a subscription worker thread, so implementations must be shareable across
/// threads. An error is fatal for the subscription that attempted the send.
pub trait Transport: Send + Sync {
    fn send(&self, request_id: u32, response: Response) -> Result<()>;
}
