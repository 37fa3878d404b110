//! Session registry keyed by authentication token.

use crate::messages::RequestHeader;
use crate::types::AuthToken;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::Session;

/// Owns every live session.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<AuthToken, Arc<Session>>>,
    publish_queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(publish_queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            publish_queue_capacity,
        }
    }

    /// Create and register a session with a fresh random token.
    pub fn new_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.publish_queue_capacity));
        self.sessions
            .write()
            .insert(session.auth_token, Arc::clone(&session));
        debug!(session_id = ?session.id, token = %session.auth_token, "Session created");
        session
    }

    /// Remove a session. Closing an unknown token is a logged no-op.
    pub fn close(&self, token: &AuthToken) -> bool {
        let removed = self.sessions.write().remove(token);
        if removed.is_none() {
            warn!(token = %token, "Unable to close session: unknown token");
            return false;
        }
        debug!(token = %token, "Session closed");
        true
    }

    /// Look up a session by token.
    pub fn session(&self, token: &AuthToken) -> Option<Arc<Session>> {
        let session = self.sessions.read().get(token).cloned();
        if session.is_none() {
            warn!(token = %token, "Unable to look up session");
        }
        session
    }

    /// Resolve the session a request was issued on.
    pub fn resolve(&self, header: &RequestHeader) -> Option<Arc<Session>> {
        self.session(&header.authentication_token)
    }

    /// Close every session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.write().drain().collect();
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
