//! Joined-client registry: client id → session (and its mailbox).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::mailbox::Mailbox;
use crate::message::ClientId;

/// One joined client.
pub struct ClientSession {
    pub id: ClientId,
    /// Distinguishes this session from a later one under the same id
    pub token: Uuid,
    pub mailbox: Mailbox,
    pub joined_at: Instant,
}

impl ClientSession {
    pub fn new(id: impl Into<ClientId>, mailbox_capacity: usize) -> Self {
        Self {
            id: id.into(),
            token: Uuid::new_v4(),
            mailbox: Mailbox::new(mailbox_capacity),
            joined_at: Instant::now(),
        }
    }
}

/// Membership set. Not synchronized; owned by the session service's lock.
#[derive(Default)]
pub struct ClientRegistry {
    sessions: HashMap<ClientId, Arc<ClientSession>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` with an empty mailbox.
    ///
    /// Returns `None` if `id` is already joined; the existing session and
    /// its undrained mailbox are left untouched.
    pub fn join(&mut self, id: &str, mailbox_capacity: usize) -> Option<Arc<ClientSession>> {
        if self.sessions.contains_key(id) {
            return None;
        }
        let session = Arc::new(ClientSession::new(id, mailbox_capacity));
        self.sessions.insert(id.to_string(), session.clone());
        Some(session)
    }

    /// Remove `id`. Returns the removed session, if any.
    pub fn leave(&mut self, id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.remove(id)
    }

    /// Remove `id` only if its current session carries `token`.
    pub fn leave_session(&mut self, id: &str, token: Uuid) -> Option<Arc<ClientSession>> {
        match self.sessions.get(id) {
            Some(session) if session.token == token => self.sessions.remove(id),
            _ => None,
        }
    }

    /// All sessions except `exclude`.
    pub fn others<'a>(&'a self, exclude: &'a str) -> impl Iterator<Item = &'a Arc<ClientSession>> + 'a {
        self.sessions
            .iter()
            .filter(move |(id, _)| id.as_str() != exclude)
            .map(|(_, session)| session)
    }

    /// All sessions.
    pub fn sessions(&self) -> impl Iterator<Item = &Arc<ClientSession>> {
        self.sessions.values()
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<ClientSession>> {
        self.sessions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Joined ids, sorted.
    pub fn members(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
