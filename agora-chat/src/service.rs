//! Session service: the five chat operations over shared room state.
//!
//! Architecture:
//! ```text
//! conn task A ──┐
//! conn task B ──┼── SessionService ── Mutex<RoomState> ──┬── ClientRegistry
//! conn task C ──┘        │                               └── HistoryLog
//!                        ▼
//!                 BroadcastEngine ──try_push──► Mailbox (per client)
//! ```
//!
//! Join, SendMessage and Leave mutate the registry and the log and fan out
//! while holding the room lock, so history order is acceptance order and
//! every mailbox sees messages in that same order. GetMessages only holds
//! the lock long enough to find the mailbox; the drain itself runs outside.

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::broadcast::{BroadcastEngine, BroadcastStats};
use crate::history::HistoryLog;
use crate::mailbox::DEFAULT_MAILBOX_CAPACITY;
use crate::message::{ChatMessage, ClientId};
use crate::registry::{ClientRegistry, ClientSession};

/// Session service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Undrained messages kept per client before new ones are dropped
    pub mailbox_capacity: usize,
    /// Reject SendMessage from authors that have not joined
    pub require_membership: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            require_membership: false,
        }
    }
}

/// Errors returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    NotFound(ClientId),
    AlreadyJoined(ClientId),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "client {id} not found"),
            Self::AlreadyJoined(id) => write!(f, "client {id} already joined"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Point-in-time service statistics.
#[derive(Debug, Clone, Default)]
pub struct ServiceStats {
    pub joined_clients: usize,
    pub history_len: usize,
    pub broadcast: BroadcastStats,
}

struct RoomState {
    registry: ClientRegistry,
    history: HistoryLog,
}

impl RoomState {
    /// Log and announce a session that was just removed from the registry.
    fn announce_left(&mut self, engine: &BroadcastEngine, session: &ClientSession) {
        let notice = ChatMessage::left(&session.id);
        self.history.append(notice.clone());
        engine.fan_out(self.registry.sessions(), &notice, &session.id);

        log::info!(
            "User [{}] left after {:?}. Total clients: {}",
            session.id,
            session.joined_at.elapsed(),
            self.registry.len()
        );
    }
}

/// The chat room. Construct once and share behind an `Arc`.
pub struct SessionService {
    config: ServiceConfig,
    room: Mutex<RoomState>,
    engine: BroadcastEngine,
}

impl SessionService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            room: Mutex::new(RoomState {
                registry: ClientRegistry::new(),
                history: HistoryLog::new(),
            }),
            engine: BroadcastEngine::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServiceConfig::default())
    }

    /// Register `user_id`, announce it to everyone else, and return the full
    /// history including the join notice.
    pub async fn join(&self, user_id: &str) -> Result<Vec<ChatMessage>, SessionError> {
        self.join_session(user_id).await.map(|(_, history)| history)
    }

    /// Same as [`join`](Self::join), also returning the new session's token
    /// for a later [`leave_session`](Self::leave_session).
    pub async fn join_session(&self, user_id: &str) -> Result<(Uuid, Vec<ChatMessage>), SessionError> {
        let mut room = self.room.lock().await;

        let token = match room.registry.join(user_id, self.config.mailbox_capacity) {
            Some(session) => session.token,
            None => {
                log::warn!("Rejected duplicate join for [{user_id}]");
                return Err(SessionError::AlreadyJoined(user_id.to_string()));
            }
        };

        let notice = ChatMessage::joined(user_id);
        room.history.append(notice.clone());
        self.engine.fan_out(room.registry.others(user_id), &notice, user_id);

        log::info!(
            "User [{user_id}] joined. Total clients: {}",
            room.registry.len()
        );
        Ok((token, room.history.snapshot()))
    }

    /// Stamp, log and broadcast a message to everyone except `author`.
    pub async fn send_message(&self, author: &str, content: &str) -> Result<bool, SessionError> {
        let mut room = self.room.lock().await;

        if self.config.require_membership && !room.registry.contains(author) {
            return Err(SessionError::NotFound(author.to_string()));
        }

        // Stamped under the lock so timestamps follow history order
        let message = ChatMessage::new(author, content);
        room.history.append(message.clone());
        let report = self.engine.fan_out(room.registry.others(author), &message, author);

        log::debug!(
            "Message from [{author}] delivered to {} ({} dropped)",
            report.delivered,
            report.dropped
        );
        Ok(true)
    }

    /// Drain `user_id`'s mailbox. Never waits for new messages.
    pub async fn get_messages(&self, user_id: &str) -> Result<Vec<ChatMessage>, SessionError> {
        let session = {
            let room = self.room.lock().await;
            room.registry.lookup(user_id)
        };

        match session {
            Some(session) => Ok(session.mailbox.drain().await),
            None => Err(SessionError::NotFound(user_id.to_string())),
        }
    }

    /// Remove `user_id` and announce it to the remaining clients.
    ///
    /// Returns `false` without touching any state if it was not joined.
    pub async fn leave(&self, user_id: &str) -> bool {
        let mut room = self.room.lock().await;
        match room.registry.leave(user_id) {
            Some(session) => {
                room.announce_left(&self.engine, &session);
                true
            }
            None => false,
        }
    }

    /// Leave `user_id` only if its current session is the one `token` was
    /// issued for. A session that already left, or was replaced by a later
    /// join under the same id, is left alone.
    pub async fn leave_session(&self, user_id: &str, token: Uuid) -> bool {
        let mut room = self.room.lock().await;
        match room.registry.leave_session(user_id, token) {
            Some(session) => {
                room.announce_left(&self.engine, &session);
                true
            }
            None => false,
        }
    }

    /// Full history snapshot. The caller id is not consulted.
    pub async fn get_history(&self, _user_id: &str) -> Vec<ChatMessage> {
        self.room.lock().await.history.snapshot()
    }

    /// Currently joined ids, sorted.
    pub async fn members(&self) -> Vec<ClientId> {
        self.room.lock().await.registry.members()
    }

    pub async fn stats(&self) -> ServiceStats {
        let room = self.room.lock().await;
        ServiceStats {
            joined_clients: room.registry.len(),
            history_len: room.history.len(),
            broadcast: self.engine.stats(),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SYSTEM_AUTHOR;
    use std::sync::Arc;

    fn pairs(messages: &[ChatMessage]) -> Vec<(&str, &str)> {
        messages
            .iter()
            .map(|m| (m.author.as_str(), m.content.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_alice_bob_scenario() {
        let service = SessionService::with_defaults();

        let history = service.join("alice").await.unwrap();
        assert_eq!(pairs(&history), vec![(SYSTEM_AUTHOR, "User [alice] joined")]);

        assert!(service.send_message("alice", "hi").await.unwrap());

        let history = service.join("bob").await.unwrap();
        assert_eq!(
            pairs(&history),
            vec![
                (SYSTEM_AUTHOR, "User [alice] joined"),
                ("alice", "hi"),
                (SYSTEM_AUTHOR, "User [bob] joined"),
            ]
        );

        // Bob's mailbox starts empty; his notice came back in the history
        assert!(service.get_messages("bob").await.unwrap().is_empty());

        service.send_message("alice", "hello bob").await.unwrap();
        let bob = service.get_messages("bob").await.unwrap();
        assert_eq!(pairs(&bob), vec![("alice", "hello bob")]);

        // Alice got bob's join notice, never her own messages
        let alice = service.get_messages("alice").await.unwrap();
        assert_eq!(pairs(&alice), vec![(SYSTEM_AUTHOR, "User [bob] joined")]);
        assert!(service.get_messages("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_then_get_messages_not_found() {
        let service = SessionService::with_defaults();
        service.join("x").await.unwrap();
        assert!(service.leave("x").await);

        assert_eq!(
            service.get_messages("x").await,
            Err(SessionError::NotFound("x".into()))
        );
        assert!(service.members().await.is_empty());
    }

    #[tokio::test]
    async fn test_leave_unknown_is_noop() {
        let service = SessionService::with_defaults();
        service.join("alice").await.unwrap();

        assert!(!service.leave("ghost").await);
        assert_eq!(service.get_history("alice").await.len(), 1);
        assert!(service.get_messages("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining() {
        let service = SessionService::with_defaults();
        service.join("alice").await.unwrap();
        service.join("bob").await.unwrap();
        service.get_messages("alice").await.unwrap();

        assert!(service.leave("bob").await);
        let alice = service.get_messages("alice").await.unwrap();
        assert_eq!(pairs(&alice), vec![(SYSTEM_AUTHOR, "User [bob] left")]);
    }

    #[tokio::test]
    async fn test_duplicate_join_rejected() {
        let service = SessionService::with_defaults();
        service.join("alice").await.unwrap();
        service.join("bob").await.unwrap();
        service.send_message("bob", "pending").await.unwrap();

        assert_eq!(
            service.join("alice").await,
            Err(SessionError::AlreadyJoined("alice".into()))
        );

        // Nothing appended, undrained mail kept
        assert_eq!(service.get_history("alice").await.len(), 3);
        let alice = service.get_messages("alice").await.unwrap();
        assert_eq!(
            pairs(&alice),
            vec![(SYSTEM_AUTHOR, "User [bob] joined"), ("bob", "pending")]
        );
    }

    #[tokio::test]
    async fn test_rejoin_after_leave() {
        let service = SessionService::with_defaults();
        service.join("alice").await.unwrap();
        service.leave("alice").await;

        let history = service.join("alice").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "User [alice] joined");
    }

    #[tokio::test]
    async fn test_leave_session_with_stale_token() {
        let service = SessionService::with_defaults();
        service.join("bob").await.unwrap();
        let (stale, _) = service.join_session("alice").await.unwrap();
        assert!(service.leave("alice").await);
        let (current, _) = service.join_session("alice").await.unwrap();
        service.get_messages("bob").await.unwrap();

        // The replacing session and the room are untouched
        assert!(!service.leave_session("alice", stale).await);
        assert_eq!(service.members().await, vec!["alice", "bob"]);
        assert_eq!(service.get_history("").await.len(), 4);
        assert!(service.get_messages("bob").await.unwrap().is_empty());

        assert!(service.leave_session("alice", current).await);
        assert_eq!(service.members().await, vec!["bob"]);
        let bob = service.get_messages("bob").await.unwrap();
        assert_eq!(pairs(&bob), vec![(SYSTEM_AUTHOR, "User [alice] left")]);
        assert!(!service.leave_session("alice", current).await);
    }

    #[tokio::test]
    async fn test_non_member_send_accepted_by_default() {
        let service = SessionService::with_defaults();
        service.join("bob").await.unwrap();

        assert!(service.send_message("mallory", "boo").await.unwrap());
        let bob = service.get_messages("bob").await.unwrap();
        assert_eq!(pairs(&bob), vec![("mallory", "boo")]);
    }

    #[tokio::test]
    async fn test_require_membership_rejects_non_member() {
        let service = SessionService::new(ServiceConfig {
            require_membership: true,
            ..ServiceConfig::default()
        });
        service.join("bob").await.unwrap();

        assert_eq!(
            service.send_message("mallory", "boo").await,
            Err(SessionError::NotFound("mallory".into()))
        );
        assert!(service.get_messages("bob").await.unwrap().is_empty());
        assert_eq!(service.get_history("bob").await.len(), 1);
    }

    #[tokio::test]
    async fn test_history_len_counts_calls() {
        let service = SessionService::with_defaults();
        service.join("a").await.unwrap();
        service.join("b").await.unwrap();
        service.send_message("a", "1").await.unwrap();
        service.send_message("b", "2").await.unwrap();
        service.send_message("a", "3").await.unwrap();
        service.leave("a").await;
        service.leave("a").await;
        let _ = service.join("b").await;

        // 2 joins + 3 sends + 1 successful leave
        assert_eq!(service.get_history("").await.len(), 6);
        assert_eq!(service.stats().await.history_len, 6);
    }

    #[tokio::test]
    async fn test_fan_out_completeness() {
        let service = SessionService::with_defaults();
        for id in ["a", "b", "c"] {
            service.join(id).await.unwrap();
        }
        for id in ["a", "b", "c"] {
            service.get_messages(id).await.unwrap();
        }

        service.send_message("a", "m").await.unwrap();

        let c = service.get_messages("c").await.unwrap();
        let b = service.get_messages("b").await.unwrap();
        assert_eq!(pairs(&b), vec![("a", "m")]);
        assert_eq!(pairs(&c), vec![("a", "m")]);
        assert!(service.get_messages("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_mailbox_keeps_earliest() {
        let service = SessionService::with_defaults();
        service.join("sender").await.unwrap();
        service.join("idle").await.unwrap();

        for i in 0..150 {
            service.send_message("sender", &format!("m{i}")).await.unwrap();
        }

        let idle = service.get_messages("idle").await.unwrap();
        assert_eq!(idle.len(), DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(idle[0].content, "m0");
        assert_eq!(idle[99].content, "m99");

        let stats = service.stats().await;
        assert_eq!(stats.broadcast.messages_dropped, 50);
        assert_eq!(stats.history_len, 152);
    }

    #[tokio::test]
    async fn test_history_timestamps_non_decreasing() {
        let service = SessionService::with_defaults();
        service.join("a").await.unwrap();
        for i in 0..20 {
            service.send_message("a", &i.to_string()).await.unwrap();
        }
        let history = service.get_history("a").await;
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_concurrent_senders_no_self_echo() {
        let service = Arc::new(SessionService::with_defaults());
        let ids: Vec<String> = (0..8).map(|i| format!("user{i}")).collect();
        for id in &ids {
            service.join(id).await.unwrap();
        }
        for id in &ids {
            service.get_messages(id).await.unwrap();
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                for n in 0..5 {
                    service.send_message(&id, &format!("{id}-{n}")).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = service.get_history("").await;
        assert_eq!(history.len(), 8 + 8 * 5);

        for id in &ids {
            let inbox = service.get_messages(id).await.unwrap();
            assert_eq!(inbox.len(), 7 * 5);
            assert!(inbox.iter().all(|m| &m.author != id));

            // Mailbox order is a subsequence of history order
            let mut cursor = history.iter();
            for msg in &inbox {
                assert!(cursor.any(|h| h == msg));
            }
        }
    }

    #[tokio::test]
    async fn test_membership_tracks_join_leave() {
        let service = SessionService::with_defaults();
        service.join("c").await.unwrap();
        service.join("a").await.unwrap();
        service.join("b").await.unwrap();
        service.leave("a").await;
        assert_eq!(service.members().await, vec!["b", "c"]);
        assert_eq!(service.stats().await.joined_clients, 2);
    }
}
