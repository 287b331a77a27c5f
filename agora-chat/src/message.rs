//! Chat message model shared by the server core, the wire protocol and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved author for server-generated join/leave notices.
pub const SYSTEM_AUTHOR: &str = "SYSTEM";

/// Client identifier. Supplied by the client, unique among joined clients.
pub type ClientId = String;

/// A single chat or system message.
///
/// `timestamp` is assigned by the server when the message is accepted,
/// while the session lock is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: ClientId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message stamped with the current time.
    pub fn new(author: impl Into<ClientId>, content: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// `User [id] joined` notice.
    pub fn joined(user_id: &str) -> Self {
        Self::new(SYSTEM_AUTHOR, format!("User [{user_id}] joined"))
    }

    /// `User [id] left` notice.
    pub fn left(user_id: &str) -> Self {
        Self::new(SYSTEM_AUTHOR, format!("User [{user_id}] left"))
    }

    /// Whether this is a server-generated notice.
    pub fn is_system(&self) -> bool {
        self.author == SYSTEM_AUTHOR
    }

    /// Single-line rendering for terminals: `[HH:MM:SS] author: content`.
    /// System notices omit the author.
    pub fn render(&self) -> String {
        let time = self.timestamp.format("%H:%M:%S");
        if self.is_system() {
            format!("[{time}] {}", self.content)
        } else {
            format!("[{time}] {}: {}", self.author, self.content)
        }
    }
}
