//! Append-only global message log.

use crate::message::ChatMessage;

/// Every chat and system message in acceptance order.
///
/// Only ever appended to; guarded by the session lock.
#[derive(Debug, Default)]
pub struct HistoryLog {
    entries: Vec<ChatMessage>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.entries.push(message);
    }

    /// Ordered copy of the full log.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
