//! Bounded per-client mailbox with drop-on-full semantics.
//!
//! Backed by a tokio `mpsc` channel: producers call [`Mailbox::try_push`],
//! which never waits, and the owning client empties it with
//! [`Mailbox::drain`]. When the mailbox is full the newest message is
//! dropped and the oldest ones are kept.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, Mutex};

use crate::message::ChatMessage;

/// Default number of undrained messages a mailbox holds.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

pub struct Mailbox {
    tx: mpsc::Sender<Arc<ChatMessage>>,
    /// Single consumer; the lock only serializes concurrent drains.
    rx: Mutex<mpsc::Receiver<Arc<ChatMessage>>>,
    dropped: AtomicU64,
}

impl Mailbox {
    /// Create an empty mailbox. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push without waiting. Returns `false` if the mailbox was full and
    /// the message was dropped.
    pub fn try_push(&self, message: Arc<ChatMessage>) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Take everything currently queued, oldest first. Returns immediately,
    /// possibly with an empty list.
    pub async fn drain(&self) -> Vec<ChatMessage> {
        let mut rx = self.rx.lock().await;
        let mut messages = Vec::with_capacity(self.len());
        while let Ok(msg) = rx.try_recv() {
            messages.push(Arc::unwrap_or_clone(msg));
        }
        messages
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Messages dropped because the mailbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}
