//! Fan-out to N-1 mailboxes with drop-on-full backpressure.
//!
//! Every push is a `try_send`, so a fan-out never waits on a slow
//! consumer: its cost is bounded by the number of joined clients.
//! A full mailbox loses the message for that recipient only.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::ChatMessage;
use crate::registry::ClientSession;

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_broadcast: u64,
    pub deliveries: u64,
    pub messages_dropped: u64,
}

/// Outcome of a single fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

/// Atomic counters, so fan-out never takes a lock for bookkeeping.
struct AtomicBroadcastStats {
    messages_broadcast: AtomicU64,
    deliveries: AtomicU64,
    messages_dropped: AtomicU64,
}

impl AtomicBroadcastStats {
    fn new() -> Self {
        Self {
            messages_broadcast: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }
}

pub struct BroadcastEngine {
    stats: AtomicBroadcastStats,
}

impl BroadcastEngine {
    pub fn new() -> Self {
        Self {
            stats: AtomicBroadcastStats::new(),
        }
    }

    /// Push `message` into the mailbox of every session whose id is not
    /// `exclude`.
    ///
    /// The message is shared, not copied, across mailboxes.
    pub fn fan_out<'a, I>(&self, sessions: I, message: &ChatMessage, exclude: &str) -> FanOut
    where
        I: IntoIterator<Item = &'a Arc<ClientSession>>,
    {
        let shared = Arc::new(message.clone());
        let mut report = FanOut::default();

        for session in sessions {
            if session.id == exclude {
                continue;
            }
            if session.mailbox.try_push(shared.clone()) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
                log::debug!(
                    "Mailbox full for {}, dropped message from {}",
                    session.id,
                    message.author
                );
            }
        }

        self.stats.messages_broadcast.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.stats
            .messages_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        report
    }

    /// Lock-free snapshot of the counters.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_broadcast: self.stats.messages_broadcast.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions(ids: &[&str], capacity: usize) -> Vec<Arc<ClientSession>> {
        ids.iter()
            .map(|id| Arc::new(ClientSession::new(*id, capacity)))
            .collect()
    }

    #[tokio::test]
    async fn test_fan_out_excludes_author() {
        let engine = BroadcastEngine::new();
        let peers = sessions(&["alice", "bob", "carol"], 16);

        let msg = ChatMessage::new("alice", "hi");
        let report = engine.fan_out(&peers, &msg, "alice");
        assert_eq!(report, FanOut { delivered: 2, dropped: 0 });

        assert!(peers[0].mailbox.drain().await.is_empty());
        assert_eq!(peers[1].mailbox.drain().await, vec![msg.clone()]);
        assert_eq!(peers[2].mailbox.drain().await, vec![msg]);
    }

    #[tokio::test]
    async fn test_fan_out_drops_on_full() {
        let engine = BroadcastEngine::new();
        let peers = sessions(&["bob"], 2);

        for i in 0..5 {
            engine.fan_out(&peers, &ChatMessage::new("alice", format!("m{i}")), "alice");
        }

        let drained = peers[0].mailbox.drain().await;
        let contents: Vec<&str> = drained.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1"]);
        assert_eq!(peers[0].mailbox.dropped(), 3);
    }

    #[tokio::test]
    async fn test_slow_consumer_does_not_affect_others() {
        let engine = BroadcastEngine::new();
        let peers = sessions(&["slow", "fast"], 1);

        engine.fan_out(&peers, &ChatMessage::new("alice", "first"), "alice");
        assert_eq!(peers[1].mailbox.drain().await.len(), 1);

        let report = engine.fan_out(&peers, &ChatMessage::new("alice", "second"), "alice");
        assert_eq!(report, FanOut { delivered: 1, dropped: 1 });

        let fast = peers[1].mailbox.drain().await;
        assert_eq!(fast[0].content, "second");
        let slow = peers[0].mailbox.drain().await;
        assert_eq!(slow[0].content, "first");
    }

    #[test]
    fn test_stats_accumulate() {
        let engine = BroadcastEngine::new();
        let peers = sessions(&["alice", "bob"], 1);

        engine.fan_out(&peers, &ChatMessage::new("alice", "a"), "alice");
        engine.fan_out(&peers, &ChatMessage::new("alice", "b"), "alice");

        let stats = engine.stats();
        assert_eq!(stats.messages_broadcast, 2);
        assert_eq!(stats.deliveries, 1);
        assert_eq!(stats.messages_dropped, 1);
    }

    #[test]
    fn test_fan_out_no_recipients() {
        let engine = BroadcastEngine::new();
        let peers: Vec<Arc<ClientSession>> = Vec::new();
        let report = engine.fan_out(&peers, &ChatMessage::joined("alice"), "alice");
        assert_eq!(report, FanOut::default());
        assert_eq!(engine.stats().messages_broadcast, 1);
    }
}
