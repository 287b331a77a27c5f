//! # agora-chat - Multi-client chat room over WebSocket RPC
//!
//! Clients join one shared room, post messages, and poll for messages
//! posted by others. The server keeps a single ordered history and a
//! bounded mailbox per joined client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   Request/Response  ┌──────────────┐
//! │ ChatClient  │ ◄─────────────────► │ ChatServer   │
//! │ (per user)  │   WebSocket frames  │ (task/conn)  │
//! └──────┬──────┘                     └──────┬───────┘
//!        │ poll every 500ms                  │
//!        ▼                                   ▼
//!   GetMessages                       ┌──────────────┐
//!                                     │SessionService│──► HistoryLog
//!                                     └──────┬───────┘
//!                                            │
//!                                    ┌───────┴────────┐
//!                                    │BroadcastEngine │
//!                                    │ (fan-out N-1)  │
//!                                    └───────┬────────┘
//!                                            ▼
//!                                     Mailbox × N (bounded)
//! ```
//!
//! ## Modules
//!
//! - [`message`] - Chat message model and SYSTEM notices
//! - [`mailbox`] - Bounded per-client queue, drop-on-full
//! - [`history`] - Append-only global log
//! - [`registry`] - Joined clients and their mailboxes
//! - [`broadcast`] - Fan-out excluding the author
//! - [`service`] - Join / SendMessage / GetMessages / Leave / GetHistory
//! - [`protocol`] - Binary wire protocol (bincode-encoded Request/Response)
//! - [`server`] - WebSocket server
//! - [`client`] - WebSocket client with mailbox poller

pub mod message;
pub mod mailbox;
pub mod history;
pub mod registry;
pub mod broadcast;
pub mod service;
pub mod protocol;
pub mod server;
pub mod client;

// Re-exports for convenience
pub use message::{ChatMessage, ClientId, SYSTEM_AUTHOR};
pub use mailbox::{Mailbox, DEFAULT_MAILBOX_CAPACITY};
pub use history::HistoryLog;
pub use registry::{ClientRegistry, ClientSession};
pub use broadcast::{BroadcastEngine, BroadcastStats, FanOut};
pub use service::{ServiceConfig, ServiceStats, SessionError, SessionService};
pub use protocol::{Call, ProtocolError, Reply, Request, Response, RpcError};
pub use server::{ChatServer, ServerConfig, ServerStats, dispatch};
pub use client::{ChatClient, ClientError, DEFAULT_POLL_INTERVAL};
