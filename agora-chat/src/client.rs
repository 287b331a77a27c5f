//! WebSocket RPC client for the chat server.
//!
//! Provides:
//! - One method per remote call, each a single request/response round trip
//! - A background poller that drains the mailbox on an interval
//!
//! Calls are serialized over the one connection; there are no retries.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::message::{ChatMessage, ClientId};
use crate::protocol::{Call, ProtocolError, Reply, Request, Response, RpcError};

/// Default mailbox poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client-side errors.
#[derive(Debug)]
pub enum ClientError {
    /// Dial or socket failure
    Connection(String),
    Protocol(ProtocolError),
    /// The server rejected the call
    Rpc(RpcError),
    /// The server answered with a reply of the wrong shape
    UnexpectedReply(&'static str),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "Connection error: {e}"),
            Self::Protocol(e) => write!(f, "Protocol error: {e}"),
            Self::Rpc(e) => write!(f, "Server error: {e}"),
            Self::UnexpectedReply(call) => write!(f, "Unexpected reply to {call}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connection(e.to_string())
    }
}

/// A connected chat client acting as one user.
pub struct ChatClient {
    user_id: ClientId,
    server_url: String,
    ws: Mutex<WsStream>,
    next_id: AtomicU64,
}

impl ChatClient {
    /// Dial `server_url` (e.g. `ws://127.0.0.1:8080`).
    pub async fn connect(
        server_url: impl Into<String>,
        user_id: impl Into<ClientId>,
    ) -> Result<Self, ClientError> {
        let server_url = server_url.into();
        let (ws, _) = tokio_tungstenite::connect_async(server_url.as_str()).await?;
        log::debug!("Connected to {server_url}");
        Ok(Self {
            user_id: user_id.into(),
            server_url,
            ws: Mutex::new(ws),
            next_id: AtomicU64::new(1),
        })
    }

    /// Join the room. Returns the history including our own join notice.
    pub async fn join(&self) -> Result<Vec<ChatMessage>, ClientError> {
        match self.call(Call::Join { user_id: self.user_id.clone() }).await? {
            Reply::History(history) => Ok(history),
            _ => Err(ClientError::UnexpectedReply("Join")),
        }
    }

    pub async fn send_message(&self, content: impl Into<String>) -> Result<bool, ClientError> {
        let call = Call::SendMessage {
            author: self.user_id.clone(),
            content: content.into(),
        };
        match self.call(call).await? {
            Reply::Ack(ok) => Ok(ok),
            _ => Err(ClientError::UnexpectedReply("SendMessage")),
        }
    }

    /// Drain our mailbox on the server.
    pub async fn get_messages(&self) -> Result<Vec<ChatMessage>, ClientError> {
        match self.call(Call::GetMessages { user_id: self.user_id.clone() }).await? {
            Reply::Messages(messages) => Ok(messages),
            _ => Err(ClientError::UnexpectedReply("GetMessages")),
        }
    }

    /// Returns whether we were joined.
    pub async fn leave(&self) -> Result<bool, ClientError> {
        match self.call(Call::Leave { user_id: self.user_id.clone() }).await? {
            Reply::Ack(found) => Ok(found),
            _ => Err(ClientError::UnexpectedReply("Leave")),
        }
    }

    pub async fn get_history(&self) -> Result<Vec<ChatMessage>, ClientError> {
        match self.call(Call::GetHistory { user_id: self.user_id.clone() }).await? {
            Reply::History(history) => Ok(history),
            _ => Err(ClientError::UnexpectedReply("GetHistory")),
        }
    }

    /// Send one request and wait for the response carrying its id.
    async fn call(&self, call: Call) -> Result<Reply, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let encoded = Request::new(id, call).encode()?;

        let mut ws = self.ws.lock().await;
        ws.send(Message::Binary(encoded.into())).await?;

        while let Some(msg) = ws.next().await {
            match msg? {
                Message::Binary(data) => {
                    let response = Response::decode(&data)?;
                    if response.id != id {
                        log::warn!("Discarding response {} while waiting for {id}", response.id);
                        continue;
                    }
                    return response.outcome.map_err(ClientError::Rpc);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(ClientError::Protocol(ProtocolError::ConnectionClosed))
    }

    /// Poll GetMessages every `every` and forward drained messages.
    ///
    /// Failed polls are skipped. The task ends when the receiver is dropped.
    pub fn spawn_poller(self: &Arc<Self>, every: Duration) -> (mpsc::Receiver<ChatMessage>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    return;
                }
                let messages = match client.get_messages().await {
                    Ok(messages) => messages,
                    Err(e) => {
                        log::debug!("Poll failed for {}: {e}", client.user_id);
                        continue;
                    }
                };
                for msg in messages {
                    if tx.send(msg).await.is_err() {
                        return;
                    }
                }
            }
        });
        (rx, handle)
    }

    /// Close the connection without leaving.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.ws.lock().await.close(None).await?;
        Ok(())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}
