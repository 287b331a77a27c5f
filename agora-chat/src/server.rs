//! WebSocket chat server: one task per connection, one shared room.
//!
//! Architecture:
//! ```text
//! Client A ──┐                       ┌── ClientRegistry ── Mailbox × N
//!             ├── conn task ── dispatch ── SessionService ─┤
//! Client B ──┘                       └── HistoryLog
//! ```
//!
//! Each binary frame is one [`Request`]; the task answers it with exactly
//! one [`Response`] frame before reading the next. Socket writes happen
//! after the session lock is released.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::message::ClientId;
use crate::protocol::{Call, Reply, Request, Response, RpcError};
use crate::service::{ServiceConfig, SessionService};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Room settings
    pub service: ServiceConfig,
    /// Leave on behalf of ids a connection joined but never left
    pub idle_leave: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            service: ServiceConfig::default(),
            idle_leave: false,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_requests: u64,
    pub malformed_frames: u64,
}

#[derive(Default)]
struct AtomicServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    total_requests: AtomicU64,
    malformed_frames: AtomicU64,
}

/// The chat server.
pub struct ChatServer {
    config: ServerConfig,
    service: Arc<SessionService>,
    stats: Arc<AtomicServerStats>,
}

impl ChatServer {
    pub fn new(config: ServerConfig) -> Self {
        let service = Arc::new(SessionService::new(config.service.clone()));
        Self {
            config,
            service,
            stats: Arc::new(AtomicServerStats::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Chat server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::error!("Accept error: {e}");
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let service = self.service.clone();
            let stats = self.stats.clone();
            let idle_leave = self.config.idle_leave;

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, service, stats, idle_leave).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        service: Arc<SessionService>,
        stats: Arc<AtomicServerStats>,
        idle_leave: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let conn_id = Uuid::new_v4();
        log::info!("Connection {conn_id} established from {addr}");

        stats.total_connections.fetch_add(1, Ordering::Relaxed);
        stats.active_connections.fetch_add(1, Ordering::Relaxed);

        // Sessions joined over this connection and not yet left, by token
        let mut joined: HashMap<ClientId, Uuid> = HashMap::new();

        let result = async {
            while let Some(msg) = ws_receiver.next().await {
                match msg? {
                    Message::Binary(data) => {
                        let response = match Request::decode(&data) {
                            Ok(request) => {
                                stats.total_requests.fetch_add(1, Ordering::Relaxed);
                                log::debug!("Connection {conn_id}: {}", request.call.name());
                                execute(&service, &request, &mut joined).await
                            }
                            Err(e) => {
                                stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
                                log::warn!("Failed to decode request from {addr}: {e}");
                                Response::err(0, RpcError::Malformed(e.to_string()))
                            }
                        };
                        let encoded = response.encode()?;
                        ws_sender.send(Message::Binary(encoded.into())).await?;
                    }
                    Message::Ping(data) => {
                        ws_sender.send(Message::Pong(data)).await?;
                    }
                    Message::Close(_) => {
                        log::info!("Connection {conn_id} closed from {addr}");
                        break;
                    }
                    _ => {}
                }
            }
            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
        }
        .await;

        if idle_leave {
            for (user_id, token) in &joined {
                if service.leave_session(user_id, *token).await {
                    log::info!("Connection {conn_id} dropped; left [{user_id}] on its behalf");
                }
            }
        } else if !joined.is_empty() {
            log::debug!(
                "Connection {conn_id} dropped with {} session(s) still joined",
                joined.len()
            );
        }

        stats.active_connections.fetch_sub(1, Ordering::Relaxed);
        result
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            active_connections: self.stats.active_connections.load(Ordering::Relaxed),
            total_requests: self.stats.total_requests.load(Ordering::Relaxed),
            malformed_frames: self.stats.malformed_frames.load(Ordering::Relaxed),
        }
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Shared session service.
    pub fn service(&self) -> &Arc<SessionService> {
        &self.service
    }
}

/// Like [`dispatch`], but remembers the session token of every successful
/// Join in `joined` so the connection can later leave exactly the sessions
/// it created.
async fn execute(service: &SessionService, request: &Request, joined: &mut HashMap<ClientId, Uuid>) -> Response {
    match &request.call {
        Call::Join { user_id } => {
            let outcome = service.join_session(user_id).await.map(|(token, history)| {
                joined.insert(user_id.clone(), token);
                Reply::History(history)
            });
            Response {
                id: request.id,
                outcome: outcome.map_err(RpcError::from),
            }
        }
        Call::Leave { user_id } => {
            joined.remove(user_id);
            dispatch(service, request).await
        }
        _ => dispatch(service, request).await,
    }
}

/// Run one request against the service. Transport-independent.
pub async fn dispatch(service: &SessionService, request: &Request) -> Response {
    let outcome = match &request.call {
        Call::Join { user_id } => service.join(user_id).await.map(Reply::History),
        Call::SendMessage { author, content } => {
            service.send_message(author, content).await.map(Reply::Ack)
        }
        Call::GetMessages { user_id } => service.get_messages(user_id).await.map(Reply::Messages),
        Call::Leave { user_id } => Ok(Reply::Ack(service.leave(user_id).await)),
        Call::GetHistory { user_id } => Ok(Reply::History(service.get_history(user_id).await)),
    };
    Response {
        id: request.id,
        outcome: outcome.map_err(RpcError::from),
    }
}
