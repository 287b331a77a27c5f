//! Binary request/response protocol for the chat RPC surface.
//!
//! Each WebSocket binary frame carries exactly one bincode-encoded
//! [`Request`] (client → server) or [`Response`] (server → client).
//! Responses echo the request `id` so a client can match them up.
//!
//! ```text
//! Request  { id, call: Join | SendMessage | GetMessages | Leave | GetHistory }
//! Response { id, outcome: Ok(History | Messages | Ack) | Err(RpcError) }
//! ```

use serde::{Deserialize, Serialize};

use crate::message::{ChatMessage, ClientId};
use crate::service::SessionError;

/// One remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    Join { user_id: ClientId },
    SendMessage { author: ClientId, content: String },
    GetMessages { user_id: ClientId },
    Leave { user_id: ClientId },
    GetHistory { user_id: ClientId },
}

impl Call {
    /// Operation name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "Join",
            Self::SendMessage { .. } => "SendMessage",
            Self::GetMessages { .. } => "GetMessages",
            Self::Leave { .. } => "Leave",
            Self::GetHistory { .. } => "GetHistory",
        }
    }
}

/// Successful call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reply {
    /// Full history (Join, GetHistory)
    History(Vec<ChatMessage>),
    /// Drained mailbox (GetMessages)
    Messages(Vec<ChatMessage>),
    /// Boolean acknowledgement (SendMessage, Leave)
    Ack(bool),
}

/// Failed call result, as seen by the remote caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcError {
    NotFound(ClientId),
    AlreadyJoined(ClientId),
    /// The request frame could not be decoded
    Malformed(String),
}

impl From<SessionError> for RpcError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(id) => Self::NotFound(id),
            SessionError::AlreadyJoined(id) => Self::AlreadyJoined(id),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "client {id} not found"),
            Self::AlreadyJoined(id) => write!(f, "client {id} already joined"),
            Self::Malformed(e) => write!(f, "malformed request: {e}"),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub call: Call,
}

impl Request {
    pub fn new(id: u64, call: Call) -> Self {
        Self { id, call }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub outcome: Result<Reply, RpcError>,
}

impl Response {
    pub fn ok(id: u64, reply: Reply) -> Self {
        Self { id, outcome: Ok(reply) }
    }

    pub fn err(id: u64, error: RpcError) -> Self {
        Self { id, outcome: Err(error) }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    Ok(value)
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let req = Request::new(
            7,
            Call::SendMessage {
                author: "alice".into(),
                content: "hi".into(),
            },
        );
        let decoded = Request::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_response_with_history_roundtrip() {
        let history = vec![ChatMessage::joined("alice"), ChatMessage::new("alice", "hi")];
        let resp = Response::ok(3, Reply::History(history.clone()));
        let decoded = Response::decode(&resp.encode().unwrap()).unwrap();

        assert_eq!(decoded.id, 3);
        // Timestamps survive the wire
        assert_eq!(decoded.outcome, Ok(Reply::History(history)));
    }

    #[test]
    fn test_error_response_roundtrip() {
        let resp = Response::err(9, RpcError::NotFound("bob".into()));
        let decoded = Response::decode(&resp.encode().unwrap()).unwrap();
        assert_eq!(decoded.outcome, Err(RpcError::NotFound("bob".into())));
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(Request::decode(&garbage).is_err());
        assert!(Response::decode(&[]).is_err());
    }

    #[test]
    fn test_session_error_conversion() {
        assert_eq!(
            RpcError::from(SessionError::AlreadyJoined("a".into())),
            RpcError::AlreadyJoined("a".into())
        );
        assert_eq!(
            RpcError::from(SessionError::NotFound("a".into())).to_string(),
            "client a not found"
        );
    }

    #[test]
    fn test_call_names() {
        let id = String::from("x");
        assert_eq!(Call::Join { user_id: id.clone() }.name(), "Join");
        assert_eq!(Call::GetMessages { user_id: id.clone() }.name(), "GetMessages");
        assert_eq!(Call::Leave { user_id: id.clone() }.name(), "Leave");
        assert_eq!(Call::GetHistory { user_id: id }.name(), "GetHistory");
    }
}
