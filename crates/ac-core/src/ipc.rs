//! IPC protocol between the CLI and the agent-coder daemon
//!
//! Newline-delimited JSON over TCP on 127.0.0.1.

use serde::{Deserialize, Serialize};

use crate::event::SessionEvent;
use crate::types::{Message, Session, SessionCreateRequest, SessionId};

/// Default daemon IPC port
pub const DEFAULT_IPC_PORT: u16 = 22340;

/// IPC request from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Keepalive, allowed before authentication
    Ping,

    /// Present the daemon's token
    Authenticate { token: String },

    /// Create a session record without starting it
    CreateSession(SessionCreateRequest),

    /// Start a created session in the background
    StartSession { session_id: SessionId },

    /// Push human input into a running session's UI endpoint
    SendUserMessage { session_id: SessionId, text: String },

    /// Whether a session currently has a run in progress
    IsActive { session_id: SessionId },

    /// Get one session
    GetSession { session_id: SessionId },

    /// List all sessions
    ListSessions,

    /// Recorded messages of a session
    ListMessages {
        session_id: SessionId,
        limit: Option<usize>,
    },

    /// Receive events for a session
    Subscribe { session_id: SessionId },

    /// Stop receiving events for a session
    Unsubscribe { session_id: SessionId },

    /// Shutdown the daemon
    Shutdown,
}

/// IPC response from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    Pong,

    /// Generic success
    Ok,

    /// Error response
    Error { message: String },

    SessionCreated(Session),

    Session(Session),

    Sessions { sessions: Vec<Session> },

    Messages { messages: Vec<Message> },

    Active { active: bool },
}

/// Any frame on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpcMessage {
    Request(IpcRequest),
    Response(IpcResponse),
    Event(SessionEvent),
}

impl IpcMessage {
    /// Serialize as one JSON line
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl From<IpcRequest> for IpcMessage {
    fn from(req: IpcRequest) -> Self {
        IpcMessage::Request(req)
    }
}

impl From<IpcResponse> for IpcMessage {
    fn from(resp: IpcResponse) -> Self {
        IpcMessage::Response(resp)
    }
}

impl From<SessionEvent> for IpcMessage {
    fn from(event: SessionEvent) -> Self {
        IpcMessage::Event(event)
    }
}
