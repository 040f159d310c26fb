//! Session events published by the session manager

use serde::{Deserialize, Serialize};

use crate::types::{EndpointKind, MessageKind, SessionId, SessionStatus};

/// Observable session lifecycle and message traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session's stored status changed
    SessionStatusChanged {
        session_id: SessionId,
        status: SessionStatus,
    },

    /// A message was durably recorded
    MessagePersisted {
        session_id: SessionId,
        endpoint: EndpointKind,
        sender: String,
        content: String,
        kind: MessageKind,
    },
}

impl SessionEvent {
    /// Session the event belongs to
    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::SessionStatusChanged { session_id, .. }
            | SessionEvent::MessagePersisted { session_id, .. } => session_id,
        }
    }
}
