//! Storage traits

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{
    EndpointBinding, EndpointKind, Message, NewMessage, Session, SessionId, SessionStatus,
};

/// Durable storage for sessions, messages and endpoint bindings.
///
/// Writes for different sessions may proceed concurrently; writes for one
/// session are applied in submission order.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new session row
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Get a session by ID
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// List all sessions, newest first
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    /// Update a session's status and last-activity timestamp
    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        at: u64,
    ) -> Result<(), StoreError>;

    /// Record the artifact produced by a session
    async fn update_session_artifact(
        &self,
        id: &SessionId,
        artifact: &str,
        at: u64,
    ) -> Result<(), StoreError>;

    /// Bump a session's last-activity timestamp
    async fn touch_session(&self, id: &SessionId, at: u64) -> Result<(), StoreError>;

    /// Append a message, assigning its sequence id and timestamp
    async fn insert_message(&self, message: NewMessage, at: u64) -> Result<Message, StoreError>;

    /// Messages of a session in insertion order, optionally only the last `limit`
    async fn list_messages(
        &self,
        id: &SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError>;

    /// Messages of a session recorded strictly after `since`
    async fn messages_since(&self, id: &SessionId, since: u64) -> Result<Vec<Message>, StoreError>;

    /// Insert an endpoint binding; a second binding of the same kind is ignored
    async fn insert_binding(&self, binding: &EndpointBinding) -> Result<(), StoreError>;

    /// All endpoint bindings of a session
    async fn list_bindings(&self, id: &SessionId) -> Result<Vec<EndpointBinding>, StoreError>;

    /// The binding of one endpoint kind
    async fn get_binding(
        &self,
        id: &SessionId,
        endpoint: EndpointKind,
    ) -> Result<Option<EndpointBinding>, StoreError>;

    /// Stamp the time a status request on the endpoint was answered
    async fn mark_status_requested(
        &self,
        id: &SessionId,
        endpoint: EndpointKind,
        at: u64,
    ) -> Result<(), StoreError>;
}

/// Storage-write callback handed to every persisting endpoint wrapper
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn persist(&self, message: NewMessage) -> Result<(), StoreError>;
}
