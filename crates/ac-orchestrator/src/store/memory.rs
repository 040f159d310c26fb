//! In-process store

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use ac_core::error::StoreError;
use ac_core::traits::Store;
use ac_core::types::{
    EndpointBinding, EndpointKind, Message, NewMessage, Session, SessionId, SessionStatus,
};

/// Everything stored for one session
struct Record {
    session: Session,
    messages: Vec<Message>,
    bindings: Vec<EndpointBinding>,
}

/// Store keeping all data in memory.
///
/// Each session lives in its own map shard entry, so writes for different
/// sessions do not contend while writes for one session apply in order.
pub struct MemoryStore {
    records: DashMap<SessionId, Record>,
    next_message_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_message_id: AtomicU64::new(1),
        }
    }

    fn with_record<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Record) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.clone()))?;
        f(&mut record)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.records.insert(
            session.id.clone(),
            Record {
                session: session.clone(),
                messages: Vec::new(),
                bindings: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.records.get(id).map(|record| record.session.clone()))
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .records
            .iter()
            .map(|record| record.session.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn update_session_status(
        &self,
        id: &SessionId,
        status: SessionStatus,
        at: u64,
    ) -> Result<(), StoreError> {
        self.with_record(id, |record| {
            record.session.status = status;
            record.session.updated_at = at;
            Ok(())
        })
    }

    async fn update_session_artifact(
        &self,
        id: &SessionId,
        artifact: &str,
        at: u64,
    ) -> Result<(), StoreError> {
        self.with_record(id, |record| {
            record.session.artifact = Some(artifact.to_string());
            record.session.updated_at = at;
            Ok(())
        })
    }

    async fn touch_session(&self, id: &SessionId, at: u64) -> Result<(), StoreError> {
        self.with_record(id, |record| {
            record.session.updated_at = at;
            Ok(())
        })
    }

    async fn insert_message(&self, message: NewMessage, at: u64) -> Result<Message, StoreError> {
        let session_id = message.session_id.clone();
        self.with_record(&session_id, |record| {
            let stored = Message {
                id: self.next_message_id.fetch_add(1, Ordering::SeqCst),
                session_id: message.session_id,
                endpoint: message.endpoint,
                sender: message.sender,
                content: message.content,
                kind: message.kind,
                timestamp: at,
            };
            record.messages.push(stored.clone());
            Ok(stored)
        })
    }

    async fn list_messages(
        &self,
        id: &SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, StoreError> {
        let Some(record) = self.records.get(id) else {
            return Ok(Vec::new());
        };
        let skip = limit.map_or(0, |limit| record.messages.len().saturating_sub(limit));
        Ok(record.messages[skip..].to_vec())
    }

    async fn messages_since(&self, id: &SessionId, since: u64) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .records
            .get(id)
            .map(|record| {
                record
                    .messages
                    .iter()
                    .filter(|m| m.timestamp > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_binding(&self, binding: &EndpointBinding) -> Result<(), StoreError> {
        self.with_record(&binding.session_id, |record| {
            if !record.bindings.iter().any(|b| b.endpoint == binding.endpoint) {
                record.bindings.push(binding.clone());
            }
            Ok(())
        })
    }

    async fn list_bindings(&self, id: &SessionId) -> Result<Vec<EndpointBinding>, StoreError> {
        Ok(self
            .records
            .get(id)
            .map(|record| record.bindings.clone())
            .unwrap_or_default())
    }

    async fn get_binding(
        &self,
        id: &SessionId,
        endpoint: EndpointKind,
    ) -> Result<Option<EndpointBinding>, StoreError> {
        Ok(self.records.get(id).and_then(|record| {
            record
                .bindings
                .iter()
                .find(|b| b.endpoint == endpoint)
                .cloned()
        }))
    }

    async fn mark_status_requested(
        &self,
        id: &SessionId,
        endpoint: EndpointKind,
        at: u64,
    ) -> Result<(), StoreError> {
        self.with_record(id, |record| {
            let binding = record
                .bindings
                .iter_mut()
                .find(|b| b.endpoint == endpoint)
                .ok_or_else(|| StoreError::BindingNotFound {
                    session_id: id.clone(),
                    endpoint,
                })?;
            binding.last_status_at = Some(at);
            Ok(())
        })
    }
}
