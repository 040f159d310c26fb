//! Core error types for agent-coder

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{EndpointKind, SessionId, SessionStatus};

/// Top-level error type for the agent-coder ecosystem
#[derive(Error, Debug)]
pub enum AcError {
    /// Endpoint error
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),

    /// Agent backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Storage error
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Workspace preparation error
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a communication endpoint
#[derive(Error, Debug)]
pub enum EndpointError {
    /// Delivery to the endpoint failed
    #[error("Delivery to {endpoint} failed: {reason}")]
    Delivery {
        endpoint: EndpointKind,
        reason: String,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be recorded, so it was not delivered
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Endpoint has been released
    #[error("Endpoint closed")]
    Closed,
}

/// Errors raised by the agent backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Backend program could not be started
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// A turn failed
    #[error("Turn failed: {0}")]
    Turn(String),

    /// A turn exceeded its time limit
    #[error("Turn timed out after {0} seconds")]
    Timeout(u64),

    /// Run used before initialization
    #[error("Backend is not initialized")]
    NotInitialized,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by durable storage
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Endpoint binding not found
    #[error("No {endpoint} binding for session {session_id}")]
    BindingNotFound {
        session_id: SessionId,
        endpoint: EndpointKind,
    },

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Blocking storage task failed
    #[error("Storage task failed: {0}")]
    Task(String),
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(SessionId),

    /// A run is already in progress for this session
    #[error("Session {0} is already running")]
    AlreadyActive(SessionId),

    /// Orchestrator used before initialization
    #[error("Agent is not initialized")]
    NotInitialized,

    /// Session is not in a status that allows the operation
    #[error("Session {id} cannot start from status {status}")]
    InvalidStatus { id: SessionId, status: SessionStatus },

    /// Run ended because its endpoints were released before `stop`
    #[error("Session {0} was interrupted")]
    Interrupted(SessionId),

    /// Orchestrator step called out of order
    #[error("Expected agent state {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Endpoint credential missing from both config and environment
    #[error("{endpoint} endpoint requires {variable}")]
    MissingCredential {
        endpoint: EndpointKind,
        variable: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_active_message() {
        let err = SessionError::AlreadyActive(SessionId::new("abc"));
        assert_eq!(err.to_string(), "Session abc is already running");
    }

    #[test]
    fn test_persistence_error_converts_into_endpoint_error() {
        let err: EndpointError = StoreError::Database("disk full".into()).into();
        assert!(matches!(err, EndpointError::Persistence(_)));
        let top: AcError = err.into();
        assert!(top.to_string().contains("disk full"));
    }

    #[test]
    fn test_missing_credential_message() {
        let err = ConfigError::MissingCredential {
            endpoint: EndpointKind::Telegram,
            variable: "TELEGRAM_BOT_TOKEN",
        };
        assert_eq!(err.to_string(), "Telegram endpoint requires TELEGRAM_BOT_TOKEN");
    }
}
