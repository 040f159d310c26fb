//! ac-core: Core abstractions and configuration for agent-coder
//!
//! This crate provides the shared domain types, error taxonomy, capability
//! traits and configuration used by the orchestrator daemon and the CLI.

pub mod config;
pub mod error;
pub mod event;
pub mod ipc;
pub mod ipc_auth;
pub mod time;
pub mod traits;
pub mod types;

pub use error::AcError;
pub use event::SessionEvent;
pub use types::{EndpointKind, MessageKind, SessionId, SessionStatus};
