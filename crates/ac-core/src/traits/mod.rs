//! Core trait definitions
//!
//! Every collaborator of the orchestration core is reached through one of
//! these capability sets, so endpoints, agent backends and storage can be
//! swapped without touching the multiplexing logic.

mod backend;
mod endpoint;
mod store;
mod workspace;

pub use backend::{AgentBackend, BackendFactory, RunHandle, WorkspaceConfig};
pub use endpoint::{Endpoint, InputFeed};
pub use store::{MessageSink, Store};
pub use workspace::{ArtifactPublisher, ArtifactRequest, Provisioner, Summarizer};
