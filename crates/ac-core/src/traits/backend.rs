//! Agent backend traits

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::BackendError;
use crate::types::BackendKind;

/// Environment the agent backend is initialized against
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Workspace directory the agent operates in
    pub workspace: PathBuf,
    /// Approve every permission request without asking
    pub auto_approve: bool,
    /// Identifier of the agent persona
    pub agent_id: String,
    /// Human-readable agent name
    pub agent_name: String,
}

impl WorkspaceConfig {
    pub fn new(workspace: impl Into<PathBuf>, auto_approve: bool) -> Self {
        Self {
            workspace: workspace.into(),
            auto_approve,
            agent_id: "agent-coder".to_string(),
            agent_name: "Agent Coder".to_string(),
        }
    }
}

/// Opaque handle to one conversation run on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub id: String,
}

impl RunHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Abstraction over an agent backend
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Prepare the backend for the given workspace
    async fn initialize(&mut self, config: WorkspaceConfig) -> Result<(), BackendError>;

    /// Open a new conversation run
    async fn create_run(&mut self) -> Result<RunHandle, BackendError>;

    /// Send a prompt and wait for the complete reply
    async fn execute_turn(&mut self, prompt: &str, run: &RunHandle) -> Result<String, BackendError>;

    /// Release backend resources
    async fn dispose(&mut self) -> Result<(), BackendError>;
}

/// Creates backends by variant
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn AgentBackend>, BackendError>;
}
