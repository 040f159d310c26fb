//! Traits for the collaborators around an agent run

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::AcError;
use crate::types::{EndpointKind, SessionId};

/// Produces a progress summary scoped to one endpoint
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize activity since the endpoint's last status request
    async fn summarize_for_endpoint(
        &self,
        session_id: &SessionId,
        endpoint: EndpointKind,
        instruction: Option<&str>,
    ) -> Result<String, AcError>;
}

/// Provisions the execution environment the agent runs in
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Whether the workspace declares an environment to provision
    fn has_config(&self, workspace: &Path) -> bool;

    /// Build and start the environment
    async fn provision(&self, workspace: &Path) -> Result<(), AcError>;
}

/// Everything needed to publish a run's result
#[derive(Debug, Clone)]
pub struct ArtifactRequest {
    pub workspace: PathBuf,
    pub branch: String,
    pub title: String,
    pub body: String,
}

/// Publishes the result of a run, e.g. by opening a pull request
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Returns the artifact reference, or None if nothing was published
    async fn publish(&self, request: &ArtifactRequest) -> Result<Option<String>, AcError>;
}
