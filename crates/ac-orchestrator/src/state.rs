//! Global daemon state

use std::sync::Arc;

use ac_core::config::AgentCoderConfig;
use ac_core::error::{AcError, SessionError};
use ac_core::traits::{Store, Summarizer};
use ac_core::types::{EndpointKind, Session, SessionId};

use crate::backend::ProcessBackendFactory;
use crate::endpoint::{EndpointFactory, EndpointOptions, UiEndpoint};
use crate::session::{RunEnvironment, SessionManager};
use crate::summarizer::StatusSummarizer;
use crate::workspace::{DevContainerProvisioner, GitPublisher};

/// Everything a front end needs to drive sessions
pub struct DaemonState {
    /// Configuration
    pub config: AgentCoderConfig,
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Endpoint factory
    pub endpoints: EndpointFactory,
    environment: RunEnvironment,
}

impl DaemonState {
    /// State with the process backends and git/devcontainer helpers
    pub fn new(config: AgentCoderConfig, store: Arc<dyn Store>) -> Self {
        let environment = RunEnvironment {
            backends: Arc::new(ProcessBackendFactory::new(config.backends.clone())),
            provisioner: Arc::new(DevContainerProvisioner::new()),
            publisher: Arc::new(GitPublisher::new()),
        };
        Self::with_environment(config, store, environment)
    }

    /// State with caller-supplied backends and workspace helpers
    pub fn with_environment(
        config: AgentCoderConfig,
        store: Arc<dyn Store>,
        environment: RunEnvironment,
    ) -> Self {
        Self {
            endpoints: EndpointFactory::new(config.endpoints.clone()),
            sessions: Arc::new(SessionManager::new(store, environment.clone())),
            environment,
            config,
        }
    }

    /// Get the session manager
    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    fn summarizer_for(&self, session: &Session) -> Arc<dyn Summarizer> {
        Arc::new(StatusSummarizer::new(
            Arc::clone(self.sessions.store()),
            Arc::clone(&self.environment.backends),
            session.backend,
            &session.workspace,
        ))
    }

    /// Attach every bound endpoint of a stored session and start its run.
    ///
    /// The UI endpoint records the shared broadcasts; every other endpoint
    /// records only what it receives. Endpoints are released again if the
    /// run cannot start.
    pub async fn launch(&self, id: &SessionId) -> Result<(), AcError> {
        self.launch_with(id, false).await
    }

    /// Like [`launch`](Self::launch), optionally letting one output-only
    /// endpoint read input from the local terminal when no console is bound
    pub async fn launch_with(&self, id: &SessionId, console_fallback: bool) -> Result<(), AcError> {
        // Endpoints start pollers and readers, so refuse before building any
        if self.sessions.is_active(id) {
            return Err(SessionError::AlreadyActive(id.clone()).into());
        }
        let session = self.sessions.get_session(id).await?;
        if session.status.is_terminal() {
            return Err(SessionError::InvalidStatus {
                id: id.clone(),
                status: session.status,
            }
            .into());
        }
        let bindings = self.sessions.list_bindings(id).await?;

        let options = EndpointOptions {
            console_fallback,
            ui: Some(Arc::new(UiEndpoint::new())),
        };
        let multiplexer = self
            .endpoints
            .build_multiplexer(
                id,
                &bindings,
                self.sessions.message_sink(),
                EndpointKind::WebUi,
                &options,
            )
            .await?;

        let summarizer = self.summarizer_for(&session);
        if let Err(e) = self
            .sessions
            .start_session(id, multiplexer.clone(), Some(summarizer))
            .await
        {
            multiplexer.release_all().await;
            return Err(e);
        }
        Ok(())
    }
}
