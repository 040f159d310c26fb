//! Endpoint factory

use std::sync::Arc;

use ac_core::config::EndpointsConfig;
use ac_core::error::{AcError, ConfigError};
use ac_core::traits::{Endpoint, MessageSink};
use ac_core::types::{EndpointBinding, EndpointKind, SessionId};

use super::{
    ConsoleEndpoint, GitHubPrComments, JiraComments, PersistingEndpoint, PostingEndpoint,
    TeamsWebhook, TelegramEndpoint, UiEndpoint,
};
use crate::session::Multiplexer;

/// Per-call choices for building endpoints
#[derive(Default, Clone)]
pub struct EndpointOptions {
    /// Mirror output-only endpoints to the terminal and read input from it
    pub console_fallback: bool,
    /// UI bridge to use for [`EndpointKind::WebUi`]
    pub ui: Option<Arc<UiEndpoint>>,
}

/// Builds endpoint variants from configuration
pub struct EndpointFactory {
    config: EndpointsConfig,
    client: reqwest::Client,
}

impl EndpointFactory {
    /// Create a factory over the endpoint credentials in `config`
    pub fn new(config: EndpointsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Check that everything needed to build `kind` is configured
    pub fn validate(&self, kind: EndpointKind, options: &EndpointOptions) -> Result<(), ConfigError> {
        match kind {
            EndpointKind::Console => Ok(()),
            EndpointKind::Telegram => self.config.telegram.resolve().map(|_| ()),
            EndpointKind::Teams => self.config.teams.resolve().map(|_| ()),
            EndpointKind::Jira => self.config.jira.resolve().map(|_| ()),
            EndpointKind::GitHubPr => self.config.github.resolve().map(|_| ()),
            EndpointKind::WebUi => options
                .ui
                .as_ref()
                .map(|_| ())
                .ok_or_else(|| ConfigError::MissingField("WebUI endpoint requires a UI bridge".into())),
        }
    }

    /// Create the concrete endpoint for `kind`
    pub fn create(
        &self,
        kind: EndpointKind,
        options: &EndpointOptions,
    ) -> Result<Arc<dyn Endpoint>, ConfigError> {
        let fallback = || options.console_fallback.then(ConsoleEndpoint::new);

        let endpoint: Arc<dyn Endpoint> = match kind {
            EndpointKind::Console => Arc::new(ConsoleEndpoint::new()),
            EndpointKind::Telegram => {
                let credentials = self.config.telegram.resolve()?;
                Arc::new(TelegramEndpoint::new(self.client.clone(), credentials))
            }
            EndpointKind::Teams => {
                let url = self.config.teams.resolve()?;
                Arc::new(PostingEndpoint::new(
                    TeamsWebhook::new(self.client.clone(), url),
                    fallback(),
                ))
            }
            EndpointKind::Jira => {
                let credentials = self.config.jira.resolve()?;
                Arc::new(PostingEndpoint::new(
                    JiraComments::new(self.client.clone(), credentials),
                    fallback(),
                ))
            }
            EndpointKind::GitHubPr => {
                let credentials = self.config.github.resolve()?;
                let target = GitHubPrComments::new(self.client.clone(), credentials)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
                Arc::new(PostingEndpoint::new(target, fallback()))
            }
            EndpointKind::WebUi => {
                let ui = options.ui.clone().ok_or_else(|| {
                    ConfigError::MissingField("WebUI endpoint requires a UI bridge".into())
                })?;
                ui as Arc<dyn Endpoint>
            }
        };

        tracing::debug!("Created {} endpoint", kind);
        Ok(endpoint)
    }

    /// Apply the persisting wrapper
    pub fn wrap(
        inner: Arc<dyn Endpoint>,
        session_id: SessionId,
        kind: EndpointKind,
        sink: Arc<dyn MessageSink>,
        persist_outgoing: bool,
    ) -> Arc<dyn Endpoint> {
        Arc::new(PersistingEndpoint::new(
            inner,
            session_id,
            kind,
            sink,
            persist_outgoing,
        ))
    }

    /// The one output-only binding that gets the terminal fallback.
    ///
    /// None unless `console_fallback` is set and no console is bound, so at
    /// most one reader ever takes stdin.
    pub fn fallback_target(
        bindings: &[EndpointBinding],
        console_fallback: bool,
    ) -> Option<EndpointKind> {
        if !console_fallback || bindings.iter().any(|b| b.endpoint == EndpointKind::Console) {
            return None;
        }
        bindings
            .iter()
            .map(|b| b.endpoint)
            .find(EndpointKind::is_output_only)
    }

    /// Build a multiplexer over every bound endpoint of a session.
    ///
    /// Every endpoint records its inbound traffic; only `recorder` records
    /// the shared outbound broadcasts. All credentials are checked before
    /// any endpoint is created.
    pub async fn build_multiplexer(
        &self,
        session_id: &SessionId,
        bindings: &[EndpointBinding],
        sink: Arc<dyn MessageSink>,
        recorder: EndpointKind,
        options: &EndpointOptions,
    ) -> Result<Arc<Multiplexer>, AcError> {
        for binding in bindings {
            self.validate(binding.endpoint, options)?;
        }

        let fallback = Self::fallback_target(bindings, options.console_fallback);
        let multiplexer = Arc::new(Multiplexer::new());
        for binding in bindings {
            let per_endpoint = EndpointOptions {
                console_fallback: fallback == Some(binding.endpoint),
                ui: options.ui.clone(),
            };
            let inner = self.create(binding.endpoint, &per_endpoint)?;
            let wrapped = Self::wrap(
                inner,
                session_id.clone(),
                binding.endpoint,
                Arc::clone(&sink),
                binding.endpoint == recorder,
            );
            multiplexer
                .attach(wrapped, binding.endpoint, binding.system_instruction.clone())
                .await?;
        }
        Ok(multiplexer)
    }
}
