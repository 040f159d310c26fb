//! Endpoint-scoped status summaries
//!
//! Answers `status` with a digest of everything recorded since the asking
//! endpoint last asked, produced by a short-lived agent run of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use ac_core::error::AcError;
use ac_core::time::{current_time_millis, format_clock};
use ac_core::traits::{AgentBackend, BackendFactory, Store, Summarizer, WorkspaceConfig};
use ac_core::types::{BackendKind, EndpointKind, Message, SessionId};

pub const NO_NEW_ACTIVITY: &str = "No new activity since your last status request.";
pub const UNKNOWN_ENDPOINT: &str = "This endpoint is not attached to the session.";

pub struct StatusSummarizer {
    store: Arc<dyn Store>,
    backends: Arc<dyn BackendFactory>,
    kind: BackendKind,
    /// Directory the summary agent runs in
    workspace: PathBuf,
}

impl StatusSummarizer {
    pub fn new(
        store: Arc<dyn Store>,
        backends: Arc<dyn BackendFactory>,
        kind: BackendKind,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            backends,
            kind,
            workspace: workspace.into(),
        }
    }

    async fn ask_agent(&self, prompt: &str) -> Result<String, AcError> {
        let mut backend = self.backends.create(self.kind)?;
        let result = run_once(backend.as_mut(), &self.workspace, prompt).await;
        if let Err(e) = backend.dispose().await {
            tracing::warn!("Failed to dispose summary backend: {}", e);
        }
        result
    }
}

async fn run_once(
    backend: &mut dyn AgentBackend,
    workspace: &Path,
    prompt: &str,
) -> Result<String, AcError> {
    let mut config = WorkspaceConfig::new(workspace, true);
    config.agent_id = "status-summarizer".into();
    config.agent_name = "Status Summarizer".into();

    backend.initialize(config).await?;
    let run = backend.create_run().await?;
    Ok(backend.execute_turn(prompt, &run).await?)
}

/// One line per message: `[HH:MM:SS] [sender] (kind): content`
pub fn format_activity_log(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            format!(
                "[{}] [{}] ({}): {}",
                format_clock(m.timestamp),
                m.sender,
                m.kind,
                m.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_prompt(activity_log: &str, instruction: Option<&str>) -> String {
    let prompt = format!(
        "Summarize the following agent activity log concisely.
Focus on: what was accomplished, what is currently in progress, and what remains.
Be brief but informative. Use the same language as the conversation log.

Activity log:
{}",
        activity_log
    );

    match instruction {
        Some(instruction) if !instruction.trim().is_empty() => {
            format!("Additional instruction: {}\n\n{}", instruction, prompt)
        }
        _ => prompt,
    }
}

#[async_trait]
impl Summarizer for StatusSummarizer {
    async fn summarize_for_endpoint(
        &self,
        session_id: &SessionId,
        endpoint: EndpointKind,
        instruction: Option<&str>,
    ) -> Result<String, AcError> {
        let Some(binding) = self.store.get_binding(session_id, endpoint).await? else {
            return Ok(UNKNOWN_ENDPOINT.to_string());
        };

        let since = binding.last_status_at.unwrap_or(binding.added_at);
        let recent = self.store.messages_since(session_id, since).await?;
        self.store
            .mark_status_requested(session_id, endpoint, current_time_millis())
            .await?;

        if recent.is_empty() {
            return Ok(NO_NEW_ACTIVITY.to_string());
        }

        tracing::debug!(
            "Summarizing {} messages for {} on session {}",
            recent.len(),
            endpoint,
            session_id
        );
        let instruction = instruction.or(binding.system_instruction.as_deref());
        let prompt = summary_prompt(&format_activity_log(&recent), instruction);
        self.ask_agent(&prompt).await
    }
}
