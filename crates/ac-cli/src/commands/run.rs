//! Local interactive session
//!
//! Runs one session inside the CLI process with the terminal as an
//! endpoint, next to any extra endpoints requested on the command line.
//! Output-only endpoints (Teams, Jira, GitHubPR) take their input from the
//! terminal instead.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use ac_core::config::AgentCoderConfig;
use ac_core::types::{BackendKind, EndpointKind, EndpointRequest, SessionCreateRequest};
use ac_core::SessionStatus;
use ac_orchestrator::store::SqliteStore;
use ac_orchestrator::workspace::{create_worktree, is_git_repository};
use ac_orchestrator::DaemonState;

use crate::output::{print_error, print_info, print_success, print_warning};

/// Everything `agent-coder run` needs
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repository: PathBuf,
    pub task: String,
    pub branch: Option<String>,
    /// Work in a sibling git worktree for `branch`
    pub worktree: bool,
    pub backend: Option<BackendKind>,
    /// Endpoints attached in addition to the terminal
    pub endpoints: Vec<EndpointKind>,
    /// Extra instruction for status summaries on the added endpoints
    pub instruction: Option<String>,
    pub auto_approve: bool,
    pub skip_completion: bool,
}

impl RunOptions {
    /// The terminal is bound as its own endpoint unless an output-only
    /// endpoint is requested, which then reads from the terminal instead.
    fn create_request(&self, workspace: &std::path::Path, default_backend: BackendKind) -> SessionCreateRequest {
        let mut endpoints = Vec::new();
        if !self.endpoints.iter().any(EndpointKind::is_output_only) {
            endpoints.push(EndpointRequest::new(EndpointKind::Console));
        }
        for kind in &self.endpoints {
            if *kind == EndpointKind::Console
                || *kind == EndpointKind::WebUi
                || endpoints.iter().any(|e| e.kind == *kind)
            {
                continue;
            }
            endpoints.push(EndpointRequest {
                kind: *kind,
                system_instruction: self.instruction.clone(),
            });
        }

        SessionCreateRequest {
            task: self.task.clone(),
            workspace: workspace.display().to_string(),
            branch: self.branch.clone(),
            auto_approve: self.auto_approve,
            skip_completion: self.skip_completion,
            backend: self.backend.unwrap_or(default_backend),
            endpoints,
        }
    }
}

/// Run a session in this process until it completes
pub async fn run_command(config: AgentCoderConfig, options: RunOptions) -> Result<()> {
    let repository = options
        .repository
        .canonicalize()
        .with_context(|| format!("Repository path {:?} does not exist", options.repository))?;
    if !repository.is_dir() {
        anyhow::bail!("Repository path {:?} is not a directory", repository);
    }
    if !is_git_repository(&repository).await {
        print_warning(&format!("{:?} is not a git repository", repository));
        if options.worktree || options.branch.is_some() {
            anyhow::bail!("A branch or worktree requires a git repository");
        }
    }

    let workspace = match (&options.branch, options.worktree) {
        (Some(branch), true) => {
            let path = create_worktree(&repository, branch).await?;
            print_info(&format!("Using worktree {:?}", path));
            path
        }
        (None, true) => anyhow::bail!("--worktree requires --branch"),
        _ => repository.clone(),
    };

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;
    let request = options.create_request(&workspace, config.default_backend);
    let state = DaemonState::new(config, Arc::new(store));

    let session = state.sessions.create_session(request).await?;
    print_info(&format!("Session {}", session.id));

    if let Err(e) = state.launch_with(&session.id, true).await {
        print_error(&format!("Failed to start session: {}", e));
        return Err(e.into());
    }

    let interrupted = tokio::select! {
        _ = state.sessions.wait_for_session(&session.id) => false,
        _ = tokio::signal::ctrl_c() => {
            print_warning("Interrupted, stopping the agent...");
            state.sessions.shutdown().await;
            true
        }
    };

    let finished = state.sessions.get_session(&session.id).await?;
    if interrupted && finished.status == SessionStatus::Failed {
        print_warning("Session interrupted, nothing was published");
        return Ok(());
    }
    match finished.status {
        SessionStatus::Completed => match &finished.artifact {
            Some(url) => print_success(&format!("Session completed: {}", url)),
            None => print_success("Session completed"),
        },
        SessionStatus::Failed => {
            print_error("Session failed");
            anyhow::bail!("session {} failed", finished.id);
        }
        other => print_warning(&format!("Session stopped while {}", other)),
    }
    Ok(())
}
