//! Agent backend driving an agent CLI, one process per turn

use std::collections::HashSet;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use ac_core::config::{BackendCommand, BackendsConfig};
use ac_core::error::BackendError;
use ac_core::traits::{AgentBackend, BackendFactory, RunHandle, WorkspaceConfig};
use ac_core::types::BackendKind;

/// How long the launch check may take
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ProcessBackend {
    kind: BackendKind,
    command: BackendCommand,
    config: Option<WorkspaceConfig>,
    /// Runs that already took a turn and continue with the resume arguments
    started: HashSet<String>,
}

impl ProcessBackend {
    pub fn new(kind: BackendKind, command: BackendCommand) -> Self {
        Self {
            kind,
            command,
            config: None,
            started: HashSet::new(),
        }
    }

    fn unavailable(&self, e: std::io::Error) -> BackendError {
        if e.kind() == ErrorKind::NotFound {
            BackendError::Unavailable(format!("{} not found in PATH", self.command.program))
        } else {
            BackendError::Unavailable(format!("{}: {}", self.command.program, e))
        }
    }
}

#[async_trait]
impl AgentBackend for ProcessBackend {
    async fn initialize(&mut self, config: WorkspaceConfig) -> Result<(), BackendError> {
        // Only the launch matters; some agents reject --version
        let probe = Command::new(&self.command.program)
            .arg("--version")
            .current_dir(&config.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(self.unavailable(e)),
            Err(_) => {
                return Err(BackendError::Unavailable(format!(
                    "{} did not respond",
                    self.command.program
                )))
            }
        }

        tracing::info!(
            "{} backend ready in {}",
            self.kind,
            config.workspace.display()
        );
        self.config = Some(config);
        Ok(())
    }

    async fn create_run(&mut self) -> Result<RunHandle, BackendError> {
        if self.config.is_none() {
            return Err(BackendError::NotInitialized);
        }
        Ok(RunHandle::new(uuid::Uuid::new_v4().to_string()))
    }

    async fn execute_turn(&mut self, prompt: &str, run: &RunHandle) -> Result<String, BackendError> {
        let config = self.config.as_ref().ok_or(BackendError::NotInitialized)?;
        let resume = self.started.contains(&run.id);
        let workspace = config.workspace.to_string_lossy();
        let (args, prompt_via_stdin) =
            self.command
                .render_args(resume, config.auto_approve, &run.id, &workspace, prompt);

        tracing::debug!(
            "Turn on {} run {} ({} chars, resume: {})",
            self.kind,
            run.id,
            prompt.len(),
            resume
        );

        let mut child = Command::new(&self.command.program)
            .args(&args)
            .current_dir(&config.workspace)
            .stdin(if prompt_via_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let timeout = self.command.turn_timeout;
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| BackendError::Timeout(timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Turn(format!(
                "{} exited with {}: {}",
                self.command.program,
                output.status,
                stderr.trim()
            )));
        }

        self.started.insert(run.id.clone());
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn dispose(&mut self) -> Result<(), BackendError> {
        if self.config.take().is_some() {
            tracing::debug!("{} backend disposed", self.kind);
        }
        self.started.clear();
        Ok(())
    }
}

/// Builds [`ProcessBackend`]s from the configured commands
pub struct ProcessBackendFactory {
    config: BackendsConfig,
}

impl ProcessBackendFactory {
    pub fn new(config: BackendsConfig) -> Self {
        Self { config }
    }
}

impl BackendFactory for ProcessBackendFactory {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn AgentBackend>, BackendError> {
        let command = self.config.get(kind);
        if command.program.trim().is_empty() {
            return Err(BackendError::Unavailable(format!(
                "no program configured for the {} backend",
                kind
            )));
        }
        Ok(Box::new(ProcessBackend::new(kind, command.clone())))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(args: &[&str], resume_args: &[&str]) -> BackendCommand {
        BackendCommand {
            program: "sh".into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            resume_args: resume_args.iter().map(|s| s.to_string()).collect(),
            auto_approve_args: Vec::new(),
            turn_timeout: Duration::from_secs(10),
        }
    }

    async fn ready(command: BackendCommand) -> (ProcessBackend, RunHandle) {
        let mut backend = ProcessBackend::new(BackendKind::Claude, command);
        backend
            .initialize(WorkspaceConfig::new(std::env::temp_dir(), false))
            .await
            .unwrap();
        let run = backend.create_run().await.unwrap();
        (backend, run)
    }

    #[tokio::test]
    async fn test_prompt_in_arguments_then_resume() {
        let (mut backend, run) = ready(shell(
            &["-c", "printf 'first %s' \"$0\"", "{prompt}"],
            &["-c", "printf 'again %s' \"$0\"", "{prompt}"],
        ))
        .await;

        assert_eq!(backend.execute_turn("hello", &run).await.unwrap(), "first hello");
        assert_eq!(backend.execute_turn("more", &run).await.unwrap(), "again more");
    }

    #[tokio::test]
    async fn test_prompt_on_stdin() {
        let (mut backend, run) = ready(shell(&["-c", "cat"], &[])).await;
        let reply = backend.execute_turn("add a README\n", &run).await.unwrap();
        assert_eq!(reply, "add a README");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_turn_error() {
        let (mut backend, run) = ready(shell(&["-c", "echo boom >&2; exit 3"], &[])).await;
        let err = backend.execute_turn("x", &run).await.unwrap_err();
        match err {
            BackendError::Turn(reason) => assert!(reason.contains("boom")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_turn_timeout() {
        let mut command = shell(&["-c", "sleep 5"], &[]);
        command.turn_timeout = Duration::from_millis(100);
        let (mut backend, run) = ready(command).await;
        let err = backend.execute_turn("x", &run).await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let mut backend = ProcessBackend::new(
            BackendKind::Codex,
            BackendCommand {
                program: "agent-coder-no-such-program".into(),
                ..Default::default()
            },
        );
        let err = backend
            .initialize(WorkspaceConfig::new(std::env::temp_dir(), false))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_turn_before_initialize() {
        let mut backend = ProcessBackend::new(BackendKind::Copilot, shell(&["-c", "true"], &[]));
        assert!(matches!(
            backend.create_run().await,
            Err(BackendError::NotInitialized)
        ));
        let err = backend
            .execute_turn("x", &RunHandle::new("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotInitialized));
    }

    #[test]
    fn test_factory_rejects_empty_program() {
        let mut config = BackendsConfig::default();
        config.codex.program = String::new();
        let factory = ProcessBackendFactory::new(config);
        assert!(factory.create(BackendKind::Claude).is_ok());
        assert!(matches!(
            factory.create(BackendKind::Codex),
            Err(BackendError::Unavailable(_))
        ));
    }
}
