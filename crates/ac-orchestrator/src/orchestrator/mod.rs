//! Agent run orchestration
//!
//! An [`Orchestrator`] owns exactly one agent run. It provisions the
//! environment, submits the task, then interprets human input from the
//! [`Multiplexer`] until told to stop, and finally publishes the result.
//!
//! ```text
//! Created -> Initializing -> Ready -> Running -> Completed
//!                 \             \        \
//!                  +-------------+--------+----> Failed
//! ```

mod command;
pub mod prompts;

pub use command::Command;

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ac_core::error::{AcError, SessionError};
use ac_core::traits::{
    AgentBackend, ArtifactPublisher, ArtifactRequest, Provisioner, RunHandle, Summarizer,
    WorkspaceConfig,
};
use ac_core::types::{BackendKind, EndpointKind, SessionId, TaggedMessage, SENDER_AGENT};

use crate::session::Multiplexer;

/// Lifecycle state of one orchestrated run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Created,
    Initializing,
    Ready,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Collaborators around the agent backend
#[derive(Clone)]
pub struct Collaborators {
    pub provisioner: Arc<dyn Provisioner>,
    pub publisher: Arc<dyn ArtifactPublisher>,
    pub summarizer: Option<Arc<dyn Summarizer>>,
}

/// What the interactive loop should do after one input
enum Flow {
    Continue,
    Stop,
}

/// Why the interactive loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A human sent `stop`
    Stopped,
    /// Every endpoint reached end of input
    InputExhausted,
    /// The multiplexer was released from outside
    Released,
}

/// Drives one agent run through its lifecycle
pub struct Orchestrator {
    session_id: SessionId,
    workspace: PathBuf,
    auto_approve: bool,
    backend_kind: BackendKind,
    multiplexer: Arc<Multiplexer>,
    backend: Box<dyn AgentBackend>,
    collaborators: Collaborators,
    state: OrchestratorState,
    run: Option<RunHandle>,
    instructions: String,
    queue: VecDeque<String>,
    disposed: bool,
}

impl Orchestrator {
    /// Create an orchestrator for one session in state `Created`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        workspace: impl Into<PathBuf>,
        auto_approve: bool,
        backend_kind: BackendKind,
        multiplexer: Arc<Multiplexer>,
        backend: Box<dyn AgentBackend>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            session_id,
            workspace: workspace.into(),
            auto_approve,
            backend_kind,
            multiplexer,
            backend,
            collaborators,
            state: OrchestratorState::Created,
            run: None,
            instructions: String::new(),
            queue: VecDeque::new(),
            disposed: false,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Session this run belongs to
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Messages waiting for the next flush
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Provision the environment and open the backend run
    pub async fn initialize(&mut self) -> Result<(), AcError> {
        self.expect_state(OrchestratorState::Created)?;
        self.state = OrchestratorState::Initializing;
        let result = self.initialize_inner().await;
        self.settle(result, OrchestratorState::Ready)
    }

    async fn initialize_inner(&mut self) -> Result<(), AcError> {
        let mux = Arc::clone(&self.multiplexer);
        mux.broadcast_status("Checking devcontainer configuration...").await;

        if self.collaborators.provisioner.has_config(&self.workspace) {
            mux.broadcast_status(
                "Starting devcontainer (this may take a few minutes on first run)...",
            )
            .await;
            self.collaborators.provisioner.provision(&self.workspace).await?;
        } else {
            mux.broadcast_status(
                "Warning: No devcontainer.json found. The agent will run without container isolation.",
            )
            .await;
        }

        mux.broadcast_status(&format!("Initializing {} agent...", self.backend_kind))
            .await;

        self.instructions = prompts::base_instructions(&self.workspace);
        self.backend
            .initialize(WorkspaceConfig::new(&self.workspace, self.auto_approve))
            .await?;
        self.run = Some(self.backend.create_run().await?);

        mux.broadcast_status("Agent initialized and ready.").await;
        tracing::info!("Session {} agent ready", self.session_id);
        Ok(())
    }

    /// Submit the task and broadcast the agent's first reply
    pub async fn submit_task(&mut self, task: &str) -> Result<String, AcError> {
        self.expect_state(OrchestratorState::Ready)?;
        self.state = OrchestratorState::Running;
        let prompt = prompts::task_prompt(&self.instructions, &self.workspace, task);
        let result = self.turn_and_broadcast(&prompt).await;
        self.settle_keep(result)
    }

    /// Interpret human input until `stop` or until input runs out.
    ///
    /// Fails with [`SessionError::Interrupted`] when the multiplexer is
    /// released first; the run can then no longer be finished.
    pub async fn run_interactive(&mut self) -> Result<LoopExit, AcError> {
        self.expect_state(OrchestratorState::Running)?;
        let result = match self.interactive_loop().await {
            Ok(LoopExit::Released) => {
                Err(SessionError::Interrupted(self.session_id.clone()).into())
            }
            other => other,
        };
        self.settle_keep(result)
    }

    async fn interactive_loop(&mut self) -> Result<LoopExit, AcError> {
        let mux = Arc::clone(&self.multiplexer);
        mux.broadcast_status(prompts::INTERACTIVE_BANNER).await;

        loop {
            let Some(tagged) = mux.dequeue_tagged().await else {
                if mux.is_released() {
                    tracing::info!("Session {}: endpoints released", self.session_id);
                    return Ok(LoopExit::Released);
                }
                tracing::info!("Session {}: no more input, stopping", self.session_id);
                return Ok(LoopExit::InputExhausted);
            };
            if let Flow::Stop = self.handle_input(tagged).await? {
                return Ok(LoopExit::Stopped);
            }
        }
    }

    async fn handle_input(&mut self, tagged: TaggedMessage) -> Result<Flow, AcError> {
        let Some(command) = Command::parse(&tagged.text) else {
            return Ok(Flow::Continue);
        };
        tracing::debug!("Session {}: {:?} from {}", self.session_id, command, tagged.origin);
        let mux = Arc::clone(&self.multiplexer);

        match command {
            Command::Stop => {
                mux.broadcast_status(prompts::STOPPING).await;
                return Ok(Flow::Stop);
            }
            Command::Status => self.answer_status(tagged.origin).await?,
            Command::Steer(instruction) => {
                mux.broadcast_status(&format!("Steering agent: {}", instruction))
                    .await;
                self.turn_and_broadcast(&prompts::steer_prompt(&instruction))
                    .await?;
            }
            Command::Queue(text) => {
                let status = prompts::queued_status(self.queue.len() + 1, &text);
                self.queue.push_back(text);
                mux.broadcast_status(&status).await;
            }
            Command::Flush => {
                if self.queue.is_empty() {
                    mux.broadcast_status(prompts::QUEUE_EMPTY).await;
                } else {
                    let queued: Vec<String> = self.queue.drain(..).collect();
                    mux.broadcast_status(&prompts::flushing_status(queued.len()))
                        .await;
                    self.turn_and_broadcast(&prompts::flush_prompt(&queued))
                        .await?;
                }
            }
            Command::Feedback(feedback) => {
                mux.broadcast_status(&format!("Sending feedback: {}", feedback))
                    .await;
                self.turn_and_broadcast(&prompts::feedback_prompt(&feedback))
                    .await?;
            }
            Command::Chat(text) => {
                self.turn_and_broadcast(&text).await?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Status reply scoped to the endpoint that asked
    async fn answer_status(&mut self, origin: EndpointKind) -> Result<(), AcError> {
        let mux = Arc::clone(&self.multiplexer);

        let summary = match self.collaborators.summarizer.clone() {
            Some(summarizer) => {
                mux.send_status_to(origin, "Generating status summary...").await;
                let instruction = mux.instruction_for(origin).await;
                summarizer
                    .summarize_for_endpoint(&self.session_id, origin, instruction.as_deref())
                    .await?
            }
            None => {
                mux.send_status_to(origin, "Requesting status from agent...").await;
                self.turn(prompts::STATUS_PROMPT).await?
            }
        };

        mux.send_message_to(origin, SENDER_AGENT, &summary).await;
        Ok(())
    }

    /// Finish the run. With a branch, ask the agent for a description,
    /// publish the result and announce it. Returns the artifact reference.
    pub async fn finish(
        &mut self,
        branch: Option<&str>,
        task: &str,
    ) -> Result<Option<String>, AcError> {
        self.expect_state(OrchestratorState::Running)?;
        let result = match branch {
            Some(branch) => self.publish(branch, task).await,
            None => Ok(None),
        };
        self.settle(result, OrchestratorState::Completed)
    }

    async fn publish(&mut self, branch: &str, task: &str) -> Result<Option<String>, AcError> {
        let mux = Arc::clone(&self.multiplexer);
        mux.broadcast_status("Generating pull request summary...").await;
        let summary = self.turn(prompts::PR_DESCRIPTION_PROMPT).await?;

        let request = ArtifactRequest {
            workspace: self.workspace.clone(),
            branch: branch.to_string(),
            title: prompts::pr_title(task),
            body: summary.clone(),
        };
        let artifact = match self.collaborators.publisher.publish(&request).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::warn!("Session {}: publishing failed: {}", self.session_id, e);
                None
            }
        };

        mux.broadcast_completion(&prompts::completion_text(artifact.as_deref(), &summary))
            .await;
        Ok(artifact)
    }

    /// Release the backend. Later calls do nothing.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Err(e) = self.backend.dispose().await {
            tracing::warn!("Session {}: failed to dispose backend: {}", self.session_id, e);
        }
    }

    async fn turn(&mut self, prompt: &str) -> Result<String, AcError> {
        let run = self.run.as_ref().ok_or(SessionError::NotInitialized)?;
        Ok(self.backend.execute_turn(prompt, run).await?)
    }

    async fn turn_and_broadcast(&mut self, prompt: &str) -> Result<String, AcError> {
        let reply = self.turn(prompt).await?;
        self.multiplexer.broadcast_message(SENDER_AGENT, &reply).await;
        Ok(reply)
    }

    fn expect_state(&self, expected: OrchestratorState) -> Result<(), AcError> {
        if self.state == expected {
            Ok(())
        } else if self.state == OrchestratorState::Created {
            Err(SessionError::NotInitialized.into())
        } else {
            Err(SessionError::InvalidState {
                expected: expected.to_string(),
                actual: self.state.to_string(),
            }
            .into())
        }
    }

    /// Move to `next` on success, `Failed` on error
    fn settle<T>(
        &mut self,
        result: Result<T, AcError>,
        next: OrchestratorState,
    ) -> Result<T, AcError> {
        self.state = if result.is_ok() {
            next
        } else {
            OrchestratorState::Failed
        };
        result
    }

    /// Stay in the current state on success, `Failed` on error
    fn settle_keep<T>(&mut self, result: Result<T, AcError>) -> Result<T, AcError> {
        let current = self.state;
        self.settle(result, current)
    }
}
