//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sender label recorded for human input
pub const SENDER_USER: &str = "User";
/// Sender label recorded for status updates and completion notices
pub const SENDER_SYSTEM: &str = "System";
/// Sender label used for agent replies
pub const SENDER_AGENT: &str = "Agent";

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a session ID from an existing token
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random session ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Kind of communication surface attached to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Interactive local terminal
    Console,
    /// Telegram bot chat
    Telegram,
    /// Microsoft Teams incoming webhook
    Teams,
    /// Jira issue comment thread
    Jira,
    /// GitHub pull request comment thread
    #[serde(rename = "GitHubPR")]
    GitHubPr,
    /// Browser UI bridge
    #[serde(rename = "WebUI")]
    WebUi,
}

impl EndpointKind {
    /// Every endpoint kind, in display order
    pub const ALL: [EndpointKind; 6] = [
        EndpointKind::Console,
        EndpointKind::Telegram,
        EndpointKind::Teams,
        EndpointKind::Jira,
        EndpointKind::GitHubPr,
        EndpointKind::WebUi,
    ];

    /// Surfaces that can only post and read no input of their own
    pub fn is_output_only(&self) -> bool {
        matches!(
            self,
            EndpointKind::Teams | EndpointKind::Jira | EndpointKind::GitHubPr
        )
    }

    /// Canonical name as stored and displayed
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::Console => "Console",
            EndpointKind::Telegram => "Telegram",
            EndpointKind::Teams => "Teams",
            EndpointKind::Jira => "Jira",
            EndpointKind::GitHubPr => "GitHubPR",
            EndpointKind::WebUi => "WebUI",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EndpointKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown endpoint kind: {}", s))
    }
}

/// Lifecycle status of a stored session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Created,
    Initializing,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Canonical name as stored and displayed
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "Created",
            SessionStatus::Initializing => "Initializing",
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Failed => "Failed",
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(SessionStatus::Created),
            "Initializing" => Ok(SessionStatus::Initializing),
            "Running" => Ok(SessionStatus::Running),
            "Completed" => Ok(SessionStatus::Completed),
            "Failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Kind of a recorded message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Ordinary conversational message
    Message,
    /// Status update
    Status,
    /// Completion notice
    Completion,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "Message",
            MessageKind::Status => "Status",
            MessageKind::Completion => "Completion",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Message" => Ok(MessageKind::Message),
            "Status" => Ok(MessageKind::Status),
            "Completion" => Ok(MessageKind::Completion),
            other => Err(format!("unknown message kind: {}", other)),
        }
    }
}

/// Agent backend variant a session runs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Copilot,
    Claude,
    Codex,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Copilot => "copilot",
            BackendKind::Claude => "claude",
            BackendKind::Codex => "codex",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copilot" => Ok(BackendKind::Copilot),
            "claude" => Ok(BackendKind::Claude),
            "codex" => Ok(BackendKind::Codex),
            other => Err(format!("unknown backend: {}", other)),
        }
    }
}

/// A persisted unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub task: String,
    pub status: SessionStatus,
    /// Workspace the agent operates on
    pub workspace: String,
    pub branch: Option<String>,
    pub auto_approve: bool,
    /// Skip the completion action (pull request) after the run
    pub skip_completion: bool,
    pub backend: BackendKind,
    /// Resulting artifact, e.g. a pull request URL
    pub artifact: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Session {
    /// Whether the run should end by publishing an artifact
    pub fn publishes_artifact(&self) -> bool {
        !self.skip_completion && self.branch.is_some()
    }
}

/// A message to be recorded, before the store assigns identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub session_id: SessionId,
    pub endpoint: EndpointKind,
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
}

impl NewMessage {
    pub fn new(
        session_id: SessionId,
        endpoint: EndpointKind,
        sender: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            session_id,
            endpoint,
            sender: sender.into(),
            content: content.into(),
            kind,
        }
    }
}

/// A recorded message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned sequence number, increasing in insertion order
    pub id: u64,
    pub session_id: SessionId,
    pub endpoint: EndpointKind,
    pub sender: String,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: u64,
}

/// Association between a session and an attached endpoint kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointBinding {
    pub session_id: SessionId,
    pub endpoint: EndpointKind,
    /// Custom instruction used when summarizing for this endpoint
    pub system_instruction: Option<String>,
    /// When the last status request on this endpoint was answered
    pub last_status_at: Option<u64>,
    pub added_at: u64,
}

/// Endpoint requested at session creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointRequest {
    pub kind: EndpointKind,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

impl EndpointRequest {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            kind,
            system_instruction: None,
        }
    }
}

/// Request to create a new session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateRequest {
    pub task: String,
    pub workspace: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default)]
    pub skip_completion: bool,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub endpoints: Vec<EndpointRequest>,
}

/// Inbound human input paired with the endpoint it arrived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedMessage {
    pub origin: EndpointKind,
    pub text: String,
}
