//! IPC client for communicating with the daemon
//!
//! Handles authentication automatically using the token the daemon writes
//! to the config directory. Event frames that arrive while a response is
//! awaited are kept and handed out by [`DaemonClient::next_event`].

use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use ac_core::config::AgentCoderConfig;
use ac_core::ipc::{IpcMessage, IpcRequest, IpcResponse};
use ac_core::ipc_auth::{default_token_path, read_token};
use ac_core::types::{Message, Session, SessionCreateRequest, SessionId};
use ac_core::SessionEvent;

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    /// Partial line kept across cancelled reads
    buffer: String,
}

/// Client for the agent-coder daemon
pub struct DaemonClient {
    address: String,
    token_path: PathBuf,
    connection: Option<Connection>,
    authenticated: bool,
    /// Events read while waiting for a response
    pending_events: VecDeque<SessionEvent>,
}

impl DaemonClient {
    /// Client for the address in the default configuration
    pub fn new() -> Self {
        Self::with_address(AgentCoderConfig::default().ipc_address())
    }

    /// Create a new client with custom address
    pub fn with_address(address: String) -> Self {
        Self {
            address,
            token_path: default_token_path(),
            connection: None,
            authenticated: false,
            pending_events: VecDeque::new(),
        }
    }

    /// Read the token from `path` instead of the config directory
    pub fn with_token_path(mut self, path: PathBuf) -> Self {
        self.token_path = path;
        self
    }

    /// Get the address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect to the daemon and authenticate
    pub async fn connect(&mut self) -> Result<()> {
        self.connect_without_auth().await?;
        if !self.authenticated {
            self.authenticate().await?;
        }
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<()> {
        let token = read_token(&self.token_path).with_context(|| {
            format!(
                "Failed to read IPC token from {:?}. Is the daemon running?",
                self.token_path
            )
        })?;

        match self.send_request(IpcRequest::Authenticate { token }).await? {
            IpcResponse::Ok => {
                tracing::debug!("Authenticated with daemon");
                self.authenticated = true;
                Ok(())
            }
            IpcResponse::Error { message } => anyhow::bail!("Authentication failed: {}", message),
            other => anyhow::bail!("Unexpected authentication response: {:?}", other),
        }
    }

    async fn connect_without_auth(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        tracing::debug!("Connecting to daemon at {}", self.address);
        let stream = TcpStream::connect(&self.address).await.with_context(|| {
            format!(
                "Failed to connect to daemon at {}. Is it running?",
                self.address
            )
        })?;

        let (reader, writer) = stream.into_split();
        self.connection = Some(Connection {
            reader: BufReader::new(reader),
            writer,
            buffer: String::new(),
        });
        Ok(())
    }

    /// Check if the daemon is running (no authentication required)
    pub async fn ping(&mut self) -> Result<bool> {
        self.connect_without_auth().await?;
        match self.send_request(IpcRequest::Ping).await {
            Ok(IpcResponse::Pong) => Ok(true),
            _ => Ok(false),
        }
    }

    pub async fn create_session(&mut self, request: SessionCreateRequest) -> Result<Session> {
        match self.request(IpcRequest::CreateSession(request)).await? {
            IpcResponse::SessionCreated(session) => Ok(session),
            other => unexpected(other),
        }
    }

    pub async fn start_session(&mut self, session_id: &SessionId) -> Result<()> {
        let request = IpcRequest::StartSession {
            session_id: session_id.clone(),
        };
        expect_ok(self.request(request).await?)
    }

    /// Push one line of human input into a running session
    pub async fn send_user_message(&mut self, session_id: &SessionId, text: &str) -> Result<()> {
        let request = IpcRequest::SendUserMessage {
            session_id: session_id.clone(),
            text: text.to_string(),
        };
        expect_ok(self.request(request).await?)
    }

    pub async fn is_active(&mut self, session_id: &SessionId) -> Result<bool> {
        let request = IpcRequest::IsActive {
            session_id: session_id.clone(),
        };
        match self.request(request).await? {
            IpcResponse::Active { active } => Ok(active),
            other => unexpected(other),
        }
    }

    pub async fn get_session(&mut self, session_id: &SessionId) -> Result<Session> {
        let request = IpcRequest::GetSession {
            session_id: session_id.clone(),
        };
        match self.request(request).await? {
            IpcResponse::Session(session) => Ok(session),
            other => unexpected(other),
        }
    }

    pub async fn list_sessions(&mut self) -> Result<Vec<Session>> {
        match self.request(IpcRequest::ListSessions).await? {
            IpcResponse::Sessions { sessions } => Ok(sessions),
            other => unexpected(other),
        }
    }

    pub async fn list_messages(
        &mut self,
        session_id: &SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let request = IpcRequest::ListMessages {
            session_id: session_id.clone(),
            limit,
        };
        match self.request(request).await? {
            IpcResponse::Messages { messages } => Ok(messages),
            other => unexpected(other),
        }
    }

    /// Receive events for a session on this connection
    pub async fn subscribe(&mut self, session_id: &SessionId) -> Result<()> {
        let request = IpcRequest::Subscribe {
            session_id: session_id.clone(),
        };
        expect_ok(self.request(request).await?)
    }

    pub async fn unsubscribe(&mut self, session_id: &SessionId) -> Result<()> {
        let request = IpcRequest::Unsubscribe {
            session_id: session_id.clone(),
        };
        expect_ok(self.request(request).await?)
    }

    /// Shutdown the daemon
    pub async fn shutdown(&mut self) -> Result<()> {
        expect_ok(self.request(IpcRequest::Shutdown).await?)
    }

    /// Wait for the next event of a subscribed session.
    ///
    /// Returns `None` when the daemon closes the connection.
    pub async fn next_event(&mut self) -> Result<Option<SessionEvent>> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(Some(event));
        }
        loop {
            match self.read_frame().await? {
                None => return Ok(None),
                Some(IpcMessage::Event(event)) => return Ok(Some(event)),
                Some(other) => tracing::debug!("Ignoring unexpected frame: {:?}", other),
            }
        }
    }

    /// Send an authenticated request
    async fn request(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        self.connect().await?;
        self.send_request(request).await
    }

    async fn send_request(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        let line = IpcMessage::from(request).to_line()?;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;
        connection.writer.write_all(line.as_bytes()).await?;
        connection.writer.flush().await?;

        loop {
            match self.read_frame().await? {
                None => anyhow::bail!("Daemon closed the connection"),
                Some(IpcMessage::Response(response)) => return Ok(response),
                Some(IpcMessage::Event(event)) => self.pending_events.push_back(event),
                Some(IpcMessage::Request(request)) => {
                    tracing::debug!("Ignoring request frame from daemon: {:?}", request)
                }
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Option<IpcMessage>> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Not connected"))?;

        let line = loop {
            if connection.reader.read_line(&mut connection.buffer).await? == 0 {
                return Ok(None);
            }
            let line = std::mem::take(&mut connection.buffer);
            if !line.trim().is_empty() {
                break line;
            }
        };
        let frame = IpcMessage::from_line(&line)
            .with_context(|| format!("Malformed frame from daemon: {}", line.trim()))?;
        Ok(Some(frame))
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_ok(response: IpcResponse) -> Result<()> {
    match response {
        IpcResponse::Ok => Ok(()),
        other => unexpected(other),
    }
}

fn unexpected<T>(response: IpcResponse) -> Result<T> {
    match response {
        IpcResponse::Error { message } => anyhow::bail!("{}", message),
        other => anyhow::bail!("Unexpected response: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-connection fake daemon answering each request with `replies`
    async fn fake_daemon(replies: Vec<Vec<IpcMessage>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);
            for frames in replies {
                let mut line = String::new();
                if reader.read_line(&mut line).await.unwrap() == 0 {
                    return;
                }
                for frame in frames {
                    writer.write_all(frame.to_line().unwrap().as_bytes()).await.unwrap();
                }
            }
        });
        address
    }

    #[tokio::test]
    async fn test_ping_without_token() {
        let address = fake_daemon(vec![vec![IpcResponse::Pong.into()]]).await;
        let mut client = DaemonClient::with_address(address)
            .with_token_path(PathBuf::from("/nonexistent/token"));
        assert!(client.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_token_is_reported() {
        let address = fake_daemon(vec![]).await;
        let mut client = DaemonClient::with_address(address)
            .with_token_path(PathBuf::from("/nonexistent/token"));
        let err = client.list_sessions().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read IPC token"));
    }

    #[tokio::test]
    async fn test_events_before_response_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "secret").unwrap();

        let event = SessionEvent::SessionStatusChanged {
            session_id: SessionId::new("s-1"),
            status: ac_core::SessionStatus::Running,
        };
        let address = fake_daemon(vec![
            vec![IpcResponse::Ok.into()],
            vec![event.clone().into(), IpcResponse::Active { active: true }.into()],
        ])
        .await;

        let mut client = DaemonClient::with_address(address).with_token_path(token_path);
        assert!(client.is_active(&SessionId::new("s-1")).await.unwrap());
        assert_eq!(client.next_event().await.unwrap(), Some(event));
    }

    #[tokio::test]
    async fn test_error_response_becomes_error() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token");
        std::fs::write(&token_path, "secret").unwrap();

        let address = fake_daemon(vec![
            vec![IpcResponse::Ok.into()],
            vec![IpcResponse::Error {
                message: "Session s-9 is not running".into(),
            }
            .into()],
        ])
        .await;

        let mut client = DaemonClient::with_address(address).with_token_path(token_path);
        let err = client
            .send_user_message(&SessionId::new("s-9"), "hello")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Session s-9 is not running");
    }
}
