//! IPC integration tests
//!
//! Drives the daemon's IPC server over a real loopback socket with an
//! in-memory store and a scripted agent backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use ac_core::config::AgentCoderConfig;
use ac_core::error::{AcError, BackendError};
use ac_core::ipc::{IpcMessage, IpcRequest, IpcResponse};
use ac_core::traits::{
    AgentBackend, ArtifactPublisher, ArtifactRequest, BackendFactory, Provisioner, RunHandle,
    WorkspaceConfig,
};
use ac_core::types::{BackendKind, SessionCreateRequest, SessionId};
use ac_core::{SessionEvent, SessionStatus};
use ac_orchestrator::ipc::IpcServer;
use ac_orchestrator::store::MemoryStore;
use ac_orchestrator::{DaemonState, RunEnvironment};

const TOKEN: &str = "test-token";

struct EchoBackend;

#[async_trait]
impl AgentBackend for EchoBackend {
    async fn initialize(&mut self, _config: WorkspaceConfig) -> Result<(), BackendError> {
        Ok(())
    }

    async fn create_run(&mut self) -> Result<RunHandle, BackendError> {
        Ok(RunHandle::new("run-1"))
    }

    async fn execute_turn(&mut self, _prompt: &str, _run: &RunHandle) -> Result<String, BackendError> {
        Ok("done".to_string())
    }

    async fn dispose(&mut self) -> Result<(), BackendError> {
        Ok(())
    }
}

struct EchoFactory;

impl BackendFactory for EchoFactory {
    fn create(&self, _kind: BackendKind) -> Result<Box<dyn AgentBackend>, BackendError> {
        Ok(Box::new(EchoBackend))
    }
}

struct NoProvisioner;

#[async_trait]
impl Provisioner for NoProvisioner {
    fn has_config(&self, _workspace: &Path) -> bool {
        false
    }

    async fn provision(&self, _workspace: &Path) -> Result<(), AcError> {
        Ok(())
    }
}

struct NoPublisher;

#[async_trait]
impl ArtifactPublisher for NoPublisher {
    async fn publish(&self, _request: &ArtifactRequest) -> Result<Option<String>, AcError> {
        Ok(None)
    }
}

/// Start a server on an ephemeral port
async fn start_server() -> (String, CancellationToken) {
    let environment = RunEnvironment {
        backends: Arc::new(EchoFactory),
        provisioner: Arc::new(NoProvisioner),
        publisher: Arc::new(NoPublisher),
    };
    let state = Arc::new(DaemonState::with_environment(
        AgentCoderConfig::default(),
        Arc::new(MemoryStore::new()),
        environment,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let cancel = CancellationToken::new();
    let server = IpcServer::new(address.clone(), state)
        .with_auth_token(TOKEN.to_string())
        .with_shutdown_token(cancel.clone());

    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });

    (address, cancel)
}

/// IPC test client wrapper
struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl TestClient {
    async fn connect(address: &str) -> Self {
        let stream = TcpStream::connect(address)
            .await
            .expect("Failed to connect to IPC server");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
        }
    }

    async fn authenticated(address: &str) -> Self {
        let mut client = Self::connect(address).await;
        let response = client
            .send_request(IpcRequest::Authenticate {
                token: TOKEN.to_string(),
            })
            .await;
        assert!(matches!(response, IpcResponse::Ok), "{:?}", response);
        client
    }

    async fn next_frame(&mut self) -> IpcMessage {
        let mut line = String::new();
        timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("Timeout waiting for frame")
            .expect("Failed to read frame");
        IpcMessage::from_line(&line).expect("Failed to parse frame")
    }

    /// Send a request and return its response, skipping event frames
    async fn send_request(&mut self, request: IpcRequest) -> IpcResponse {
        let line = IpcMessage::from(request).to_line().unwrap();
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();

        loop {
            match self.next_frame().await {
                IpcMessage::Response(response) => return response,
                IpcMessage::Event(_) => continue,
                IpcMessage::Request(request) => panic!("Unexpected request frame: {:?}", request),
            }
        }
    }

    async fn next_event(&mut self) -> SessionEvent {
        loop {
            if let IpcMessage::Event(event) = self.next_frame().await {
                return event;
            }
        }
    }
}

fn create_request(workspace: &Path) -> SessionCreateRequest {
    SessionCreateRequest {
        task: "write a README".into(),
        workspace: workspace.display().to_string(),
        branch: None,
        auto_approve: true,
        skip_completion: true,
        backend: BackendKind::default(),
        endpoints: vec![],
    }
}

#[tokio::test]
async fn test_ping_before_authentication() {
    let (address, _cancel) = start_server().await;
    let mut client = TestClient::connect(&address).await;

    let response = client.send_request(IpcRequest::Ping).await;
    assert!(matches!(response, IpcResponse::Pong));
}

#[tokio::test]
async fn test_requests_rejected_until_authenticated() {
    let (address, _cancel) = start_server().await;
    let mut client = TestClient::connect(&address).await;

    match client.send_request(IpcRequest::ListSessions).await {
        IpcResponse::Error { message } => assert!(message.contains("Not authenticated")),
        other => panic!("Expected error, got {:?}", other),
    }

    let response = client
        .send_request(IpcRequest::Authenticate {
            token: "wrong".into(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Error { .. }));

    let response = client
        .send_request(IpcRequest::Authenticate {
            token: TOKEN.into(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Ok));

    match client.send_request(IpcRequest::ListSessions).await {
        IpcResponse::Sessions { sessions } => assert!(sessions.is_empty()),
        other => panic!("Expected sessions, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_json_gets_error_response() {
    let (address, _cancel) = start_server().await;
    let mut client = TestClient::connect(&address).await;

    client.writer.write_all(b"not json\n").await.unwrap();
    client.writer.flush().await.unwrap();
    match client.next_frame().await {
        IpcMessage::Response(IpcResponse::Error { message }) => {
            assert!(message.contains("Invalid request"))
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_session_is_an_error() {
    let (address, _cancel) = start_server().await;
    let mut client = TestClient::authenticated(&address).await;
    let missing = SessionId::new("missing");

    let response = client
        .send_request(IpcRequest::ListMessages {
            session_id: missing.clone(),
            limit: None,
        })
        .await;
    assert!(matches!(response, IpcResponse::Error { .. }));

    let response = client
        .send_request(IpcRequest::SendUserMessage {
            session_id: missing,
            text: "hello".into(),
        })
        .await;
    match response {
        IpcResponse::Error { message } => assert!(message.contains("not running")),
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_runs_to_completion_over_ipc() {
    let workspace = tempfile::tempdir().unwrap();
    let (address, _cancel) = start_server().await;
    let mut client = TestClient::authenticated(&address).await;

    let session = match client
        .send_request(IpcRequest::CreateSession(create_request(workspace.path())))
        .await
    {
        IpcResponse::SessionCreated(session) => session,
        other => panic!("Expected created session, got {:?}", other),
    };
    assert_eq!(session.status, SessionStatus::Created);

    let response = client
        .send_request(IpcRequest::Subscribe {
            session_id: session.id.clone(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Ok));

    let response = client
        .send_request(IpcRequest::StartSession {
            session_id: session.id.clone(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Ok), "{:?}", response);

    // A second start while the run is live is refused
    let response = client
        .send_request(IpcRequest::StartSession {
            session_id: session.id.clone(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Error { .. }));

    let response = client
        .send_request(IpcRequest::SendUserMessage {
            session_id: session.id.clone(),
            text: "stop".into(),
        })
        .await;
    assert!(matches!(response, IpcResponse::Ok));

    loop {
        match client.next_event().await {
            SessionEvent::SessionStatusChanged { session_id, status } => {
                assert_eq!(session_id, session.id);
                assert_ne!(status, SessionStatus::Failed);
                if status == SessionStatus::Completed {
                    break;
                }
            }
            SessionEvent::MessagePersisted { session_id, .. } => {
                assert_eq!(session_id, session.id);
            }
        }
    }

    match client
        .send_request(IpcRequest::GetSession {
            session_id: session.id.clone(),
        })
        .await
    {
        IpcResponse::Session(stored) => assert_eq!(stored.status, SessionStatus::Completed),
        other => panic!("Expected session, got {:?}", other),
    }

    match client
        .send_request(IpcRequest::ListMessages {
            session_id: session.id.clone(),
            limit: None,
        })
        .await
    {
        IpcResponse::Messages { messages } => {
            assert!(messages.iter().any(|m| m.content == "stop"));
            assert!(messages
                .iter()
                .any(|m| m.content == "Agent initialized and ready."));
        }
        other => panic!("Expected messages, got {:?}", other),
    }

    // Cleanup finishes just after the terminal status is recorded
    let mut active = true;
    for _ in 0..50 {
        match client
            .send_request(IpcRequest::IsActive {
                session_id: session.id.clone(),
            })
            .await
        {
            IpcResponse::Active { active: now } => active = now,
            other => panic!("Expected active flag, got {:?}", other),
        }
        if !active {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!active);
}

#[tokio::test]
async fn test_shutdown_cancels_token() {
    let (address, cancel) = start_server().await;
    let mut client = TestClient::authenticated(&address).await;

    let response = client.send_request(IpcRequest::Shutdown).await;
    assert!(matches!(response, IpcResponse::Ok));
    timeout(Duration::from_secs(1), cancel.cancelled())
        .await
        .expect("Shutdown token was not cancelled");
}
