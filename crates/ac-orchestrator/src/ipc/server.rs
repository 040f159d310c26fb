//! IPC server implementation
//!
//! Listens on localhost TCP for requests from the CLI. Requests and
//! responses are one JSON object per line; session events are interleaved
//! as extra lines for the sessions a client subscribed to.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use ac_core::ipc::{IpcMessage, IpcRequest, IpcResponse};
use ac_core::ipc_auth::validate_token;
use ac_core::types::SessionId;
use ac_core::{AcError, SessionEvent};

use crate::state::DaemonState;

/// IPC server for CLI communication
///
/// Listens on localhost (127.0.0.1) only - not accessible from network.
pub struct IpcServer {
    /// Address to bind (127.0.0.1:port)
    pub address: String,
    /// Daemon state
    state: Arc<DaemonState>,
    /// Token clients must present before anything but `Ping`
    auth_token: Option<String>,
    /// Cancellation token for shutdown
    shutdown_token: Option<CancellationToken>,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(address: String, state: Arc<DaemonState>) -> Self {
        Self {
            address,
            state,
            auth_token: None,
            shutdown_token: None,
        }
    }

    /// Require clients to authenticate with `token`
    pub fn with_auth_token(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    /// Set the shutdown token (call before run)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown_token = Some(token);
        self
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)
            .await
            .with_context(|| format!("Failed to bind IPC server to {}", self.address))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!("IPC server listening on {}", listener.local_addr()?);
        let shutdown = self.shutdown_token.clone().unwrap_or_default();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    // Only accept connections from localhost
                    if !peer_addr.ip().is_loopback() {
                        tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                        continue;
                    }

                    let state = Arc::clone(&self.state);
                    let auth_token = self.auth_token.clone();
                    let shutdown_token = self.shutdown_token.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_client(stream, state, auth_token, shutdown_token).await
                        {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept IPC connection: {}", e);
                }
            }
        }

        tracing::info!("IPC server stopped");
        Ok(())
    }
}

/// State for a single IPC client connection
struct ClientState {
    authenticated: bool,
    /// Sessions this client receives events for
    subscribed_sessions: HashSet<SessionId>,
}

impl ClientState {
    fn new(authenticated: bool) -> Self {
        Self {
            authenticated,
            subscribed_sessions: HashSet::new(),
        }
    }

    /// Check if this client should receive the given event
    fn should_receive_event(&self, event: &SessionEvent) -> bool {
        self.authenticated && self.subscribed_sessions.contains(event.session_id())
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<DaemonState>,
    auth_token: Option<String>,
    shutdown_token: Option<CancellationToken>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut client_state = ClientState::new(auth_token.is_none());

    // Subscribe to events
    let mut event_rx = state.sessions.subscribe();

    loop {
        tokio::select! {
            // Handle incoming requests
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            line.clear();
                            continue;
                        }

                        let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                            Ok(request) => handle_request_with_state(
                                request,
                                &state,
                                &mut client_state,
                                auth_token.as_deref(),
                                shutdown_token.as_ref(),
                            ).await,
                            Err(e) => IpcResponse::Error {
                                message: format!("Invalid request: {}", e),
                            },
                        };

                        let response_line = IpcMessage::from(response).to_line()?;
                        writer.write_all(response_line.as_bytes()).await?;

                        line.clear();
                    }
                    Err(e) => {
                        return Err(e.into());
                    }
                }
            }

            // Forward events to client (filtered by subscription)
            result = event_rx.recv() => {
                match result {
                    Ok(event) => {
                        if client_state.should_receive_event(&event) {
                            let event_line = IpcMessage::from(event).to_line()?;
                            writer.write_all(event_line.as_bytes()).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("IPC client lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_request_with_state(
    request: IpcRequest,
    state: &DaemonState,
    client_state: &mut ClientState,
    auth_token: Option<&str>,
    shutdown_token: Option<&CancellationToken>,
) -> IpcResponse {
    // Handle requests that touch client state
    match &request {
        IpcRequest::Ping => return IpcResponse::Pong,
        IpcRequest::Authenticate { token } => {
            let valid = auth_token.map_or(true, |expected| validate_token(token, expected));
            if !valid {
                tracing::warn!("IPC client presented an invalid token");
                return IpcResponse::Error {
                    message: "Invalid token".to_string(),
                };
            }
            client_state.authenticated = true;
            return IpcResponse::Ok;
        }
        _ if !client_state.authenticated => {
            return IpcResponse::Error {
                message: "Not authenticated".to_string(),
            };
        }
        IpcRequest::Subscribe { session_id } => {
            client_state.subscribed_sessions.insert(session_id.clone());
            tracing::debug!("Client subscribed to session {}", session_id);
            return IpcResponse::Ok;
        }
        IpcRequest::Unsubscribe { session_id } => {
            client_state.subscribed_sessions.remove(session_id);
            tracing::debug!("Client unsubscribed from session {}", session_id);
            return IpcResponse::Ok;
        }
        _ => {}
    }

    // Handle all other requests
    match handle_request(request, state, shutdown_token).await {
        Ok(response) => response,
        Err(e) => IpcResponse::Error {
            message: e.to_string(),
        },
    }
}

async fn handle_request(
    request: IpcRequest,
    state: &DaemonState,
    shutdown_token: Option<&CancellationToken>,
) -> Result<IpcResponse, AcError> {
    let sessions = &state.sessions;

    let response = match request {
        IpcRequest::CreateSession(create) => {
            let session = sessions.create_session(create).await?;
            IpcResponse::SessionCreated(session)
        }

        IpcRequest::StartSession { session_id } => {
            state.launch(&session_id).await?;
            tracing::info!("Started session {} via IPC", session_id);
            IpcResponse::Ok
        }

        IpcRequest::SendUserMessage { session_id, text } => {
            if sessions.send_user_message(&session_id, &text).await {
                IpcResponse::Ok
            } else {
                IpcResponse::Error {
                    message: format!("Session {} is not running", session_id),
                }
            }
        }

        IpcRequest::IsActive { session_id } => IpcResponse::Active {
            active: sessions.is_active(&session_id),
        },

        IpcRequest::GetSession { session_id } => {
            IpcResponse::Session(sessions.get_session(&session_id).await?)
        }

        IpcRequest::ListSessions => IpcResponse::Sessions {
            sessions: sessions.list_sessions().await?,
        },

        IpcRequest::ListMessages { session_id, limit } => {
            // Unknown ids are an error rather than an empty list
            sessions.get_session(&session_id).await?;
            IpcResponse::Messages {
                messages: sessions.list_messages(&session_id, limit).await?,
            }
        }

        IpcRequest::Shutdown => {
            tracing::info!("Shutdown requested via IPC");
            if let Some(token) = shutdown_token {
                token.cancel();
                IpcResponse::Ok
            } else {
                IpcResponse::Error {
                    message: "Shutdown not supported (no shutdown token configured)".to_string(),
                }
            }
        }

        // Handled in handle_request_with_state
        IpcRequest::Ping => IpcResponse::Pong,
        IpcRequest::Authenticate { .. }
        | IpcRequest::Subscribe { .. }
        | IpcRequest::Unsubscribe { .. } => IpcResponse::Ok,
    };
    Ok(response)
}
