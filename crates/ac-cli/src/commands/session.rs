//! Session control commands against the daemon

use anyhow::Result;

use ac_core::types::{SessionCreateRequest, SessionId};

use crate::ipc::DaemonClient;
use crate::output::{format_session, print_error, print_info, print_success};

/// Create a session record, optionally starting it right away
pub async fn create_command(
    client: &mut DaemonClient,
    request: SessionCreateRequest,
    start: bool,
) -> Result<SessionId> {
    let session = client.create_session(request).await?;
    print_success(&format!("Created session {}", session.id));

    if start {
        start_command(client, &session.id).await?;
    }
    Ok(session.id)
}

pub async fn start_command(client: &mut DaemonClient, session_id: &SessionId) -> Result<()> {
    match client.start_session(session_id).await {
        Ok(()) => {
            print_success(&format!("Started session {}", session_id));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to start session {}: {}", session_id, e));
            Err(e)
        }
    }
}

/// Send one line of input as the UI user
pub async fn send_command(
    client: &mut DaemonClient,
    session_id: &SessionId,
    text: &str,
) -> Result<()> {
    client.send_user_message(session_id, text).await?;
    print_success("Sent");
    Ok(())
}

pub async fn show_command(client: &mut DaemonClient, session_id: &SessionId) -> Result<()> {
    let session = client.get_session(session_id).await?;
    print!("{}", format_session(&session));

    let active = client.is_active(session_id).await?;
    if active {
        print_info("A run is in progress");
    }
    Ok(())
}

/// Check whether the daemon answers
pub async fn ping_command(client: &mut DaemonClient) -> Result<()> {
    match client.ping().await {
        Ok(true) => {
            print_success(&format!("Daemon is running at {}", client.address()));
            Ok(())
        }
        Ok(false) => {
            print_error("Daemon did not answer the ping");
            anyhow::bail!("no pong")
        }
        Err(e) => {
            print_error(&format!("Daemon not reachable: {}", e));
            Err(e)
        }
    }
}
