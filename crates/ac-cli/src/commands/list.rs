//! Listing commands

use anyhow::Result;

use ac_core::types::SessionId;

use crate::ipc::DaemonClient;
use crate::output::{format_messages, format_sessions, print_error};

/// List every known session, newest first
pub async fn sessions_command(client: &mut DaemonClient) -> Result<()> {
    let sessions = match client.list_sessions().await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to list sessions: {}", e));
            return Err(e);
        }
    };

    println!("{}", format_sessions(&sessions));
    Ok(())
}

/// Show the recorded conversation of a session
pub async fn messages_command(
    client: &mut DaemonClient,
    session_id: &SessionId,
    limit: Option<usize>,
) -> Result<()> {
    let messages = match client.list_messages(session_id, limit).await {
        Ok(m) => m,
        Err(e) => {
            print_error(&format!("Failed to list messages: {}", e));
            return Err(e);
        }
    };

    println!("{}", format_messages(&messages));
    Ok(())
}
