//! Follow a session live

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use ac_core::types::SessionId;
use ac_core::SessionEvent;

use crate::ipc::DaemonClient;
use crate::output::{format_event, format_messages, print_info, print_warning};

/// Print recent history, then stream events until the run ends.
///
/// With `interactive`, lines typed on stdin are sent as user input.
pub async fn watch_command(
    client: &mut DaemonClient,
    session_id: &SessionId,
    history: usize,
    interactive: bool,
) -> Result<()> {
    client.subscribe(session_id).await?;

    if history > 0 {
        let messages = client.list_messages(session_id, Some(history)).await?;
        if !messages.is_empty() {
            println!("{}", format_messages(&messages));
        }
    }

    let session = client.get_session(session_id).await?;
    if session.status.is_terminal() && !client.is_active(session_id).await? {
        print_info(&format!("Session already {}", session.status));
        return Ok(());
    }

    print_info("Watching session (Ctrl+C to stop)");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = interactive;

    loop {
        tokio::select! {
            event = client.next_event() => {
                match event? {
                    Some(event) => {
                        println!("{}", format_event(&event));
                        if let SessionEvent::SessionStatusChanged { status, .. } = event {
                            if status.is_terminal() {
                                break;
                            }
                        }
                    }
                    None => {
                        print_warning("Daemon closed the connection");
                        break;
                    }
                }
            }

            line = stdin.next_line(), if stdin_open => {
                match line? {
                    Some(text) if !text.trim().is_empty() => {
                        if let Err(e) = client.send_user_message(session_id, &text).await {
                            print_warning(&format!("Not sent: {}", e));
                        }
                    }
                    Some(_) => {}
                    None => stdin_open = false,
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = client.unsubscribe(session_id).await;
    Ok(())
}
