//! Output formatting utilities for the CLI
//!
//! Tables for sessions and messages, one-line renderings of live session
//! events, and colored status messages.

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use ac_core::time::format_clock;
use ac_core::types::{Message, Session};
use ac_core::SessionEvent;

/// Format a list of sessions as an ASCII table
///
/// Returns "No sessions" if the list is empty.
pub fn format_sessions(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions".to_string();
    }

    #[derive(Tabled)]
    struct SessionRow {
        #[tabled(rename = "SESSION ID")]
        id: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "BACKEND")]
        backend: String,
        #[tabled(rename = "BRANCH")]
        branch: String,
        #[tabled(rename = "TASK")]
        task: String,
        #[tabled(rename = "UPDATED")]
        updated: String,
    }

    let rows: Vec<SessionRow> = sessions
        .iter()
        .map(|s| SessionRow {
            id: s.id.to_string(),
            status: s.status.to_string(),
            backend: s.backend.to_string(),
            branch: s.branch.clone().unwrap_or_else(|| "-".to_string()),
            task: truncate(&s.task, 40),
            updated: format_clock(s.updated_at),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format one session with all of its fields
pub fn format_session(session: &Session) -> String {
    let mut output = String::new();

    output.push_str(&format!("Session: {}\n", session.id));
    output.push_str(&format!("Status: {}\n", session.status));
    output.push_str(&format!("Task: {}\n", session.task));
    output.push_str(&format!("Workspace: {}\n", session.workspace));
    output.push_str(&format!(
        "Branch: {}\n",
        session.branch.as_deref().unwrap_or("-")
    ));
    output.push_str(&format!("Backend: {}\n", session.backend));
    output.push_str(&format!(
        "Auto-approve: {}\n",
        if session.auto_approve { "yes" } else { "no" }
    ));
    if let Some(artifact) = &session.artifact {
        output.push_str(&format!("Artifact: {}\n", artifact));
    }

    output
}

/// Format recorded messages as an ASCII table
pub fn format_messages(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "No messages".to_string();
    }

    #[derive(Tabled)]
    struct MessageRow {
        #[tabled(rename = "#")]
        id: u64,
        #[tabled(rename = "TIME")]
        time: String,
        #[tabled(rename = "ENDPOINT")]
        endpoint: String,
        #[tabled(rename = "SENDER")]
        sender: String,
        #[tabled(rename = "KIND")]
        kind: String,
        #[tabled(rename = "CONTENT")]
        content: String,
    }

    let rows: Vec<MessageRow> = messages
        .iter()
        .map(|m| MessageRow {
            id: m.id,
            time: format_clock(m.timestamp),
            endpoint: m.endpoint.to_string(),
            sender: m.sender.clone(),
            kind: m.kind.to_string(),
            content: m.content.clone(),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

/// Render a live event as a single line
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::SessionStatusChanged { status, .. } => {
            format!("-- session is now {} --", status)
        }
        SessionEvent::MessagePersisted {
            endpoint,
            sender,
            content,
            kind,
            ..
        } => format!("[{}] {} ({}): {}", endpoint, sender, kind, content),
    }
}

/// Truncate a string with ellipsis if too long
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
