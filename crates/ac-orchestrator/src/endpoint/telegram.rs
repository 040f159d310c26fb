//! Telegram bot endpoint
//!
//! Long-polls `getUpdates` in a background task and accepts only messages
//! from the configured chat. Bot commands are translated into the plain
//! command words the orchestrator understands.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use ac_core::config::TelegramCredentials;
use ac_core::error::EndpointError;
use ac_core::traits::Endpoint;
use ac_core::types::EndpointKind;

const API_BASE: &str = "https://api.telegram.org";
/// Telegram rejects messages above 4096 characters
const MAX_MESSAGE_CHARS: usize = 4000;
const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

const BARE_COMMANDS: [&str; 3] = ["status", "stop", "flush"];
const ARGUMENT_COMMANDS: [&str; 3] = ["steer", "queue", "feedback"];

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramEndpoint {
    client: reqwest::Client,
    credentials: TelegramCredentials,
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
}

impl TelegramEndpoint {
    /// Create the endpoint and start polling for updates
    pub fn new(client: reqwest::Client, credentials: TelegramCredentials) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(poll_updates(
            client.clone(),
            credentials.clone(),
            tx,
            cancel.clone(),
        ));

        Self {
            client,
            credentials,
            incoming: Mutex::new(rx),
            cancel,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, self.credentials.bot_token, method)
    }

    async fn send_html(&self, text: String) -> Result<(), EndpointError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({
                "chat_id": self.credentials.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(|e| EndpointError::Http(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let reason = format!("sendMessage returned {}", response.status());
            tracing::warn!("Telegram delivery failed: {}", reason);
            Err(EndpointError::Delivery {
                endpoint: EndpointKind::Telegram,
                reason,
            })
        }
    }
}

#[async_trait]
impl Endpoint for TelegramEndpoint {
    async fn send_message(&self, _sender: &str, text: &str) -> Result<(), EndpointError> {
        self.send_html(message_html(text)).await
    }

    async fn send_status(&self, text: &str) -> Result<(), EndpointError> {
        self.send_html(status_html(text)).await
    }

    async fn receive(&self) -> Result<Option<String>, EndpointError> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            _ = self.cancel.cancelled() => Ok(None),
            text = incoming.recv() => Ok(text),
        }
    }

    async fn send_completion(&self, summary: &str) -> Result<(), EndpointError> {
        self.send_html(completion_html(summary)).await
    }

    async fn release(&self) -> Result<(), EndpointError> {
        self.cancel.cancel();
        Ok(())
    }
}

async fn poll_updates(
    client: reqwest::Client,
    credentials: TelegramCredentials,
    tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) {
    let base = format!("{}/bot{}", API_BASE, credentials.bot_token);
    register_commands(&client, &base).await;

    let mut offset: i64 = 0;
    loop {
        let request = client
            .get(format!("{}/getUpdates", base))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
            ])
            .send();

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = request => result,
        };

        let updates = match result {
            Ok(response) => response.json::<UpdatesResponse>().await,
            Err(e) => Err(e),
        };

        match updates {
            Ok(updates) if updates.ok => {
                for update in updates.result {
                    offset = offset.max(update.update_id + 1);
                    let Some(message) = update.message else { continue };
                    if message.chat.id.to_string() != credentials.chat_id {
                        tracing::debug!("Ignoring Telegram message from chat {}", message.chat.id);
                        continue;
                    }
                    let Some(text) = message.text.as_deref().and_then(translate_command) else {
                        continue;
                    };
                    if tx.send(text).is_err() {
                        return;
                    }
                }
            }
            Ok(_) => {
                tracing::warn!("Telegram getUpdates returned ok=false");
                if sleep_or_cancel(&cancel).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("Telegram polling failed: {}", e);
                if sleep_or_cancel(&cancel).await {
                    break;
                }
            }
        }
    }
    tracing::debug!("Telegram polling stopped");
}

/// Returns true if cancelled while waiting
async fn sleep_or_cancel(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(RETRY_DELAY) => false,
    }
}

async fn register_commands(client: &reqwest::Client, base: &str) {
    let commands = json!({
        "commands": [
            { "command": "status", "description": "Get a progress summary from the agent" },
            { "command": "stop", "description": "Stop the current agent session" },
            { "command": "steer", "description": "Send a course correction to the agent" },
            { "command": "queue", "description": "Add a message to the queue (send later with /flush)" },
            { "command": "flush", "description": "Send all queued messages to the agent" },
            { "command": "feedback", "description": "Send human feedback to the agent" },
        ]
    });
    if let Err(e) = client
        .post(format!("{}/setMyCommands", base))
        .json(&commands)
        .send()
        .await
    {
        tracing::warn!("Failed to register Telegram bot commands: {}", e);
    }
}

/// Map a chat message to orchestrator input.
///
/// `/status`, `/stop` and `/flush` become the bare word, `/steer x`,
/// `/queue x` and `/feedback x` become `"steer x"` etc. Argument commands
/// without an argument and unknown slash commands are dropped. Anything
/// else passes through unchanged.
pub fn translate_command(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let Some(command_line) = trimmed.strip_prefix('/') else {
        return Some(text.to_string());
    };

    let (head, args) = match command_line.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (command_line, ""),
    };
    // Strip the `@botname` suffix used in group chats
    let command = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

    if BARE_COMMANDS.contains(&command.as_str()) {
        Some(command)
    } else if ARGUMENT_COMMANDS.contains(&command.as_str()) {
        (!args.is_empty()).then(|| format!("{} {}", command, args))
    } else {
        None
    }
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Cut raw text to the message limit and escape it. The second value is
/// the marker to append after any closing tags.
fn escape_truncated(text: &str) -> (String, &'static str) {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => (escape_html(&text[..cut]), "\n\n<i>(truncated)</i>"),
        None => (escape_html(text), ""),
    }
}

fn message_html(text: &str) -> String {
    let (body, marker) = escape_truncated(text);
    format!("{}{}", body, marker)
}

fn status_html(text: &str) -> String {
    let (body, marker) = escape_truncated(text);
    format!("<i>Status: {}</i>{}", body, marker)
}

fn completion_html(summary: &str) -> String {
    let (body, marker) = escape_truncated(summary);
    format!("<b>Task Complete</b>\n\n{}{}", body, marker)
}
