//! Output-oriented endpoints: webhook notifier and comment threads
//!
//! These surfaces can only post. Human input comes from an optional local
//! terminal fallback; without one the endpoint is output-only and reports
//! end-of-stream immediately.

use async_trait::async_trait;
use serde_json::json;

use ac_core::config::{GitHubCredentials, JiraCredentials};
use ac_core::error::EndpointError;
use ac_core::traits::Endpoint;
use ac_core::types::EndpointKind;

use super::ConsoleEndpoint;

/// One outbound call, before rendering
#[derive(Debug, Clone, Copy)]
pub enum Outbound<'a> {
    Message { sender: &'a str, text: &'a str },
    Status(&'a str),
    Completion(&'a str),
}

/// A remote surface that accepts rendered posts
#[async_trait]
pub trait PostTarget: Send + Sync {
    fn kind(&self) -> EndpointKind;

    /// Render an outbound call in the target's markup
    fn render(&self, outbound: Outbound<'_>) -> String;

    async fn post(&self, body: &str) -> Result<(), EndpointError>;
}

/// Endpoint that posts every outbound call to a [`PostTarget`]
pub struct PostingEndpoint<T> {
    target: T,
    fallback: Option<ConsoleEndpoint>,
}

impl<T: PostTarget> PostingEndpoint<T> {
    pub fn new(target: T, fallback: Option<ConsoleEndpoint>) -> Self {
        Self { target, fallback }
    }

    async fn deliver(&self, outbound: Outbound<'_>) -> Result<(), EndpointError> {
        let body = self.target.render(outbound);
        self.target.post(&body).await.map_err(|e| {
            tracing::warn!("Failed to post to {}: {}", self.target.kind(), e);
            EndpointError::Delivery {
                endpoint: self.target.kind(),
                reason: e.to_string(),
            }
        })
    }
}

#[async_trait]
impl<T: PostTarget> Endpoint for PostingEndpoint<T> {
    async fn send_message(&self, sender: &str, text: &str) -> Result<(), EndpointError> {
        if let Some(console) = &self.fallback {
            console.send_message(sender, text).await?;
        }
        self.deliver(Outbound::Message { sender, text }).await
    }

    async fn send_status(&self, text: &str) -> Result<(), EndpointError> {
        if let Some(console) = &self.fallback {
            console.send_status(text).await?;
        }
        self.deliver(Outbound::Status(text)).await
    }

    async fn receive(&self) -> Result<Option<String>, EndpointError> {
        match &self.fallback {
            Some(console) => console.receive().await,
            None => Ok(None),
        }
    }

    async fn send_completion(&self, summary: &str) -> Result<(), EndpointError> {
        if let Some(console) = &self.fallback {
            console.send_completion(summary).await?;
        }
        self.deliver(Outbound::Completion(summary)).await
    }

    async fn release(&self) -> Result<(), EndpointError> {
        if let Some(console) = &self.fallback {
            console.release().await?;
        }
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), EndpointError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(EndpointError::Http(format!("{}: {}", status, body)))
    }
}

fn http_error(e: reqwest::Error) -> EndpointError {
    EndpointError::Http(e.to_string())
}

/// Microsoft Teams incoming webhook, one Adaptive Card per post
pub struct TeamsWebhook {
    client: reqwest::Client,
    webhook_url: String,
}

impl TeamsWebhook {
    pub fn new(client: reqwest::Client, webhook_url: String) -> Self {
        Self {
            client,
            webhook_url,
        }
    }

    pub fn card(text: &str) -> serde_json::Value {
        json!({
            "type": "message",
            "attachments": [{
                "contentType": "application/vnd.microsoft.card.adaptive",
                "content": {
                    "type": "AdaptiveCard",
                    "version": "1.4",
                    "body": [{ "type": "TextBlock", "text": text, "wrap": true }]
                }
            }]
        })
    }
}

#[async_trait]
impl PostTarget for TeamsWebhook {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Teams
    }

    fn render(&self, outbound: Outbound<'_>) -> String {
        match outbound {
            Outbound::Message { sender, text } => format!("**[{}]** {}", sender, text),
            Outbound::Status(text) => format!("_Status:_ {}", text),
            Outbound::Completion(summary) => format!("**Task Complete**\n\n{}", summary),
        }
    }

    async fn post(&self, body: &str) -> Result<(), EndpointError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&Self::card(body))
            .send()
            .await
            .map_err(http_error)?;
        check_status(response).await
    }
}

/// Jira issue comments through the REST v3 API
pub struct JiraComments {
    client: reqwest::Client,
    credentials: JiraCredentials,
}

impl JiraComments {
    pub fn new(client: reqwest::Client, credentials: JiraCredentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub fn comment_url(&self) -> String {
        format!(
            "{}/rest/api/3/issue/{}/comment",
            self.credentials.base_url.trim_end_matches('/'),
            self.credentials.issue_key
        )
    }

    /// Comment body in Atlassian document format
    pub fn document(text: &str) -> serde_json::Value {
        json!({
            "body": {
                "type": "doc",
                "version": 1,
                "content": [{
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": text }]
                }]
            }
        })
    }
}

#[async_trait]
impl PostTarget for JiraComments {
    fn kind(&self) -> EndpointKind {
        EndpointKind::Jira
    }

    fn render(&self, outbound: Outbound<'_>) -> String {
        match outbound {
            Outbound::Message { sender, text } => format!("*[{}]*\n{}", sender, text),
            Outbound::Status(text) => format!("_Status: {}_", text),
            Outbound::Completion(summary) => format!("*Task Complete*\n{}", summary),
        }
    }

    async fn post(&self, body: &str) -> Result<(), EndpointError> {
        let response = self
            .client
            .post(self.comment_url())
            .basic_auth(&self.credentials.email, Some(&self.credentials.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&Self::document(body))
            .send()
            .await
            .map_err(http_error)?;
        check_status(response).await
    }
}

/// Split a pull request URL into `(owner/repo, number)`
pub fn parse_pr_url(url: &str) -> Option<(String, u64)> {
    let path = url.split("://").nth(1).unwrap_or(url);
    let mut segments = path.split('/').skip(1).filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    if segments.next()? != "pull" {
        return None;
    }
    let number = segments.next()?.parse().ok()?;
    Some((format!("{}/{}", owner, repo), number))
}

/// GitHub pull request conversation comments
pub struct GitHubPrComments {
    client: reqwest::Client,
    token: String,
    repo: String,
    number: u64,
}

impl GitHubPrComments {
    pub fn new(client: reqwest::Client, credentials: GitHubCredentials) -> Result<Self, EndpointError> {
        let (repo, number) = parse_pr_url(&credentials.pr_url).ok_or_else(|| EndpointError::Delivery {
            endpoint: EndpointKind::GitHubPr,
            reason: format!("Could not parse PR URL: {}", credentials.pr_url),
        })?;
        Ok(Self {
            client,
            token: credentials.token,
            repo,
            number,
        })
    }
}

#[async_trait]
impl PostTarget for GitHubPrComments {
    fn kind(&self) -> EndpointKind {
        EndpointKind::GitHubPr
    }

    fn render(&self, outbound: Outbound<'_>) -> String {
        match outbound {
            Outbound::Message { sender, text } => format!("**[{}]**\n{}", sender, text),
            Outbound::Status(text) => format!("_Status: {}_", text),
            Outbound::Completion(summary) => format!("## Task Complete\n\n{}", summary),
        }
    }

    async fn post(&self, body: &str) -> Result<(), EndpointError> {
        let url = format!(
            "https://api.github.com/repos/{}/issues/{}/comments",
            self.repo, self.number
        );
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "agent-coder")
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(http_error)?;
        check_status(response).await
    }
}
