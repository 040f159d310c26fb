//! Endpoint traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::EndpointError;

/// A single communication surface capable of exchanging text with a human
#[async_trait]
pub trait Endpoint: Send + Sync {
    /// Send a message from `sender` to the human
    async fn send_message(&self, sender: &str, text: &str) -> Result<(), EndpointError>;

    /// Send a status update
    async fn send_status(&self, text: &str) -> Result<(), EndpointError>;

    /// Wait for the next human input.
    /// Returns None when the endpoint has reached end-of-stream.
    ///
    /// Must be cancel-safe: dropping the future before it resolves must not
    /// lose input.
    async fn receive(&self) -> Result<Option<String>, EndpointError>;

    /// Post a notification that the task has completed
    async fn send_completion(&self, summary: &str) -> Result<(), EndpointError>;

    /// Release any resources held by the endpoint
    async fn release(&self) -> Result<(), EndpointError>;

    /// Send a message addressed to this endpoint alone, not part of a
    /// broadcast. Wrappers that leave broadcast recording to another
    /// endpoint still record these.
    async fn send_targeted_message(&self, sender: &str, text: &str) -> Result<(), EndpointError> {
        self.send_message(sender, text).await
    }

    /// Status counterpart of [`send_targeted_message`](Self::send_targeted_message)
    async fn send_targeted_status(&self, text: &str) -> Result<(), EndpointError> {
        self.send_status(text).await
    }

    /// Handle for pushing input into this endpoint from outside, if it is
    /// fed by an external push source rather than pulled
    fn input_feed(&self) -> Option<InputFeed> {
        None
    }
}

/// Non-blocking handle that feeds text into a push-driven endpoint
#[derive(Debug, Clone)]
pub struct InputFeed {
    tx: mpsc::UnboundedSender<String>,
}

impl InputFeed {
    /// Create a feed together with the receiving end the endpoint drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue text for the endpoint. Returns false if the endpoint is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.tx.send(text.into()).is_ok()
    }

    /// Whether the receiving endpoint has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
