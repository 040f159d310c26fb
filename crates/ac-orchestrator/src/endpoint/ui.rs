//! UI bridge endpoint
//!
//! Input is pushed from outside (the IPC server) through an [`InputFeed`].
//! Output reaches the UI through the "message persisted" event, so the send
//! operations have nothing further to deliver.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use ac_core::error::EndpointError;
use ac_core::traits::{Endpoint, InputFeed};

pub struct UiEndpoint {
    feed: InputFeed,
    inbox: Mutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
}

impl UiEndpoint {
    pub fn new() -> Self {
        let (feed, inbox) = InputFeed::channel();
        Self {
            feed,
            inbox: Mutex::new(inbox),
            closed: CancellationToken::new(),
        }
    }
}

impl Default for UiEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Endpoint for UiEndpoint {
    async fn send_message(&self, _sender: &str, _text: &str) -> Result<(), EndpointError> {
        Ok(())
    }

    async fn send_status(&self, _text: &str) -> Result<(), EndpointError> {
        Ok(())
    }

    async fn receive(&self) -> Result<Option<String>, EndpointError> {
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => Ok(None),
            text = inbox.recv() => Ok(text),
        }
    }

    async fn send_completion(&self, _summary: &str) -> Result<(), EndpointError> {
        Ok(())
    }

    async fn release(&self) -> Result<(), EndpointError> {
        self.closed.cancel();
        Ok(())
    }

    fn input_feed(&self) -> Option<InputFeed> {
        Some(self.feed.clone())
    }
}
