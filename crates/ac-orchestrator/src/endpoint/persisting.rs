//! Persisting endpoint wrapper
//!
//! Records every message crossing the wrapped endpoint before it is
//! delivered or handed to the caller. A failed write fails the operation and
//! the message is not delivered.

use std::sync::Arc;

use async_trait::async_trait;

use ac_core::error::EndpointError;
use ac_core::traits::{Endpoint, InputFeed, MessageSink};
use ac_core::types::{
    EndpointKind, MessageKind, NewMessage, SessionId, SENDER_SYSTEM, SENDER_USER,
};

/// Decorates an endpoint with durable message recording
pub struct PersistingEndpoint {
    inner: Arc<dyn Endpoint>,
    session_id: SessionId,
    kind: EndpointKind,
    sink: Arc<dyn MessageSink>,
    /// Record outbound traffic. Only one endpoint of a broadcast should.
    persist_outgoing: bool,
}

impl PersistingEndpoint {
    /// Wrap `inner`, recording through `sink` under `session_id` and `kind`
    pub fn new(
        inner: Arc<dyn Endpoint>,
        session_id: SessionId,
        kind: EndpointKind,
        sink: Arc<dyn MessageSink>,
        persist_outgoing: bool,
    ) -> Self {
        Self {
            inner,
            session_id,
            kind,
            sink,
            persist_outgoing,
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    async fn record(&self, sender: &str, content: &str, kind: MessageKind) -> Result<(), EndpointError> {
        let message = NewMessage::new(self.session_id.clone(), self.kind, sender, content, kind);
        self.sink.persist(message).await?;
        Ok(())
    }
}

#[async_trait]
impl Endpoint for PersistingEndpoint {
    async fn send_message(&self, sender: &str, text: &str) -> Result<(), EndpointError> {
        if self.persist_outgoing {
            self.record(sender, text, MessageKind::Message).await?;
        }
        self.inner.send_message(sender, text).await
    }

    async fn send_status(&self, text: &str) -> Result<(), EndpointError> {
        if self.persist_outgoing {
            self.record(SENDER_SYSTEM, text, MessageKind::Status).await?;
        }
        self.inner.send_status(text).await
    }

    async fn receive(&self) -> Result<Option<String>, EndpointError> {
        let received = self.inner.receive().await?;
        if let Some(text) = &received {
            self.record(SENDER_USER, text, MessageKind::Message).await?;
        }
        Ok(received)
    }

    async fn send_completion(&self, summary: &str) -> Result<(), EndpointError> {
        if self.persist_outgoing {
            self.record(SENDER_SYSTEM, summary, MessageKind::Completion).await?;
        }
        self.inner.send_completion(summary).await
    }

    async fn send_targeted_message(&self, sender: &str, text: &str) -> Result<(), EndpointError> {
        self.record(sender, text, MessageKind::Message).await?;
        self.inner.send_message(sender, text).await
    }

    async fn send_targeted_status(&self, text: &str) -> Result<(), EndpointError> {
        self.record(SENDER_SYSTEM, text, MessageKind::Status).await?;
        self.inner.send_status(text).await
    }

    async fn release(&self) -> Result<(), EndpointError> {
        self.inner.release().await
    }

    fn input_feed(&self) -> Option<InputFeed> {
        self.inner.input_feed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSink, ScriptedEndpoint};
    use ac_core::types::SENDER_AGENT;

    fn wrap(
        inner: Arc<ScriptedEndpoint>,
        sink: Arc<RecordingSink>,
        persist_outgoing: bool,
    ) -> PersistingEndpoint {
        PersistingEndpoint::new(
            inner,
            SessionId::new("s-1"),
            EndpointKind::Console,
            sink,
            persist_outgoing,
        )
    }

    #[tokio::test]
    async fn test_outbound_recorded_once_per_call() {
        let inner = Arc::new(ScriptedEndpoint::new(vec![]));
        let sink = Arc::new(RecordingSink::default());
        let endpoint = wrap(inner.clone(), sink.clone(), true);

        endpoint.send_message(SENDER_AGENT, "done").await.unwrap();
        endpoint.send_status("working").await.unwrap();
        endpoint.send_completion("summary").await.unwrap();

        let recorded = sink.messages();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[0].sender, SENDER_AGENT);
        assert_eq!(recorded[0].content, "done");
        assert_eq!(recorded[0].kind, MessageKind::Message);
        assert_eq!(recorded[1].sender, SENDER_SYSTEM);
        assert_eq!(recorded[1].kind, MessageKind::Status);
        assert_eq!(recorded[2].kind, MessageKind::Completion);
        assert!(recorded.iter().all(|m| m.endpoint == EndpointKind::Console));
        assert_eq!(inner.delivered().len(), 3);
    }

    #[tokio::test]
    async fn test_outbound_not_recorded_when_disabled() {
        let inner = Arc::new(ScriptedEndpoint::new(vec!["hello"]));
        let sink = Arc::new(RecordingSink::default());
        let endpoint = wrap(inner.clone(), sink.clone(), false);

        endpoint.send_message(SENDER_AGENT, "done").await.unwrap();
        endpoint.send_status("working").await.unwrap();
        assert!(sink.messages().is_empty());
        assert_eq!(inner.delivered().len(), 2);

        // Inbound is still recorded
        assert_eq!(endpoint.receive().await.unwrap().as_deref(), Some("hello"));
        let recorded = sink.messages();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].sender, SENDER_USER);
        assert_eq!(recorded[0].content, "hello");
    }

    #[tokio::test]
    async fn test_targeted_sends_recorded_even_without_outbound_recording() {
        let inner = Arc::new(ScriptedEndpoint::new(vec![]));
        let sink = Arc::new(RecordingSink::default());
        let endpoint = wrap(inner.clone(), sink.clone(), false);

        endpoint.send_targeted_status("checking").await.unwrap();
        endpoint
            .send_targeted_message(SENDER_AGENT, "all good")
            .await
            .unwrap();

        let recorded = sink.messages();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].kind, MessageKind::Status);
        assert_eq!(recorded[0].content, "checking");
        assert_eq!(recorded[1].sender, SENDER_AGENT);
        assert_eq!(recorded[1].content, "all good");
        assert_eq!(inner.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_end_of_stream_records_nothing() {
        let inner = Arc::new(ScriptedEndpoint::new(vec![]));
        let sink = Arc::new(RecordingSink::default());
        let endpoint = wrap(inner, sink.clone(), true);

        assert_eq!(endpoint.receive().await.unwrap(), None);
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_prevents_delivery() {
        let inner = Arc::new(ScriptedEndpoint::new(vec!["lost"]));
        let sink = Arc::new(RecordingSink::failing());
        let endpoint = wrap(inner.clone(), sink, true);

        let err = endpoint.send_message(SENDER_AGENT, "hi").await.unwrap_err();
        assert!(matches!(err, EndpointError::Persistence(_)));
        assert!(inner.delivered().is_empty());

        let err = endpoint.receive().await.unwrap_err();
        assert!(matches!(err, EndpointError::Persistence(_)));
    }
}
