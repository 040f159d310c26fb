//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use ac_core::error::{AcError, BackendError, EndpointError, StoreError};
use ac_core::traits::{
    AgentBackend, ArtifactPublisher, ArtifactRequest, BackendFactory, Endpoint, MessageSink,
    Provisioner, RunHandle, WorkspaceConfig,
};
use ac_core::types::{BackendKind, EndpointKind, NewMessage};

/// Message sink that keeps everything in memory
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<NewMessage>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<NewMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn persist(&self, message: NewMessage) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Database("disk full".into()));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Message(String, String),
    Status(String),
    Completion(String),
}

/// Endpoint replaying a fixed list of inputs
pub struct ScriptedEndpoint {
    inputs: tokio::sync::Mutex<VecDeque<String>>,
    delivered: Mutex<Vec<Delivered>>,
    releases: AtomicUsize,
    /// Block forever instead of reporting end-of-stream
    hang_when_empty: bool,
    fail_sends: bool,
}

impl ScriptedEndpoint {
    pub fn new(inputs: Vec<&str>) -> Self {
        Self {
            inputs: tokio::sync::Mutex::new(inputs.into_iter().map(String::from).collect()),
            delivered: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            hang_when_empty: false,
            fail_sends: false,
        }
    }

    pub fn hanging(inputs: Vec<&str>) -> Self {
        Self {
            hang_when_empty: true,
            ..Self::new(inputs)
        }
    }

    pub fn failing() -> Self {
        Self {
            hang_when_empty: true,
            fail_sends: true,
            ..Self::new(vec![])
        }
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    fn deliver(&self, item: Delivered) -> Result<(), EndpointError> {
        if self.fail_sends {
            return Err(EndpointError::Delivery {
                endpoint: EndpointKind::Teams,
                reason: "webhook returned 500".into(),
            });
        }
        self.delivered.lock().unwrap().push(item);
        Ok(())
    }
}

#[async_trait]
impl Endpoint for ScriptedEndpoint {
    async fn send_message(&self, sender: &str, text: &str) -> Result<(), EndpointError> {
        self.deliver(Delivered::Message(sender.into(), text.into()))
    }

    async fn send_status(&self, text: &str) -> Result<(), EndpointError> {
        self.deliver(Delivered::Status(text.into()))
    }

    async fn receive(&self) -> Result<Option<String>, EndpointError> {
        let next = self.inputs.lock().await.pop_front();
        match next {
            Some(text) => Ok(Some(text)),
            None if self.hang_when_empty => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn send_completion(&self, summary: &str) -> Result<(), EndpointError> {
        self.deliver(Delivered::Completion(summary.into()))
    }

    async fn release(&self) -> Result<(), EndpointError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Agent backend that records prompts and answers `reply <n>`
#[derive(Clone, Default)]
pub struct MockBackend {
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub disposals: Arc<AtomicUsize>,
    /// Fail the turn with this 1-based index
    pub fail_on_turn: Option<usize>,
}

impl MockBackend {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentBackend for MockBackend {
    async fn initialize(&mut self, _config: WorkspaceConfig) -> Result<(), BackendError> {
        Ok(())
    }

    async fn create_run(&mut self) -> Result<RunHandle, BackendError> {
        Ok(RunHandle::new("run-1"))
    }

    async fn execute_turn(&mut self, prompt: &str, _run: &RunHandle) -> Result<String, BackendError> {
        let turn = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if self.fail_on_turn == Some(turn) {
            return Err(BackendError::Turn("model overloaded".into()));
        }
        Ok(format!("reply {}", turn))
    }

    async fn dispose(&mut self) -> Result<(), BackendError> {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out clones of one mock backend
#[derive(Clone, Default)]
pub struct MockBackendFactory {
    pub backend: MockBackend,
    pub created: Arc<AtomicUsize>,
}

impl BackendFactory for MockBackendFactory {
    fn create(&self, _kind: BackendKind) -> Result<Box<dyn AgentBackend>, BackendError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.backend.clone()))
    }
}

/// Provisioner for workspaces without an environment definition
pub struct NoProvisioner;

#[async_trait]
impl Provisioner for NoProvisioner {
    fn has_config(&self, _workspace: &Path) -> bool {
        false
    }

    async fn provision(&self, _workspace: &Path) -> Result<(), AcError> {
        Ok(())
    }
}

/// Publisher that returns a fixed URL, or nothing
#[derive(Default)]
pub struct FixedPublisher {
    pub url: Option<String>,
    pub requests: Mutex<Vec<ArtifactRequest>>,
}

#[async_trait]
impl ArtifactPublisher for FixedPublisher {
    async fn publish(&self, request: &ArtifactRequest) -> Result<Option<String>, AcError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.url.clone())
    }
}
