//! Session manager
//!
//! Catalogue of all sessions. Guarantees at most one live run per session id
//! and relays lifecycle and message events to external listeners.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::{broadcast, watch};

use ac_core::error::{AcError, SessionError, StoreError};
use ac_core::time::current_time_millis;
use ac_core::traits::{
    ArtifactPublisher, BackendFactory, MessageSink, Provisioner, Store, Summarizer,
};
use ac_core::types::{
    EndpointBinding, EndpointKind, Message, NewMessage, Session, SessionCreateRequest, SessionId,
    SessionStatus,
};
use ac_core::SessionEvent;

use super::Multiplexer;
use crate::orchestrator::{Collaborators, Orchestrator};

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// External collaborators every run is built from
#[derive(Clone)]
pub struct RunEnvironment {
    pub backends: Arc<dyn BackendFactory>,
    pub provisioner: Arc<dyn Provisioner>,
    pub publisher: Arc<dyn ArtifactPublisher>,
}

/// Storage-write callback handed to persisting endpoints.
///
/// Records the message, bumps the session's last activity and then
/// announces the message to event listeners.
pub struct MessageRecorder {
    store: Arc<dyn Store>,
    events: broadcast::Sender<SessionEvent>,
}

#[async_trait]
impl MessageSink for MessageRecorder {
    async fn persist(&self, message: NewMessage) -> Result<(), StoreError> {
        let now = current_time_millis();
        let stored = self.store.insert_message(message, now).await?;
        self.store.touch_session(&stored.session_id, now).await?;

        tracing::trace!(
            "Persisted {} message #{} for session {}",
            stored.endpoint,
            stored.id,
            stored.session_id
        );
        // No listeners is fine
        let _ = self.events.send(SessionEvent::MessagePersisted {
            session_id: stored.session_id,
            endpoint: stored.endpoint,
            sender: stored.sender,
            content: stored.content,
            kind: stored.kind,
        });
        Ok(())
    }
}

/// A run in progress
struct ActiveSession {
    multiplexer: Arc<Multiplexer>,
    /// Flips to true once the run has been cleaned up
    done: watch::Receiver<bool>,
}

/// Catalogue of sessions and their live runs
pub struct SessionManager {
    store: Arc<dyn Store>,
    environment: RunEnvironment,
    active: DashMap<SessionId, ActiveSession>,
    events: broadcast::Sender<SessionEvent>,
    recorder: Arc<MessageRecorder>,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(store: Arc<dyn Store>, environment: RunEnvironment) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let recorder = Arc::new(MessageRecorder {
            store: Arc::clone(&store),
            events: events.clone(),
        });
        Self {
            store,
            environment,
            active: DashMap::new(),
            events,
            recorder,
        }
    }

    /// Persist a new session with its endpoint bindings. Does not start it.
    ///
    /// Every session gets a [`EndpointKind::WebUi`] binding; a kind requested
    /// twice is bound once.
    pub async fn create_session(&self, request: SessionCreateRequest) -> Result<Session, AcError> {
        let now = current_time_millis();
        let session = Session {
            id: SessionId::generate(),
            task: request.task,
            status: SessionStatus::Created,
            workspace: request.workspace,
            branch: request.branch,
            auto_approve: request.auto_approve,
            skip_completion: request.skip_completion,
            backend: request.backend,
            artifact: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_session(&session).await?;

        let mut bound = HashSet::new();
        let requested = request
            .endpoints
            .into_iter()
            .map(|e| (e.kind, e.system_instruction));
        let mandatory = std::iter::once((EndpointKind::WebUi, None));

        for (kind, system_instruction) in requested.chain(mandatory) {
            if !bound.insert(kind) {
                continue;
            }
            let binding = EndpointBinding {
                session_id: session.id.clone(),
                endpoint: kind,
                system_instruction,
                last_status_at: None,
                added_at: now,
            };
            self.store.insert_binding(&binding).await?;
        }

        tracing::info!(
            "Created session {} with endpoints {:?}",
            session.id,
            bound
        );
        Ok(session)
    }

    /// Launch the run of a stored session on the given multiplexer.
    ///
    /// Fails with [`SessionError::AlreadyActive`] while a run for `id` is in
    /// progress. Completed and failed sessions cannot be started again.
    pub async fn start_session(
        self: &Arc<Self>,
        id: &SessionId,
        multiplexer: Arc<Multiplexer>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Result<(), AcError> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.clone()))?;

        if session.status.is_terminal() {
            return Err(SessionError::InvalidStatus {
                id: id.clone(),
                status: session.status,
            }
            .into());
        }

        let (done_tx, done_rx) = watch::channel(false);
        match self.active.entry(id.clone()) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyActive(id.clone()).into()),
            Entry::Vacant(slot) => {
                slot.insert(ActiveSession {
                    multiplexer: Arc::clone(&multiplexer),
                    done: done_rx,
                });
            }
        }

        let prepared = self.prepare_run(&session, &multiplexer, summarizer).await;
        let orchestrator = match prepared {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                self.active.remove(id);
                return Err(e);
            }
        };

        tracing::info!("Starting session {} on {} backend", id, session.backend);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager
                .drive(session, orchestrator, multiplexer, done_tx)
                .await;
        });
        Ok(())
    }

    async fn prepare_run(
        &self,
        session: &Session,
        multiplexer: &Arc<Multiplexer>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Result<Orchestrator, AcError> {
        let backend = self.environment.backends.create(session.backend)?;
        self.set_status(&session.id, SessionStatus::Initializing)
            .await?;

        Ok(Orchestrator::new(
            session.id.clone(),
            &session.workspace,
            session.auto_approve,
            session.backend,
            Arc::clone(multiplexer),
            backend,
            Collaborators {
                provisioner: Arc::clone(&self.environment.provisioner),
                publisher: Arc::clone(&self.environment.publisher),
                summarizer,
            },
        ))
    }

    /// Run the full lifecycle, then clean up whatever happened
    async fn drive(
        self: Arc<Self>,
        session: Session,
        mut orchestrator: Orchestrator,
        multiplexer: Arc<Multiplexer>,
        done: watch::Sender<bool>,
    ) {
        let id = session.id.clone();
        let outcome = AssertUnwindSafe(self.lifecycle(&session, &mut orchestrator))
            .catch_unwind()
            .await;

        let status = match outcome {
            Ok(Ok(())) => {
                tracing::info!("Session {} completed", id);
                SessionStatus::Completed
            }
            Ok(Err(AcError::Session(SessionError::Interrupted(_)))) => {
                tracing::warn!("Session {} interrupted before stop, nothing published", id);
                SessionStatus::Failed
            }
            Ok(Err(e)) => {
                tracing::error!("Session {} failed: {}", id, e);
                SessionStatus::Failed
            }
            Err(_) => {
                tracing::error!("Session {} panicked", id);
                SessionStatus::Failed
            }
        };

        if let Err(e) = self.set_status(&id, status).await {
            tracing::error!("Failed to record final status of session {}: {}", id, e);
        }
        multiplexer.release_all().await;
        orchestrator.dispose().await;
        self.active.remove(&id);
        let _ = done.send(true);
    }

    async fn lifecycle(
        &self,
        session: &Session,
        orchestrator: &mut Orchestrator,
    ) -> Result<(), AcError> {
        orchestrator.initialize().await?;
        self.set_status(&session.id, SessionStatus::Running).await?;
        orchestrator.submit_task(&session.task).await?;
        let exit = orchestrator.run_interactive().await?;
        tracing::debug!("Session {} left the interactive loop: {:?}", session.id, exit);

        let branch = if session.publishes_artifact() {
            session.branch.as_deref()
        } else {
            None
        };
        if let Some(artifact) = orchestrator.finish(branch, &session.task).await? {
            self.store
                .update_session_artifact(&session.id, &artifact, current_time_millis())
                .await?;
            tracing::info!("Session {} published {}", session.id, artifact);
        }
        Ok(())
    }

    /// Persist a status change, then announce it
    async fn set_status(&self, id: &SessionId, status: SessionStatus) -> Result<(), StoreError> {
        self.store
            .update_session_status(id, status, current_time_millis())
            .await?;
        tracing::debug!("Session {} is now {}", id, status);
        let _ = self.events.send(SessionEvent::SessionStatusChanged {
            session_id: id.clone(),
            status,
        });
        Ok(())
    }

    /// Record one message and announce it
    pub async fn persist_message(&self, message: NewMessage) -> Result<(), StoreError> {
        self.recorder.persist(message).await
    }

    /// The storage-write callback for persisting endpoints
    pub fn message_sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.recorder) as Arc<dyn MessageSink>
    }

    /// Push input into the UI endpoint of an active session.
    ///
    /// Returns false when the session has no run or no UI endpoint.
    pub async fn send_user_message(&self, id: &SessionId, text: &str) -> bool {
        let multiplexer = match self.active.get(id) {
            Some(active) => Arc::clone(&active.multiplexer),
            None => return false,
        };
        multiplexer.feed(EndpointKind::WebUi, text).await
    }

    /// Resolves once the run of `id` has finished; immediately if none
    pub async fn wait_for_session(&self, id: &SessionId) {
        let done = self.active.get(id).map(|active| active.done.clone());
        if let Some(mut done) = done {
            // An Err means the run task is gone, which is just as final
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Whether a run for `id` is in progress
    pub fn is_active(&self, id: &SessionId) -> bool {
        self.active.contains_key(id)
    }

    /// Ids of every session with a run in progress
    pub fn active_session_ids(&self) -> Vec<SessionId> {
        self.active.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Release every active run and wait for them to finish.
    ///
    /// Interrupted runs publish nothing and are recorded as failed.
    pub async fn shutdown(&self) {
        let running: Vec<(SessionId, Arc<Multiplexer>)> = self
            .active
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(&entry.multiplexer)))
            .collect();

        for (id, multiplexer) in running {
            tracing::info!("Stopping session {}", id);
            multiplexer.release_all().await;
            self.wait_for_session(&id).await;
        }
    }

    /// Receive status and message events of every session
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Get a stored session
    pub async fn get_session(&self, id: &SessionId) -> Result<Session, AcError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.clone()).into())
    }

    /// All stored sessions
    pub async fn list_sessions(&self) -> Result<Vec<Session>, AcError> {
        Ok(self.store.list_sessions().await?)
    }

    /// Recorded messages of a session, the last `limit` if given
    pub async fn list_messages(
        &self,
        id: &SessionId,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, AcError> {
        Ok(self.store.list_messages(id, limit).await?)
    }

    /// Endpoint bindings of a session
    pub async fn list_bindings(&self, id: &SessionId) -> Result<Vec<EndpointBinding>, AcError> {
        Ok(self.store.list_bindings(id).await?)
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{PersistingEndpoint, UiEndpoint};
    use crate::store::MemoryStore;
    use crate::test_support::{
        FixedPublisher, MockBackend, MockBackendFactory, NoProvisioner, ScriptedEndpoint,
    };
    use ac_core::types::{EndpointRequest, MessageKind, SENDER_AGENT, SENDER_SYSTEM, SENDER_USER};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn manager_with(factory: MockBackendFactory, url: Option<&str>) -> Arc<SessionManager> {
        let environment = RunEnvironment {
            backends: Arc::new(factory),
            provisioner: Arc::new(NoProvisioner),
            publisher: Arc::new(FixedPublisher {
                url: url.map(String::from),
                ..Default::default()
            }),
        };
        Arc::new(SessionManager::new(Arc::new(MemoryStore::new()), environment))
    }

    fn request(task: &str) -> SessionCreateRequest {
        SessionCreateRequest {
            task: task.into(),
            workspace: std::env::temp_dir().display().to_string(),
            branch: None,
            auto_approve: false,
            skip_completion: false,
            backend: Default::default(),
            endpoints: vec![],
        }
    }

    async fn wait(manager: &SessionManager, id: &SessionId) {
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_session(id))
            .await
            .expect("session should finish");
    }

    #[tokio::test]
    async fn test_create_session_binds_ui_once() {
        let manager = manager_with(MockBackendFactory::default(), None);
        let mut req = request("add a README");
        req.endpoints = vec![
            EndpointRequest::new(EndpointKind::Telegram),
            EndpointRequest::new(EndpointKind::WebUi),
            EndpointRequest::new(EndpointKind::Telegram),
        ];

        let session = manager.create_session(req).await.unwrap();
        assert_eq!(session.status, SessionStatus::Created);
        assert!(!manager.is_active(&session.id));

        let kinds: Vec<EndpointKind> = manager
            .list_bindings(&session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.endpoint)
            .collect();
        assert_eq!(kinds, vec![EndpointKind::Telegram, EndpointKind::WebUi]);
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let factory = MockBackendFactory::default();
        let manager = manager_with(factory.clone(), None);
        let session = manager.create_session(request("t")).await.unwrap();

        let mux = Arc::new(Multiplexer::new());
        mux.attach(
            Arc::new(ScriptedEndpoint::hanging(vec![])),
            EndpointKind::Console,
            None,
        )
        .await
        .unwrap();

        let (first, second) = tokio::join!(
            manager.start_session(&session.id, Arc::clone(&mux), None),
            manager.start_session(&session.id, Arc::clone(&mux), None),
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(AcError::Session(SessionError::AlreadyActive(_)))
        )));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert!(manager.is_active(&session.id));

        mux.release_all().await;
        wait(&manager, &session.id).await;
        assert!(!manager.is_active(&session.id));
    }

    #[tokio::test]
    async fn test_run_completes_and_cleans_up() {
        let factory = MockBackendFactory::default();
        let manager = manager_with(factory.clone(), None);
        let session = manager.create_session(request("t")).await.unwrap();
        let mut events = manager.subscribe();

        let console = Arc::new(ScriptedEndpoint::hanging(vec!["stop"]));
        let mux = Arc::new(Multiplexer::new());
        mux.attach(console.clone(), EndpointKind::Console, None)
            .await
            .unwrap();

        manager.start_session(&session.id, mux, None).await.unwrap();
        wait(&manager, &session.id).await;

        let stored = manager.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(console.releases(), 1);
        assert_eq!(factory.backend.disposals.load(Ordering::SeqCst), 1);

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::SessionStatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![
                SessionStatus::Initializing,
                SessionStatus::Running,
                SessionStatus::Completed
            ]
        );

        // Terminal sessions stay terminal
        let err = manager
            .start_session(&session.id, Arc::new(Multiplexer::new()), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AcError::Session(SessionError::InvalidStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_records_failed() {
        let factory = MockBackendFactory {
            backend: MockBackend {
                fail_on_turn: Some(1),
                ..Default::default()
            },
            ..Default::default()
        };
        let manager = manager_with(factory.clone(), None);
        let session = manager.create_session(request("t")).await.unwrap();

        let console = Arc::new(ScriptedEndpoint::hanging(vec![]));
        let mux = Arc::new(Multiplexer::new());
        mux.attach(console.clone(), EndpointKind::Console, None)
            .await
            .unwrap();

        manager.start_session(&session.id, mux, None).await.unwrap();
        wait(&manager, &session.id).await;

        let stored = manager.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(console.releases(), 1);
        assert_eq!(factory.backend.disposals.load(Ordering::SeqCst), 1);
        assert!(!manager.is_active(&session.id));
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_without_publishing() {
        let factory = MockBackendFactory::default();
        let manager = manager_with(factory.clone(), Some("https://github.com/o/r/pull/7"));
        let mut req = request("t");
        req.branch = Some("feature".into());
        let session = manager.create_session(req).await.unwrap();

        let ui = Arc::new(PersistingEndpoint::new(
            Arc::new(UiEndpoint::new()),
            session.id.clone(),
            EndpointKind::WebUi,
            manager.message_sink(),
            true,
        ));
        let mux = Arc::new(Multiplexer::new());
        mux.attach(ui, EndpointKind::WebUi, None).await.unwrap();

        manager.start_session(&session.id, mux, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .expect("shutdown should finish");

        let stored = manager.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(stored.artifact, None);
        // Only the task turn, no description turn
        assert_eq!(factory.backend.prompts().len(), 1);
        assert_eq!(factory.backend.disposals.load(Ordering::SeqCst), 1);
        assert!(!manager.is_active(&session.id));

        let messages = manager.list_messages(&session.id, None).await.unwrap();
        assert!(messages.iter().all(|m| m.kind != MessageKind::Completion));
    }

    #[tokio::test]
    async fn test_status_answer_on_telegram_is_recorded() {
        let manager = manager_with(MockBackendFactory::default(), None);
        let session = manager.create_session(request("t")).await.unwrap();

        let ui = Arc::new(PersistingEndpoint::new(
            Arc::new(UiEndpoint::new()),
            session.id.clone(),
            EndpointKind::WebUi,
            manager.message_sink(),
            true,
        ));
        let telegram = Arc::new(PersistingEndpoint::new(
            Arc::new(ScriptedEndpoint::hanging(vec!["status", "stop"])),
            session.id.clone(),
            EndpointKind::Telegram,
            manager.message_sink(),
            false,
        ));
        let mux = Arc::new(Multiplexer::new());
        mux.attach(ui, EndpointKind::WebUi, None).await.unwrap();
        mux.attach(telegram, EndpointKind::Telegram, None).await.unwrap();

        manager.start_session(&session.id, mux, None).await.unwrap();
        wait(&manager, &session.id).await;

        let messages = manager.list_messages(&session.id, None).await.unwrap();
        let replies: Vec<(&str, &str)> = messages
            .iter()
            .filter(|m| m.endpoint == EndpointKind::Telegram && m.sender != SENDER_USER)
            .map(|m| (m.sender.as_str(), m.content.as_str()))
            .collect();
        assert_eq!(
            replies,
            vec![
                (SENDER_SYSTEM, "Requesting status from agent..."),
                (SENDER_AGENT, "reply 2"),
            ]
        );
        // The reply went to Telegram only
        assert_eq!(
            messages.iter().filter(|m| m.content == "reply 2").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_session_cannot_start() {
        let manager = manager_with(MockBackendFactory::default(), None);
        let err = manager
            .start_session(&SessionId::new("nope"), Arc::new(Multiplexer::new()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AcError::Session(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_wait_without_run_returns_immediately() {
        let manager = manager_with(MockBackendFactory::default(), None);
        wait(&manager, &SessionId::new("idle")).await;
        assert!(!manager.send_user_message(&SessionId::new("idle"), "hi").await);
    }

    #[tokio::test]
    async fn test_ui_input_is_persisted_and_artifact_recorded() {
        let manager = manager_with(
            MockBackendFactory::default(),
            Some("https://github.com/o/r/pull/1"),
        );
        let mut req = request("add a README");
        req.branch = Some("docs".into());
        let session = manager.create_session(req).await.unwrap();

        let ui = Arc::new(UiEndpoint::new());
        let wrapped = Arc::new(PersistingEndpoint::new(
            ui,
            session.id.clone(),
            EndpointKind::WebUi,
            manager.message_sink(),
            true,
        ));
        let mux = Arc::new(Multiplexer::new());
        mux.attach(wrapped, EndpointKind::WebUi, None).await.unwrap();

        manager
            .start_session(&session.id, mux, None)
            .await
            .unwrap();
        assert!(manager.send_user_message(&session.id, "queue do X").await);
        assert!(manager.send_user_message(&session.id, "stop").await);
        wait(&manager, &session.id).await;

        let stored = manager.get_session(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(
            stored.artifact.as_deref(),
            Some("https://github.com/o/r/pull/1")
        );

        let messages = manager.list_messages(&session.id, None).await.unwrap();
        let user: Vec<&str> = messages
            .iter()
            .filter(|m| m.sender == SENDER_USER)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(user, vec!["queue do X", "stop"]);
        assert!(messages
            .iter()
            .any(|m| m.kind == MessageKind::Completion));
        // Each broadcast is recorded once
        assert_eq!(
            messages
                .iter()
                .filter(|m| m.content == "Agent initialized and ready.")
                .count(),
            1
        );
    }
}
