//! Endpoint multiplexer
//!
//! Presents several independently driven endpoints as one: a listener task
//! per endpoint feeds a shared FIFO queue of tagged input, and outbound calls
//! fan out to every endpoint concurrently with per-endpoint failure
//! isolation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ac_core::error::EndpointError;
use ac_core::traits::Endpoint;
use ac_core::types::{EndpointKind, TaggedMessage};

/// Input as produced by one listener
struct Inbound {
    listener: u64,
    message: TaggedMessage,
}

/// An endpoint registered with the multiplexer
struct Attached {
    id: u64,
    kind: EndpointKind,
    instruction: Option<String>,
    endpoint: Arc<dyn Endpoint>,
    cancel: CancellationToken,
    listener: JoinHandle<()>,
}

/// Several endpoints presented as one
pub struct Multiplexer {
    attached: RwLock<Vec<Attached>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<Inbound>>,
    /// Number of listener tasks still running
    live: Arc<watch::Sender<usize>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    released: AtomicBool,
}

impl Multiplexer {
    /// Create a multiplexer with no endpoints attached
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (live, _) = watch::channel(0);
        Self {
            attached: RwLock::new(Vec::new()),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            live: Arc::new(live),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            released: AtomicBool::new(false),
        }
    }

    /// Register an endpoint and start its listener.
    ///
    /// Listeners already running are not disturbed.
    pub async fn attach(
        &self,
        endpoint: Arc<dyn Endpoint>,
        kind: EndpointKind,
        instruction: Option<String>,
    ) -> Result<(), EndpointError> {
        let mut attached = self.attached.write().await;
        if self.released.load(Ordering::SeqCst) {
            return Err(EndpointError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel = self.cancel.child_token();
        self.live.send_modify(|n| *n += 1);
        let listener = tokio::spawn(listen(
            id,
            kind,
            Arc::clone(&endpoint),
            self.inbound_tx.clone(),
            cancel.clone(),
            Arc::clone(&self.live),
        ));

        attached.push(Attached {
            id,
            kind,
            instruction,
            endpoint,
            cancel,
            listener,
        });
        tracing::debug!("Attached {} endpoint (listener {})", kind, id);
        Ok(())
    }

    /// Stop listening to every endpoint of `kind` and release them.
    ///
    /// Input they produced but that was not yet dequeued is discarded.
    pub async fn detach(&self, kind: EndpointKind) -> bool {
        let removed: Vec<Attached> = {
            let mut attached = self.attached.write().await;
            let (removed, kept) = std::mem::take(&mut *attached)
                .into_iter()
                .partition(|a| a.kind == kind);
            *attached = kept;
            removed
        };

        let found = !removed.is_empty();
        shut_down(removed).await;
        found
    }

    /// Kinds of the attached endpoints, in attach order
    pub async fn kinds(&self) -> Vec<EndpointKind> {
        self.attached.read().await.iter().map(|a| a.kind).collect()
    }

    /// Custom summarization instruction of the endpoint of `kind`
    pub async fn instruction_for(&self, kind: EndpointKind) -> Option<String> {
        self.attached
            .read()
            .await
            .iter()
            .find(|a| a.kind == kind)
            .and_then(|a| a.instruction.clone())
    }

    /// The endpoint of `kind`, if attached
    pub async fn endpoint(&self, kind: EndpointKind) -> Option<Arc<dyn Endpoint>> {
        self.attached
            .read()
            .await
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| Arc::clone(&a.endpoint))
    }

    async fn targets(&self) -> Vec<(EndpointKind, Arc<dyn Endpoint>)> {
        self.attached
            .read()
            .await
            .iter()
            .map(|a| (a.kind, Arc::clone(&a.endpoint)))
            .collect()
    }

    /// Send a message to every endpoint. Returns the number of successful
    /// deliveries.
    pub async fn broadcast_message(&self, sender: &str, text: &str) -> usize {
        let targets = self.targets().await;
        let results = join_all(targets.iter().map(|(kind, endpoint)| async move {
            report(*kind, "message", endpoint.send_message(sender, text).await)
        }))
        .await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Send a status update to every endpoint
    pub async fn broadcast_status(&self, text: &str) -> usize {
        let targets = self.targets().await;
        let results = join_all(targets.iter().map(|(kind, endpoint)| async move {
            report(*kind, "status", endpoint.send_status(text).await)
        }))
        .await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Send the completion notice to every endpoint
    pub async fn broadcast_completion(&self, summary: &str) -> usize {
        let targets = self.targets().await;
        let results = join_all(targets.iter().map(|(kind, endpoint)| async move {
            report(*kind, "completion", endpoint.send_completion(summary).await)
        }))
        .await;
        results.into_iter().filter(|ok| *ok).count()
    }

    /// Send a message to the endpoint of `kind` only.
    ///
    /// The endpoint records it even if it does not record broadcasts.
    pub async fn send_message_to(&self, kind: EndpointKind, sender: &str, text: &str) -> bool {
        match self.endpoint(kind).await {
            Some(endpoint) => report(
                kind,
                "message",
                endpoint.send_targeted_message(sender, text).await,
            ),
            None => false,
        }
    }

    /// Send a status update to the endpoint of `kind` only
    pub async fn send_status_to(&self, kind: EndpointKind, text: &str) -> bool {
        match self.endpoint(kind).await {
            Some(endpoint) => report(kind, "status", endpoint.send_targeted_status(text).await),
            None => false,
        }
    }

    /// Push input into a push-driven endpoint without waiting for it to be
    /// consumed. Returns false if no such endpoint accepts input.
    pub async fn feed(&self, kind: EndpointKind, text: &str) -> bool {
        self.endpoint(kind)
            .await
            .and_then(|endpoint| endpoint.input_feed())
            .map(|feed| feed.push(text))
            .unwrap_or(false)
    }

    /// Next inbound message in arrival order.
    ///
    /// Returns None once the multiplexer is released, or when every listener
    /// has finished and the queue is drained.
    pub async fn dequeue_tagged(&self) -> Option<TaggedMessage> {
        let mut rx = self.inbound_rx.lock().await;
        let mut live = self.live.subscribe();

        loop {
            if self.cancel.is_cancelled() {
                return None;
            }

            let inbound = match rx.try_recv() {
                Ok(inbound) => Some(inbound),
                Err(_) if *live.borrow_and_update() == 0 => {
                    // A listener pushes before it stops counting as live
                    match rx.try_recv() {
                        Ok(inbound) => Some(inbound),
                        Err(_) => return None,
                    }
                }
                Err(_) => {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return None,
                        inbound = rx.recv() => inbound,
                        _ = live.changed() => None,
                    }
                }
            };

            if let Some(inbound) = inbound {
                if self.is_attached(inbound.listener).await {
                    return Some(inbound.message);
                }
                tracing::trace!("Dropping input from detached listener {}", inbound.listener);
            }
        }
    }

    async fn is_attached(&self, listener: u64) -> bool {
        self.attached.read().await.iter().any(|a| a.id == listener)
    }

    /// Cancel every listener, then release every endpoint exactly once.
    /// Later calls do nothing.
    pub async fn release_all(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        let attached = std::mem::take(&mut *self.attached.write().await);
        tracing::debug!("Releasing {} endpoints", attached.len());
        shut_down(attached).await;
    }

    /// Whether [`release_all`](Self::release_all) has been called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel listeners, wait for them, then release their endpoints
async fn shut_down(attached: Vec<Attached>) {
    for entry in &attached {
        entry.cancel.cancel();
    }
    for entry in attached {
        if let Err(e) = entry.listener.await {
            tracing::warn!("{} listener ended abnormally: {}", entry.kind, e);
        }
        if let Err(e) = entry.endpoint.release().await {
            tracing::warn!("Failed to release {} endpoint: {}", entry.kind, e);
        }
    }
}

fn report(kind: EndpointKind, what: &str, result: Result<(), EndpointError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to deliver {} to {}: {}", what, kind, e);
            false
        }
    }
}

async fn listen(
    id: u64,
    kind: EndpointKind,
    endpoint: Arc<dyn Endpoint>,
    tx: mpsc::UnboundedSender<Inbound>,
    cancel: CancellationToken,
    live: Arc<watch::Sender<usize>>,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = endpoint.receive() => match result {
                Ok(Some(text)) => {
                    tracing::trace!("Input from {}: {} bytes", kind, text.len());
                    let message = TaggedMessage { origin: kind, text };
                    if tx.send(Inbound { listener: id, message }).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("{} endpoint reached end of input", kind);
                    break;
                }
                Err(EndpointError::Persistence(e)) => {
                    // The input was not recorded, so it is not delivered either
                    tracing::warn!("Dropped input from {}: {}", kind, e);
                }
                Err(e) => {
                    tracing::warn!("{} endpoint failed to receive: {}", kind, e);
                    break;
                }
            }
        }
    }
    live.send_modify(|n| *n = n.saturating_sub(1));
}
