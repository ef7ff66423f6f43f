//! Event and user-input plumbing shared by every processor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;

use crate::correlation::InputBroker;
use crate::domain::{ProcessingEvent, UserInputKind, UserInputRequest, UserInputResponse};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Default capacity of the event and request broadcast channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Outward channels plus the pending user-input arena of one processor.
///
/// Handlers receive a `&ProcessorContext` in `process_item`; that is how they
/// report progress and ask the operator for data.
pub struct ProcessorContext<E: ProcessingEvent> {
    events: broadcast::Sender<E>,
    requests: broadcast::Sender<UserInputRequest>,
    inputs: InputBroker<UserInputResponse>,
    /// Set by `cancel_pending`, cleared when the next dispatch begins.
    aborted: AtomicBool,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<E: ProcessingEvent> ProcessorContext<E> {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_CHANNEL_CAPACITY, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(capacity);
        let (requests, _) = broadcast::channel(capacity);
        Self {
            events,
            requests,
            inputs: InputBroker::new(),
            aborted: AtomicBool::new(false),
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// Publish a progress event. Having no subscriber is not an error.
    pub fn emit(&self, event: E) {
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<E> {
        self.events.subscribe()
    }

    pub fn subscribe_user_input_requests(&self) -> broadcast::Receiver<UserInputRequest> {
        self.requests.subscribe()
    }

    /// Ask the operator a question using the kind's default timeout.
    pub async fn request_user_input(&self, kind: UserInputKind) -> UserInputResponse {
        let request = UserInputRequest::new(self.ids.generate_request_id(), kind, self.clock.now());
        self.ask(request).await
    }

    /// Ask with an explicit timeout. `None` waits until answered or canceled.
    pub async fn request_user_input_with_timeout(
        &self,
        kind: UserInputKind,
        timeout: Option<Duration>,
    ) -> UserInputResponse {
        let request = UserInputRequest::new(self.ids.generate_request_id(), kind, self.clock.now())
            .with_timeout(timeout);
        self.ask(request).await
    }

    /// Register the request, publish it, then wait for the correlated answer.
    ///
    /// Registration happens before publication so an immediate answer can
    /// never miss its entry. A question asked after an abort resolves as
    /// canceled without being published.
    pub async fn ask(&self, request: UserInputRequest) -> UserInputResponse {
        let pending = self.inputs.register(request.id);
        // checked after registering: an abort racing past this point still
        // reaches the entry through `cancel_all`
        if self.is_aborted() {
            tracing::debug!(request_id = %request.id, "user input requested after abort");
            self.inputs.cancel(request.id);
            return pending.wait(None).await;
        }
        let timeout = request.timeout;
        tracing::debug!(request_id = %request.id, kind = ?request.kind, "user input requested");
        let _ = self.requests.send(request);
        pending.wait(timeout).await
    }

    pub fn provide_user_input(&self, response: UserInputResponse) -> bool {
        self.inputs.resolve(response)
    }

    /// Resolve every outstanding question as canceled, and every question
    /// asked until the next dispatch begins.
    pub fn cancel_pending(&self) -> usize {
        self.aborted.store(true, Ordering::SeqCst);
        self.inputs.cancel_all()
    }

    /// Has the current dispatch been aborted?
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Forget an abort aimed at an earlier dispatch.
    pub(crate) fn begin_dispatch(&self) {
        self.aborted.store(false, Ordering::SeqCst);
    }

    pub fn pending_requests(&self) -> usize {
        self.inputs.pending_count()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<E> {
        self.events.clone()
    }

    pub(crate) fn request_sender(&self) -> broadcast::Sender<UserInputRequest> {
        self.requests.clone()
    }
}

impl<E: ProcessingEvent> Default for ProcessorContext<E> {
    fn default() -> Self {
        Self::new()
    }
}
