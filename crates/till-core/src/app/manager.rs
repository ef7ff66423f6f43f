//! QueueManager - キューの所有者
//!
//! 順序付きのアイテム列を所有し、同時に 1 つだけ実行ループを動かす
//! （[`super::worker_loop`] 参照）。
//!
//! # 排他制御
//! - アイテム列・処理中マーカー・公開状態の変更はすべて 1 つの `tokio::sync::Mutex` を通す
//! - 呼び出し側と実行ループが途中状態を見ることはない
//!
//! # 観測
//! - `watch`: アイテムのスナップショット、件数、現在の状態、未回答のキュー要求
//! - `broadcast`: すべての状態遷移、すべてのキュー要求、processor のイベント

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, broadcast, watch};

use super::config::QueueConfig;
use super::persistence::{StorageMirror, StorageOp};
use super::worker_loop;
use crate::correlation::InputBroker;
use crate::domain::{
    ItemId, ItemStatus, ProcessingState, QueueInputRequest, QueueInputResponse, QueueItem,
    UserInputRequest, UserInputResponse,
};
use crate::error::QueueError;
use crate::observability::QueueCounts;
use crate::ports::{IdGenerator, QueueProcessor};

/// What the run loop must stop waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    None,
    /// The in-flight item was removed.
    Item(ItemId),
    /// The whole run was canceled.
    Queue,
}

impl Interrupt {
    pub(crate) fn targets(self, id: ItemId) -> bool {
        match self {
            Interrupt::None => false,
            Interrupt::Item(removed) => removed == id,
            Interrupt::Queue => true,
        }
    }
}

pub(crate) struct RunHandle {
    pub(crate) generation: u64,
    pub(crate) canceled: bool,
    pub(crate) interrupt: watch::Sender<Interrupt>,
}

pub(crate) struct QueueState<T: QueueItem> {
    pub(crate) items: VecDeque<T>,
    /// Head item taken by the run loop (confirming, processing or awaiting a decision).
    pub(crate) in_flight: Option<ItemId>,
    /// Items completed since the last clear.
    pub(crate) completed: usize,
    pub(crate) run: Option<RunHandle>,
    next_generation: u64,
}

impl<T: QueueItem> QueueState<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            in_flight: None,
            completed: 0,
            run: None,
            next_generation: 0,
        }
    }

    /// Is run `generation` active and not canceled?
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.generation == generation && !run.canceled)
    }

    pub(crate) fn head_is(&self, id: ItemId) -> bool {
        self.items.front().is_some_and(|item| item.id() == id)
    }

    pub(crate) fn counts(&self) -> QueueCounts {
        QueueCounts::new(self.completed, self.items.len())
    }

    fn position(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    fn in_flight_item(&self) -> Option<T> {
        let id = self.in_flight?;
        self.items.iter().find(|item| item.id() == id).cloned()
    }

    /// Take the head item for dispatch. A removal signal left over from an
    /// earlier dispatch is cleared so a re-enqueued item is not hit by it.
    pub(crate) fn take_head(&mut self) -> Option<T> {
        let item = self.items.front().cloned()?;
        self.in_flight = Some(item.id());
        if let Some(run) = self.run.as_ref() {
            run.interrupt.send_if_modified(|signal| {
                if matches!(signal, Interrupt::Item(_)) {
                    *signal = Interrupt::None;
                    true
                } else {
                    false
                }
            });
        }
        Some(item)
    }

    /// Mark the active run canceled and wake the loop.
    fn cancel_run(&mut self) -> bool {
        match self.run.as_mut() {
            Some(run) if !run.canceled => {
                run.canceled = true;
                run.interrupt.send_replace(Interrupt::Queue);
                true
            }
            _ => false,
        }
    }
}

pub(crate) struct Inner<T: QueueItem> {
    pub(crate) state: Mutex<QueueState<T>>,
    pub(crate) processor: Arc<dyn QueueProcessor<T>>,
    pub(crate) mirror: StorageMirror<T>,
    pub(crate) config: QueueConfig,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) queue_inputs: InputBroker<QueueInputResponse<T>>,

    items_tx: watch::Sender<Vec<T>>,
    counts_tx: watch::Sender<QueueCounts>,
    state_tx: watch::Sender<ProcessingState<T>>,
    transitions_tx: broadcast::Sender<ProcessingState<T>>,
    request_tx: watch::Sender<Option<QueueInputRequest<T>>>,
    requests_tx: broadcast::Sender<QueueInputRequest<T>>,
    running_tx: watch::Sender<bool>,
}

impl<T: QueueItem> Inner<T> {
    pub(crate) async fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().await
    }

    /// Publish the items snapshot and counts. Call with the state lock held.
    pub(crate) fn publish_items(&self, st: &QueueState<T>) {
        self.items_tx.send_replace(st.items.iter().cloned().collect());
        self.counts_tx.send_replace(st.counts());
    }

    /// Publish an item-level transition of run `generation`.
    ///
    /// Dropped once that run is canceled or replaced. Call with the state lock
    /// held so transitions are totally ordered.
    pub(crate) fn publish_item_state(
        &self,
        st: &QueueState<T>,
        generation: u64,
        state: ProcessingState<T>,
    ) -> bool {
        if !st.is_live(generation) {
            tracing::debug!(state = state.label(), "transition of a stopped run dropped");
            return false;
        }
        self.publish_state(state);
        true
    }

    /// Publish unconditionally. Used for queue-level states.
    pub(crate) fn publish_state(&self, state: ProcessingState<T>) {
        match state.item() {
            Some(item) => tracing::debug!(state = state.label(), item_id = %item.id(), "transition"),
            None => tracing::debug!(state = state.label(), "transition"),
        }
        self.state_tx.send_replace(state.clone());
        let _ = self.transitions_tx.send(state);
    }

    pub(crate) fn publish_request(&self, request: QueueInputRequest<T>) {
        self.request_tx.send_replace(Some(request.clone()));
        let _ = self.requests_tx.send(request);
    }

    /// Withdraw the outstanding request if it is still `id`.
    pub(crate) fn clear_request(&self, id: crate::domain::RequestId) {
        self.request_tx.send_if_modified(|current| match current {
            Some(request) if request.id() == id => {
                *current = None;
                true
            }
            _ => false,
        });
    }

    /// Release run `generation`. Called once by the loop when it exits.
    pub(crate) async fn finish_run(&self, generation: u64) {
        let leftover = {
            let mut st = self.lock().await;
            if st.run.as_ref().map(|run| run.generation) != Some(generation) {
                return;
            }
            let leftover = st.in_flight_item();
            st.run = None;
            st.in_flight = None;
            self.running_tx.send_replace(false);
            leftover
        };
        // An interrupted item goes back to pending for a later run.
        if let Some(item) = leftover {
            self.mirror
                .apply(StorageOp::Status(item.id(), ItemStatus::Pending))
                .await;
        }
        tracing::info!(generation, "queue run stopped");
    }
}

/// The queue engine.
///
/// Cheap to clone; clones share the same queue.
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new(processor).config(config).build()?;
/// queue.enqueue(item).await?;
/// queue.start_processing().await;
/// ```
pub struct QueueManager<T: QueueItem> {
    inner: Arc<Inner<T>>,
}

impl<T: QueueItem> Clone for QueueManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: QueueItem> QueueManager<T> {
    pub(crate) fn new(
        processor: Arc<dyn QueueProcessor<T>>,
        mirror: StorageMirror<T>,
        config: QueueConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (items_tx, _) = watch::channel(Vec::new());
        let (counts_tx, _) = watch::channel(QueueCounts::default());
        let (state_tx, _) = watch::channel(ProcessingState::Idle);
        let (transitions_tx, _) = broadcast::channel(capacity);
        let (request_tx, _) = watch::channel(None);
        let (requests_tx, _) = broadcast::channel(capacity);
        let (running_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::new()),
                processor,
                mirror,
                config,
                ids,
                queue_inputs: InputBroker::new(),
                items_tx,
                counts_tx,
                state_tx,
                transitions_tx,
                request_tx,
                requests_tx,
                running_tx,
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    // ────────────────────────────────────────────────────────────────────────
    // Mutations
    // ────────────────────────────────────────────────────────────────────────

    /// Append an item to the tail. Does not start processing.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        {
            let mut st = self.inner.lock().await;
            if st.position(item.id()).is_some() {
                return Err(QueueError::DuplicateItem(item.id()));
            }
            st.items.push_back(item.clone());
            self.inner.publish_items(&st);
        }
        tracing::debug!(item_id = %item.id(), "item enqueued");
        self.inner.mirror.apply(StorageOp::Insert(item)).await;
        Ok(())
    }

    /// Remove one item. Removing the in-flight item aborts it and the run
    /// continues with the next item. Returns `false` if the id is unknown.
    pub async fn remove(&self, id: ItemId) -> bool {
        let aborted = {
            let mut st = self.inner.lock().await;
            let Some(position) = st.position(id) else {
                return false;
            };
            let in_flight = st.in_flight == Some(id);
            let item = st.items.remove(position);
            if in_flight {
                st.in_flight = None;
                if let Some(run) = st.run.as_ref() {
                    run.interrupt.send_replace(Interrupt::Item(id));
                }
                self.inner.queue_inputs.cancel_all();
            }
            self.inner.publish_items(&st);
            item.filter(|_| in_flight)
        };

        if let Some(item) = aborted {
            tracing::info!(item_id = %id, "in-flight item removed, aborting it");
            self.inner.processor.abort(Some(&item)).await;
        }
        self.inner.mirror.apply(StorageOp::Remove(id)).await;
        true
    }

    /// Remove every item. An active run is canceled (`QueueCanceled`).
    pub async fn clear_queue(&self) {
        let in_flight = {
            let mut st = self.inner.lock().await;
            let in_flight = st.in_flight_item();
            if st.cancel_run() {
                self.inner.publish_state(ProcessingState::QueueCanceled);
            }
            self.inner.queue_inputs.cancel_all();
            st.items.clear();
            st.in_flight = None;
            st.completed = 0;
            self.inner.publish_items(&st);
            in_flight
        };

        if let Some(item) = in_flight {
            self.inner.processor.abort(Some(&item)).await;
        }
        self.inner
            .mirror
            .apply(StorageOp::Purge(vec![
                ItemStatus::Pending,
                ItemStatus::Processing,
                ItemStatus::Failed,
                ItemStatus::Cancelled,
            ]))
            .await;
    }

    /// Start the run loop. Returns `false` if a run is already active
    /// (including a canceled run that is still winding down).
    pub async fn start_processing(&self) -> bool {
        let (generation, interrupt_rx) = {
            let mut st = self.inner.lock().await;
            if st.run.is_some() {
                return false;
            }
            st.next_generation += 1;
            let generation = st.next_generation;
            let (interrupt, interrupt_rx) = watch::channel(Interrupt::None);
            st.run = Some(RunHandle {
                generation,
                canceled: false,
                interrupt,
            });
            self.inner.running_tx.send_replace(true);
            (generation, interrupt_rx)
        };

        tracing::info!(generation, "queue run started");
        tokio::spawn(worker_loop::run(
            Arc::clone(&self.inner),
            generation,
            interrupt_rx,
        ));
        true
    }

    /// Abort whatever is in flight and cancel the run (`QueueCanceled`).
    ///
    /// Items stay in the collection; the loop does not resume on its own.
    /// Returns the processor's verdict on the abort.
    pub async fn abort(&self) -> bool {
        let current = {
            let mut st = self.inner.lock().await;
            let current = st.in_flight_item().or_else(|| st.items.front().cloned());
            st.cancel_run();
            self.inner.queue_inputs.cancel_all();
            self.inner.publish_state(ProcessingState::QueueCanceled);
            current
        };

        tracing::info!("queue aborted");
        self.inner.processor.abort(current.as_ref()).await
    }

    /// Replace the in-flight item's data, keeping its position. Ignored
    /// (returns `false`) when nothing is in flight or the id differs.
    pub async fn replace_current_item(&self, item: T) -> bool {
        {
            let mut st = self.inner.lock().await;
            if st.in_flight != Some(item.id()) {
                return false;
            }
            match st.items.front_mut() {
                Some(head) if head.id() == item.id() => *head = item.clone(),
                _ => return false,
            }
            self.inner.publish_items(&st);
        }
        self.inner.mirror.apply(StorageOp::Update(item)).await;
        true
    }

    /// Answer the outstanding queue input request. Unknown or stale ids are
    /// ignored (`false`).
    pub fn provide_queue_input(&self, response: QueueInputResponse<T>) -> bool {
        self.inner.queue_inputs.resolve(response)
    }

    /// Forward an answer to the processor's outstanding user input request.
    pub fn provide_user_input(&self, response: UserInputResponse) -> bool {
        self.inner.processor.provide_user_input(response)
    }

    /// Load `Pending` items from storage (resume after restart). Items already
    /// in the queue are kept. Returns how many were added.
    pub async fn restore(&self) -> Result<usize, QueueError> {
        let Some(storage) = self.inner.mirror.storage() else {
            return Ok(0);
        };
        let stored = storage.get_all_by_status(&[ItemStatus::Pending]).await?;

        let mut st = self.inner.lock().await;
        let mut added = 0;
        for item in stored {
            if st.position(item.id()).is_none() {
                st.items.push_back(item);
                added += 1;
            }
        }
        self.inner.publish_items(&st);
        tracing::info!(added, "queue restored from storage");
        Ok(added)
    }

    /// Purge `Completed` entries from storage and reset the progress counters.
    pub async fn clear_completed(&self) -> Result<usize, QueueError> {
        {
            let mut st = self.inner.lock().await;
            st.completed = 0;
            self.inner.publish_items(&st);
        }
        let Some(storage) = self.inner.mirror.storage() else {
            return Ok(0);
        };
        self.inner.mirror.flush().await;
        Ok(storage.remove_by_status(&[ItemStatus::Completed]).await?)
    }

    /// Wait until background storage writes issued so far are applied.
    pub async fn flush_storage(&self) {
        self.inner.mirror.flush().await;
    }

    // ────────────────────────────────────────────────────────────────────────
    // Observation
    // ────────────────────────────────────────────────────────────────────────

    pub fn subscribe_items(&self) -> watch::Receiver<Vec<T>> {
        self.inner.items_tx.subscribe()
    }

    pub fn subscribe_counts(&self) -> watch::Receiver<QueueCounts> {
        self.inner.counts_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProcessingState<T>> {
        self.inner.state_tx.subscribe()
    }

    /// Every transition, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<ProcessingState<T>> {
        self.inner.transitions_tx.subscribe()
    }

    /// The outstanding queue input request, if any.
    pub fn subscribe_queue_input(&self) -> watch::Receiver<Option<QueueInputRequest<T>>> {
        self.inner.request_tx.subscribe()
    }

    /// Every queue input request, in order.
    pub fn subscribe_queue_input_requests(&self) -> broadcast::Receiver<QueueInputRequest<T>> {
        self.inner.requests_tx.subscribe()
    }

    pub fn subscribe_processor_events(&self) -> broadcast::Receiver<T::Event> {
        self.inner.processor.subscribe_events()
    }

    pub fn subscribe_user_input_requests(&self) -> broadcast::Receiver<UserInputRequest> {
        self.inner.processor.subscribe_user_input_requests()
    }

    pub fn items(&self) -> Vec<T> {
        self.inner.items_tx.borrow().clone()
    }

    pub fn counts(&self) -> QueueCounts {
        *self.inner.counts_tx.borrow()
    }

    pub fn current_state(&self) -> ProcessingState<T> {
        self.inner.state_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        *self.inner.running_tx.borrow()
    }

    /// Wait until no run is active.
    pub async fn wait_until_stopped(&self) {
        let mut running = self.inner.running_tx.subscribe();
        let _ = running.wait_for(|running| !running).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{QueueBuilder, QueueConfig};
    use crate::domain::{
        ConfirmTimeoutAction, PersistenceStrategy, ProcessingError, ProcessorStartMode,
        QueueTimeoutPolicy, RequestId,
    };
    use crate::impls::InMemoryQueueStorage;
    use crate::ports::QueueStorage;
    use crate::testing::{Script, Step, TestEvent, TestItem, TestKind, scripted};
    use std::time::Duration;

    type Transitions = broadcast::Receiver<ProcessingState<TestItem>>;

    fn queue(config: QueueConfig) -> (QueueManager<TestItem>, Arc<Script>) {
        let (processor, script) = scripted();
        let queue = QueueBuilder::new(processor).config(config).build().unwrap();
        (queue, script)
    }

    fn confirming() -> QueueConfig {
        QueueConfig::default().with_start_mode(ProcessorStartMode::Confirmation)
    }

    fn item(label: &str) -> TestItem {
        TestItem::new(label, TestKind::A)
    }

    fn describe(state: &ProcessingState<TestItem>) -> String {
        match state.item() {
            Some(item) => format!("{}:{}", state.label(), item.label),
            None => state.label().to_string(),
        }
    }

    async fn next(rx: &mut Transitions) -> ProcessingState<TestItem> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("transition in time")
            .expect("transitions channel open")
    }

    /// Transitions up to and including the one that ends the run.
    async fn until_stopped(rx: &mut Transitions) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            let state = next(rx).await;
            let last = state.is_terminal() || matches!(state, ProcessingState::Idle);
            seen.push(describe(&state));
            if last {
                return seen;
            }
        }
    }

    async fn next_request(
        rx: &mut broadcast::Receiver<QueueInputRequest<TestItem>>,
    ) -> QueueInputRequest<TestItem> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("queue request in time")
            .expect("requests channel open")
    }

    async fn wait_for_event(rx: &mut broadcast::Receiver<TestEvent>, wanted: TestEvent) {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event in time")
                .expect("events channel open");
            if event == wanted {
                return;
            }
        }
    }

    #[tokio::test]
    async fn enqueue_keeps_insertion_order_and_rejects_duplicates() {
        let (queue, _) = queue(QueueConfig::default());
        let (p1, p2, p3) = (item("p1"), item("p2"), item("p3"));
        for it in [&p1, &p2, &p3] {
            queue.enqueue(it.clone()).await.unwrap();
        }

        assert_eq!(queue.items(), vec![p1.clone(), p2, p3]);
        assert!(matches!(
            queue.enqueue(p1.clone()).await,
            Err(QueueError::DuplicateItem(id)) if id == p1.id()
        ));
        assert_eq!(queue.counts().enqueued_size, 3);
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn unattended_run_processes_in_order_then_reports_done() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();

        assert!(queue.start_processing().await);
        assert_eq!(
            until_stopped(&mut transitions).await,
            [
                "item_processing:p1",
                "item_done:p1",
                "item_processing:p2",
                "item_done:p2",
                "queue_done",
            ]
        );
        queue.wait_until_stopped().await;

        assert!(queue.items().is_empty());
        assert_eq!(script.dispatched(), ["p1", "p2"]);
        assert_eq!(queue.counts().full_size, 2);
    }

    #[tokio::test]
    async fn empty_queue_run_stays_idle() {
        let (queue, _) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();

        assert!(queue.start_processing().await);
        assert_eq!(until_stopped(&mut transitions).await, ["idle"]);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let (queue, script) = queue(QueueConfig::default());
        let mut events = queue.subscribe_processor_events();
        script.push("p1", Step::Block);
        queue.enqueue(item("p1")).await.unwrap();

        assert!(queue.start_processing().await);
        wait_for_event(&mut events, TestEvent::Step("blocked".into())).await;
        assert!(!queue.start_processing().await);

        queue.abort().await;
        queue.wait_until_stopped().await;
        assert_eq!(script.dispatched(), ["p1"]);
    }

    #[tokio::test]
    async fn confirmation_skip_never_dispatches() {
        let (queue, script) = queue(confirming());
        let mut transitions = queue.subscribe_transitions();
        let mut requests = queue.subscribe_queue_input_requests();
        queue.enqueue(item("p1")).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        let QueueInputRequest::ConfirmNextProcessor {
            current_index,
            total_items,
            next_item_id,
            ..
        } = &request
        else {
            panic!("unexpected request {request:?}");
        };
        assert_eq!((*current_index, *total_items, *next_item_id), (1, 1, None));
        assert!(queue.subscribe_queue_input().borrow().is_some());

        assert!(queue.provide_queue_input(QueueInputResponse::skip(request.id())));
        assert_eq!(
            until_stopped(&mut transitions).await,
            ["item_skipped:p1", "queue_done"]
        );
        assert!(script.dispatched().is_empty());
        assert!(queue.subscribe_queue_input().borrow().is_none());
    }

    #[tokio::test]
    async fn confirmation_can_replace_the_item() {
        let (queue, _) = queue(confirming());
        let mut transitions = queue.subscribe_transitions();
        let mut requests = queue.subscribe_queue_input_requests();
        let p1 = item("p1");
        queue.enqueue(p1.clone()).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        let edited = p1.clone().with_amount(4200);
        queue.provide_queue_input(QueueInputResponse::proceed_with(request.id(), edited));

        let ProcessingState::ItemProcessing(dispatched) = next(&mut transitions).await else {
            panic!("expected processing");
        };
        assert_eq!(dispatched.id(), p1.id());
        assert_eq!(dispatched.amount, 4200);
    }

    #[tokio::test]
    async fn retry_redispatches_the_same_item_next() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut requests = queue.subscribe_queue_input_requests();
        script.push("p1", Step::Fail(ProcessingError::CardDeclined));
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        let QueueInputRequest::ErrorRetryOrSkip { error, .. } = &request else {
            panic!("unexpected request {request:?}");
        };
        assert_eq!(*error, ProcessingError::CardDeclined);
        queue.provide_queue_input(QueueInputResponse::on_error_retry(request.id()));

        let seen = until_stopped(&mut transitions).await;
        assert_eq!(
            seen[..4],
            [
                "item_processing:p1",
                "item_failed:p1",
                "item_retrying:p1",
                "item_processing:p1",
            ]
        );
        assert_eq!(script.dispatched(), ["p1", "p1", "p2"]);
    }

    #[tokio::test]
    async fn skip_moves_the_failed_item_to_the_tail() {
        let (queue, script) = queue(QueueConfig::default());
        let mut requests = queue.subscribe_queue_input_requests();
        script.push("p1", Step::Fail(ProcessingError::NetworkTimeout));
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        queue.provide_queue_input(QueueInputResponse::on_error_skip(request.id()));
        queue.wait_until_stopped().await;

        assert_eq!(script.dispatched(), ["p1", "p2", "p1"]);
        assert!(queue.items().is_empty());
    }

    #[tokio::test]
    async fn abort_decision_drops_only_the_failed_item() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut requests = queue.subscribe_queue_input_requests();
        script.push("p1", Step::Fail(ProcessingError::CardDeclined));
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        queue.provide_queue_input(QueueInputResponse::on_error_abort(request.id()));

        assert_eq!(
            until_stopped(&mut transitions).await,
            [
                "item_processing:p1",
                "item_failed:p1",
                "item_aborted:p1",
                "item_processing:p2",
                "item_done:p2",
                "queue_done",
            ]
        );
    }

    #[tokio::test]
    async fn abort_all_cancels_the_run_and_keeps_items() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut requests = queue.subscribe_queue_input_requests();
        script.push("p1", Step::Fail(ProcessingError::CardDeclined));
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        queue.provide_queue_input(QueueInputResponse::on_error_abort_all(request.id()));

        let seen = until_stopped(&mut transitions).await;
        assert_eq!(seen.last().map(String::as_str), Some("queue_canceled"));
        queue.wait_until_stopped().await;

        assert_eq!(queue.items().len(), 2);
        assert_eq!(script.dispatched(), ["p1"]);
        assert!(matches!(queue.current_state(), ProcessingState::QueueCanceled));
    }

    #[tokio::test]
    async fn panic_in_processor_becomes_generic_failure() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut requests = queue.subscribe_queue_input_requests();
        script.push("p1", Step::Panic);
        queue.enqueue(item("p1")).await.unwrap();
        queue.start_processing().await;

        let request = next_request(&mut requests).await;
        let QueueInputRequest::ErrorRetryOrSkip { error, .. } = &request else {
            panic!("unexpected request {request:?}");
        };
        assert_eq!(*error, ProcessingError::Generic);

        // the loop survived the panic and still honors the decision
        queue.provide_queue_input(QueueInputResponse::on_error_retry(request.id()));
        let seen = until_stopped(&mut transitions).await;
        assert_eq!(seen.last().map(String::as_str), Some("queue_done"));
        assert_eq!(script.dispatched(), ["p1", "p1"]);
    }

    #[tokio::test]
    async fn abort_while_waiting_for_user_input_ends_canceled() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut user_requests = queue.subscribe_user_input_requests();
        script.push("p1", Step::Ask);
        queue.enqueue(item("p1")).await.unwrap();
        queue.start_processing().await;

        let question = user_requests.recv().await.unwrap();
        assert!(queue.abort().await);

        let seen = until_stopped(&mut transitions).await;
        assert_eq!(seen, ["item_processing:p1", "queue_canceled"]);
        queue.wait_until_stopped().await;

        assert_eq!(script.aborts(), 1);
        // the question was resolved as canceled, a late answer is discarded
        assert!(!queue.provide_user_input(UserInputResponse::confirm(question.id, true)));
        assert!(transitions.try_recv().is_err());
        assert!(matches!(queue.current_state(), ProcessingState::QueueCanceled));
    }

    #[tokio::test]
    async fn removing_the_in_flight_item_moves_on() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut events = queue.subscribe_processor_events();
        script.push("p1", Step::Block);
        let p1 = item("p1");
        queue.enqueue(p1.clone()).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        wait_for_event(&mut events, TestEvent::Step("blocked".into())).await;
        assert!(queue.remove(p1.id()).await);

        assert_eq!(
            until_stopped(&mut transitions).await,
            [
                "item_processing:p1",
                "item_aborted:p1",
                "item_processing:p2",
                "item_done:p2",
                "queue_done",
            ]
        );
        assert_eq!(script.aborts(), 1);
        assert!(!queue.remove(p1.id()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn processor_ignoring_abort_is_cut_off_after_grace() {
        let config = QueueConfig {
            abort_grace_ms: 100,
            ..QueueConfig::default()
        };
        let (queue, script) = queue(config);
        let mut transitions = queue.subscribe_transitions();
        script.push("p1", Step::Hang);
        let p1 = item("p1");
        queue.enqueue(p1.clone()).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        assert_eq!(describe(&next(&mut transitions).await), "item_processing:p1");
        queue.remove(p1.id()).await;

        let seen = until_stopped(&mut transitions).await;
        assert_eq!(seen, ["item_aborted:p1", "item_processing:p2", "item_done:p2", "queue_done"]);
    }

    #[tokio::test]
    async fn removing_a_waiting_item_keeps_the_run_going() {
        let (queue, script) = queue(confirming());
        let mut requests = queue.subscribe_queue_input_requests();
        let p2 = item("p2");
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(p2.clone()).await.unwrap();
        queue.start_processing().await;

        let first = next_request(&mut requests).await;
        assert!(queue.remove(p2.id()).await);
        queue.provide_queue_input(QueueInputResponse::proceed(first.id()));
        queue.wait_until_stopped().await;

        assert_eq!(script.dispatched(), ["p1"]);
    }

    #[tokio::test]
    async fn clear_queue_cancels_the_active_run() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut events = queue.subscribe_processor_events();
        script.push("p1", Step::Block);
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        wait_for_event(&mut events, TestEvent::Step("blocked".into())).await;
        queue.clear_queue().await;

        let seen = until_stopped(&mut transitions).await;
        assert_eq!(seen.last().map(String::as_str), Some("queue_canceled"));
        queue.wait_until_stopped().await;
        assert!(queue.items().is_empty());
        assert_eq!(queue.counts(), QueueCounts::default());
    }

    #[tokio::test]
    async fn replace_current_item_only_touches_the_in_flight_item() {
        let (queue, script) = queue(QueueConfig::default());
        let mut user_requests = queue.subscribe_user_input_requests();
        script.push("p1", Step::Ask);
        let (p1, p2) = (item("p1"), item("p2"));
        queue.enqueue(p1.clone()).await.unwrap();
        queue.enqueue(p2.clone()).await.unwrap();

        // nothing in flight yet
        assert!(!queue.replace_current_item(p1.clone().with_amount(3)).await);

        queue.start_processing().await;
        let question = user_requests.recv().await.unwrap();
        assert!(queue.replace_current_item(p1.clone().with_amount(7)).await);
        assert!(!queue.replace_current_item(p2.clone().with_amount(7)).await);
        assert_eq!(queue.items()[0].amount, 7);
        assert_eq!(queue.items()[1], p2);

        queue.provide_user_input(UserInputResponse::confirm(question.id, true));
        queue.wait_until_stopped().await;
        assert_eq!(script.dispatched(), ["p1", "p2"]);
    }

    #[tokio::test]
    async fn enqueue_during_a_run_is_dispatched_after_current_items() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut user_requests = queue.subscribe_user_input_requests();
        script.push("p1", Step::Ask);
        queue.enqueue(item("p1")).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        let question = user_requests.recv().await.unwrap();
        queue.enqueue(item("p3")).await.unwrap();
        queue.provide_user_input(UserInputResponse::confirm(question.id, true));

        assert_eq!(
            until_stopped(&mut transitions).await,
            [
                "item_processing:p1",
                "item_done:p1",
                "item_processing:p2",
                "item_done:p2",
                "item_processing:p3",
                "item_done:p3",
                "queue_done",
            ]
        );
        assert_eq!(script.dispatched(), ["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn removed_item_can_be_enqueued_again() {
        let (queue, script) = queue(QueueConfig::default());
        let mut transitions = queue.subscribe_transitions();
        let mut events = queue.subscribe_processor_events();
        let mut user_requests = queue.subscribe_user_input_requests();
        script.push("p1", Step::Block);
        script.push("p2", Step::Ask);
        let p1 = item("p1");
        queue.enqueue(p1.clone()).await.unwrap();
        queue.enqueue(item("p2")).await.unwrap();
        queue.start_processing().await;

        wait_for_event(&mut events, TestEvent::Step("blocked".into())).await;
        assert!(queue.remove(p1.id()).await);
        let question = user_requests.recv().await.unwrap();
        queue.enqueue(p1.clone()).await.unwrap();
        queue.provide_user_input(UserInputResponse::confirm(question.id, true));

        assert_eq!(
            until_stopped(&mut transitions).await,
            [
                "item_processing:p1",
                "item_aborted:p1",
                "item_processing:p2",
                "item_done:p2",
                "item_processing:p1",
                "item_done:p1",
                "queue_done",
            ]
        );
        assert_eq!(script.dispatched(), ["p1", "p2", "p1"]);
        assert_eq!(script.aborts(), 1);
    }

    #[tokio::test]
    async fn unknown_queue_input_is_ignored() {
        let (queue, _) = queue(QueueConfig::default());
        assert!(!queue.provide_queue_input(QueueInputResponse::proceed(RequestId::generate())));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_timeout_applies_the_policy() {
        let config = confirming()
            .with_confirm_timeout(Some(Duration::from_millis(50)))
            .with_timeout_policy(QueueTimeoutPolicy {
                on_confirm_timeout: ConfirmTimeoutAction::Proceed,
                ..QueueTimeoutPolicy::default()
            });
        let (queue, script) = queue(config);
        queue.enqueue(item("p1")).await.unwrap();
        queue.start_processing().await;

        queue.wait_until_stopped().await;
        assert_eq!(script.dispatched(), ["p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_failure_defaults_to_abort_all() {
        let config =
            QueueConfig::default().with_error_decision_timeout(Some(Duration::from_secs(30)));
        let (queue, script) = queue(config);
        let mut transitions = queue.subscribe_transitions();
        script.push("p1", Step::Fail(ProcessingError::CardDeclined));
        queue.enqueue(item("p1")).await.unwrap();
        queue.start_processing().await;

        let seen = until_stopped(&mut transitions).await;
        assert_eq!(seen, ["item_processing:p1", "item_failed:p1", "queue_canceled"]);
    }

    #[tokio::test]
    async fn storage_mirrors_the_item_lifecycle() {
        let storage = Arc::new(InMemoryQueueStorage::<TestItem>::new());
        let (processor, _) = scripted();
        let queue = QueueBuilder::new(processor)
            .storage(storage.clone())
            .build()
            .unwrap();
        let (p1, p2) = (item("p1"), item("p2"));
        queue.enqueue(p1.clone()).await.unwrap();
        queue.enqueue(p2.clone()).await.unwrap();
        assert_eq!(storage.status_of(p1.id()).await, Some(ItemStatus::Pending));

        queue.remove(p2.id()).await;
        queue.start_processing().await;
        queue.wait_until_stopped().await;

        assert_eq!(storage.status_of(p1.id()).await, Some(ItemStatus::Completed));
        assert_eq!(storage.status_of(p2.id()).await, None);
        assert_eq!(queue.clear_completed().await.unwrap(), 1);
        assert_eq!(storage.len().await, 0);
    }

    #[tokio::test]
    async fn background_writes_are_flushed_in_order() {
        let storage = Arc::new(InMemoryQueueStorage::<TestItem>::new());
        let (processor, _) = scripted();
        let queue = QueueBuilder::new(processor)
            .storage(storage.clone())
            .config(QueueConfig::default().with_persistence(PersistenceStrategy::OnBackground))
            .build()
            .unwrap();
        let (p1, p2) = (item("p1"), item("p2"));
        queue.enqueue(p1.clone()).await.unwrap();
        queue.enqueue(p2.clone()).await.unwrap();
        queue.remove(p2.id()).await;
        queue.flush_storage().await;

        let stored = storage.get_all_by_status(&[ItemStatus::Pending]).await.unwrap();
        assert_eq!(stored, vec![p1]);
    }

    #[tokio::test]
    async fn restore_loads_pending_items_once() {
        let (p1, p2) = (item("p1"), item("p2"));
        let storage = Arc::new(InMemoryQueueStorage::with_items(
            [p1.clone(), p2.clone()],
            ItemStatus::Pending,
        ));
        storage.update_status(p2.id(), ItemStatus::Completed).await.unwrap();
        let (processor, _) = scripted();
        let queue = QueueBuilder::new(processor)
            .storage(storage)
            .build()
            .unwrap();

        assert_eq!(queue.restore().await.unwrap(), 1);
        assert_eq!(queue.restore().await.unwrap(), 0);
        assert_eq!(queue.items(), vec![p1]);
    }

    #[tokio::test]
    async fn storage_failures_never_stop_the_run() {
        let storage = Arc::new(InMemoryQueueStorage::<TestItem>::new());
        storage.set_fail_writes(true);
        let (processor, script) = scripted();
        let queue = QueueBuilder::new(processor)
            .storage(storage)
            .build()
            .unwrap();
        queue.enqueue(item("p1")).await.unwrap();
        queue.start_processing().await;
        queue.wait_until_stopped().await;

        assert_eq!(script.dispatched(), ["p1"]);
    }

    #[tokio::test]
    async fn never_persistence_skips_storage() {
        let storage = Arc::new(InMemoryQueueStorage::<TestItem>::new());
        let (processor, _) = scripted();
        let queue = QueueBuilder::new(processor)
            .storage(storage.clone())
            .config(QueueConfig::default().with_persistence(PersistenceStrategy::Never))
            .build()
            .unwrap();
        queue.enqueue(item("p1")).await.unwrap();

        assert_eq!(storage.len().await, 0);
        assert_eq!(queue.restore().await.unwrap(), 0);
    }
}
