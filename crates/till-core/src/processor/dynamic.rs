//! DynamicProcessor - 複数の具体的な processor を 1 つの窓口にまとめる
//!
//! # 振る舞い
//! - `item.processor_type()` で委譲先を引く（なければ fallback の type）
//! - 委譲先のイベントとユーザー入力要求を自分のチャネルへ転送する
//! - ユーザー入力の回答は実行中の委譲先へ送る
//! - 委譲先の `started` イベントだけは転送しない（開始はファサードが通知済み）

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use super::context::ProcessorContext;
use crate::domain::{
    ProcessingError, ProcessingEvent, ProcessingResult, QueueItem, UserInputRequest,
    UserInputResponse,
};
use crate::ports::QueueProcessor;

type SharedProcessor<T> = Arc<dyn QueueProcessor<T>>;

/// Facade over a family of processors keyed by processor type.
pub struct DynamicProcessor<T: QueueItem> {
    processors: HashMap<T::ProcessorType, SharedProcessor<T>>,
    fallback: Option<T::ProcessorType>,
    ctx: ProcessorContext<T::Event>,
    current: Mutex<Option<SharedProcessor<T>>>,
}

impl<T: QueueItem> DynamicProcessor<T> {
    pub(crate) fn from_parts(
        processors: HashMap<T::ProcessorType, SharedProcessor<T>>,
        fallback: Option<T::ProcessorType>,
        ctx: ProcessorContext<T::Event>,
    ) -> Self {
        Self {
            processors,
            fallback,
            ctx,
            current: Mutex::new(None),
        }
    }

    /// Processor for `processor_type`, or the fallback one.
    pub fn lookup(&self, processor_type: T::ProcessorType) -> Option<SharedProcessor<T>> {
        self.processors
            .get(&processor_type)
            .or_else(|| self.fallback.and_then(|f| self.processors.get(&f)))
            .cloned()
    }

    pub fn has_delegate(&self) -> bool {
        self.current_slot().is_some()
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<SharedProcessor<T>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> Option<SharedProcessor<T>> {
        self.current_slot().clone()
    }

    fn forward_from(&self, delegate: &SharedProcessor<T>) -> Forwarding {
        Forwarding::start(
            delegate.subscribe_events(),
            self.ctx.event_sender(),
            |event: &T::Event| !event.is_started(),
            delegate.subscribe_user_input_requests(),
            self.ctx.request_sender(),
        )
    }
}

#[async_trait]
impl<T: QueueItem> QueueProcessor<T> for DynamicProcessor<T> {
    async fn process(&self, item: T) -> ProcessingResult<T::Success> {
        let processor_type = item.processor_type();
        let Some(delegate) = self.lookup(processor_type) else {
            tracing::warn!(item_id = %item.id(), ?processor_type, "no processor registered");
            return Err(ProcessingError::ProcessorNotFound);
        };

        let _current = CurrentDelegate::install(&self.current, Arc::clone(&delegate));
        self.ctx.emit(T::Event::started());

        // Subscribe before dispatch so nothing the delegate emits is missed.
        let forwarding = self.forward_from(&delegate);
        let result = delegate.process(item).await;
        forwarding.stop().await;

        result
    }

    fn subscribe_events(&self) -> broadcast::Receiver<T::Event> {
        self.ctx.subscribe_events()
    }

    fn subscribe_user_input_requests(&self) -> broadcast::Receiver<UserInputRequest> {
        self.ctx.subscribe_user_input_requests()
    }

    fn provide_user_input(&self, response: UserInputResponse) -> bool {
        match self.current() {
            Some(delegate) => delegate.provide_user_input(response),
            None => {
                tracing::warn!(request_id = %response.request_id, "no active delegate for user input");
                false
            }
        }
    }

    async fn abort(&self, item: Option<&T>) -> bool {
        let running = self.current();
        let delegate = running
            .clone()
            .or_else(|| item.and_then(|item| self.lookup(item.processor_type())));
        let Some(delegate) = delegate else {
            return false;
        };

        self.ctx.emit(T::Event::canceled());

        // A running delegate is already being forwarded by `process`.
        if running.is_some() {
            return delegate.abort(item).await;
        }
        let forwarding = self.forward_from(&delegate);
        let aborted = delegate.abort(item).await;
        forwarding.stop().await;
        aborted
    }
}

/// Clears the current delegate when `process` ends, however it ends.
struct CurrentDelegate<'a, P: ?Sized> {
    slot: &'a Mutex<Option<Arc<P>>>,
}

impl<'a, P: ?Sized> CurrentDelegate<'a, P> {
    fn install(slot: &'a Mutex<Option<Arc<P>>>, delegate: Arc<P>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(delegate);
        Self { slot }
    }
}

impl<P: ?Sized> Drop for CurrentDelegate<'_, P> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Two forwarding tasks (events, user-input requests) for one delegate.
///
/// Dropping this without `stop` still ends both tasks: the stop senders are
/// dropped, which the tasks observe as a stop signal.
struct Forwarding {
    stops: Vec<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Forwarding {
    fn start<E: Clone + Send + 'static>(
        events: broadcast::Receiver<E>,
        events_out: broadcast::Sender<E>,
        keep_event: fn(&E) -> bool,
        requests: broadcast::Receiver<UserInputRequest>,
        requests_out: broadcast::Sender<UserInputRequest>,
    ) -> Self {
        let (stop_events, events_stopped) = oneshot::channel();
        let (stop_requests, requests_stopped) = oneshot::channel();
        let tasks = vec![
            tokio::spawn(forward(events, events_out, keep_event, events_stopped)),
            tokio::spawn(forward(requests, requests_out, |_| true, requests_stopped)),
        ];
        Self {
            stops: vec![stop_events, stop_requests],
            tasks,
        }
    }

    /// Signal both tasks, let them drain what is buffered, and wait for them.
    async fn stop(mut self) {
        for stop in self.stops.drain(..) {
            let _ = stop.send(());
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

async fn forward<V: Clone + Send + 'static>(
    mut rx: broadcast::Receiver<V>,
    tx: broadcast::Sender<V>,
    keep: fn(&V) -> bool,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            received = rx.recv() => match received {
                Ok(value) => {
                    if keep(&value) {
                        let _ = tx.send(value);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "delegate forwarding lagged");
                }
                Err(RecvError::Closed) => return,
            },
            _ = &mut stop => break,
        }
    }

    loop {
        match rx.try_recv() {
            Ok(value) => {
                if keep(&value) {
                    let _ = tx.send(value);
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
