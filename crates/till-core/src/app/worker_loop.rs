//! WorkerLoop - キューの実行ループ
//!
//! # フロー
//! 1. 先頭アイテムを取る（処理中は常に 1 件だけ）
//! 2. 必要なら確認を求める
//! 3. processor に渡す
//! 4. 失敗したら retry / skip / abort の判断を待つ
//!
//! # 状態遷移
//! - 成功: ItemProcessing -> ItemDone
//! - 失敗: ItemProcessing -> ItemFailed -> (ItemRetrying | ItemSkipped | ItemAborted | QueueCanceled)
//! - 空: QueueDone（一度も取り出さなかった場合は Idle）
//!
//! processor や呼び出し側を待つ間は状態ロックを持たない。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::manager::{Inner, Interrupt};
use super::persistence::StorageOp;
use crate::domain::{
    ConfirmTimeoutAction, ErrorHandlingAction, ItemId, ItemStatus, ProcessingError,
    ProcessingResult, ProcessingState, ProcessorStartMode, QueueInputRequest, QueueInputValue,
    QueueItem,
};

/// How a wait for the caller ended.
enum Answer<V> {
    Given(V),
    /// The item was removed while waiting.
    Removed,
    /// The run was canceled while waiting.
    Stopped,
}

/// Outcome of the confirmation step.
enum Confirmation<T> {
    Proceed(T),
    Skip,
    AbortRun,
}

enum Dispatch<S> {
    Finished(ProcessingResult<S>),
    Interrupted,
}

/// Drive run `generation` until the queue drains or the run is canceled.
pub(crate) async fn run<T: QueueItem>(
    inner: Arc<Inner<T>>,
    generation: u64,
    mut interrupt: watch::Receiver<Interrupt>,
) {
    drive(&inner, generation, &mut interrupt).await;
    inner.finish_run(generation).await;
}

async fn drive<T: QueueItem>(
    inner: &Arc<Inner<T>>,
    generation: u64,
    interrupt: &mut watch::Receiver<Interrupt>,
) {
    let mut taken_any = false;
    let mut retrying = false;

    loop {
        // 1-2. 先頭を取る
        let head = {
            let mut st = inner.lock().await;
            if !st.is_live(generation) {
                return;
            }
            match st.take_head() {
                Some(item) => item,
                None => {
                    let last = if taken_any {
                        ProcessingState::QueueDone
                    } else {
                        ProcessingState::Idle
                    };
                    inner.publish_item_state(&st, generation, last);
                    return;
                }
            }
        };
        taken_any = true;
        let id = head.id();

        // 3. 確認
        let mut item = head;
        if !retrying && inner.config.start_mode == ProcessorStartMode::Confirmation {
            let confirmation = confirm(inner, generation, &item).await;
            match confirmation {
                Answer::Given(Confirmation::Proceed(confirmed)) => item = confirmed,
                Answer::Given(Confirmation::Skip) => {
                    let skipped = ProcessingState::ItemSkipped;
                    drop_head(inner, generation, id, ItemStatus::Cancelled, skipped).await;
                    continue;
                }
                Answer::Given(Confirmation::AbortRun) => {
                    cancel_run(inner, generation, None).await;
                    return;
                }
                Answer::Removed => {
                    announce_removed(inner, generation, item).await;
                    continue;
                }
                Answer::Stopped => return,
            }
        }
        retrying = false;

        // 4. 処理
        {
            let st = inner.lock().await;
            if !st.is_live(generation) {
                return;
            }
            if !st.head_is(id) {
                drop(st);
                announce_removed(inner, generation, item).await;
                continue;
            }
            let processing = ProcessingState::ItemProcessing(item.clone());
            inner.publish_item_state(&st, generation, processing);
        }
        inner
            .mirror
            .apply(StorageOp::Status(id, ItemStatus::Processing))
            .await;

        let result = match dispatch(inner, interrupt, item.clone()).await {
            Dispatch::Finished(result) => result,
            Dispatch::Interrupted => {
                let st = inner.lock().await;
                if !st.is_live(generation) {
                    return;
                }
                drop(st);
                announce_removed(inner, generation, item).await;
                continue;
            }
        };

        // 5. 成功
        let error = match result {
            Ok(success) => {
                complete(inner, generation, item, success).await;
                continue;
            }
            Err(error) => error,
        };

        // 6. 失敗 → 判断待ち
        {
            let st = inner.lock().await;
            if !st.is_live(generation) {
                return;
            }
            if !st.head_is(id) {
                drop(st);
                announce_removed(inner, generation, item).await;
                continue;
            }
            inner.publish_item_state(
                &st,
                generation,
                ProcessingState::ItemFailed {
                    item: item.clone(),
                    error,
                },
            );
        }
        tracing::info!(item_id = %id, %error, "item failed, waiting for decision");

        let action = match decide(inner, generation, id, error).await {
            Answer::Given(action) => action,
            Answer::Removed => {
                announce_removed(inner, generation, item).await;
                continue;
            }
            Answer::Stopped => return,
        };
        tracing::info!(item_id = %id, ?action, "failure resolved");

        match action {
            ErrorHandlingAction::Retry => {
                let st = inner.lock().await;
                if !st.is_live(generation) {
                    return;
                }
                if !st.head_is(id) {
                    drop(st);
                    announce_removed(inner, generation, item).await;
                    continue;
                }
                inner.publish_item_state(&st, generation, ProcessingState::ItemRetrying(item));
                retrying = true;
            }
            ErrorHandlingAction::Skip => {
                let skipped = {
                    let mut st = inner.lock().await;
                    if !st.is_live(generation) {
                        return;
                    }
                    if !st.head_is(id) {
                        drop(st);
                        announce_removed(inner, generation, item).await;
                        continue;
                    }
                    let skipped = st.items.pop_front();
                    if let Some(skipped) = skipped.clone() {
                        st.items.push_back(skipped.clone());
                        st.in_flight = None;
                        inner.publish_items(&st);
                        inner.publish_item_state(
                            &st,
                            generation,
                            ProcessingState::ItemSkipped(skipped),
                        );
                    }
                    skipped
                };
                if skipped.is_some() {
                    inner
                        .mirror
                        .apply(StorageOp::Status(id, ItemStatus::Pending))
                        .await;
                }
            }
            ErrorHandlingAction::Abort => {
                let aborted = ProcessingState::ItemAborted;
                drop_head(inner, generation, id, ItemStatus::Failed, aborted).await;
            }
            ErrorHandlingAction::AbortAll => {
                cancel_run(inner, generation, Some(item)).await;
                return;
            }
        }
    }
}

/// Emit `ConfirmNextProcessor` for `item` and wait for the answer.
async fn confirm<T: QueueItem>(
    inner: &Arc<Inner<T>>,
    generation: u64,
    item: &T,
) -> Answer<Confirmation<T>> {
    let id = item.id();
    let timeout = inner.config.confirm_timeout();

    let pending = {
        let st = inner.lock().await;
        if !st.is_live(generation) {
            return Answer::Stopped;
        }
        if !st.head_is(id) {
            return Answer::Removed;
        }
        let counts = st.counts();
        let request = QueueInputRequest::ConfirmNextProcessor {
            id: inner.ids.generate_request_id(),
            current_index: counts.current_index,
            total_items: counts.full_size,
            item: item.clone(),
            next_item_id: st.items.get(1).map(|next| next.id()),
            timeout,
        };
        let pending = inner.queue_inputs.register(request.id());
        inner.publish_request(request);
        pending
    };

    let request_id = pending.id();
    let response = pending.wait(timeout).await;
    inner.clear_request(request_id);

    let value = match response.value {
        QueueInputValue::Timeout => {
            let action = inner.config.timeout_policy.on_confirm_timeout;
            tracing::info!(item_id = %id, ?action, "confirmation timed out");
            match action {
                ConfirmTimeoutAction::Proceed => QueueInputValue::Proceed(None),
                ConfirmTimeoutAction::Skip => QueueInputValue::Skip,
                ConfirmTimeoutAction::Abort => QueueInputValue::Canceled,
            }
        }
        other => other,
    };

    match value {
        QueueInputValue::Proceed(replacement) => {
            let Some(replacement) = replacement else {
                return Answer::Given(Confirmation::Proceed(item.clone()));
            };
            if replacement.id() != id {
                tracing::warn!(item_id = %id, "replacement item has a different id, ignored");
                return Answer::Given(Confirmation::Proceed(item.clone()));
            }
            let mut st = inner.lock().await;
            match st.items.front_mut() {
                Some(head) if head.id() == id => *head = replacement.clone(),
                _ => return Answer::Removed,
            }
            inner.publish_items(&st);
            drop(st);
            inner
                .mirror
                .apply(StorageOp::Update(replacement.clone()))
                .await;
            Answer::Given(Confirmation::Proceed(replacement))
        }
        QueueInputValue::Skip => Answer::Given(Confirmation::Skip),
        QueueInputValue::Canceled => match interruption(inner, generation, id).await {
            Some(answer) => answer,
            None => Answer::Given(Confirmation::AbortRun),
        },
        QueueInputValue::ErrorAction(action) => {
            tracing::warn!(item_id = %id, ?action, "error action sent to a confirmation, treated as skip");
            Answer::Given(Confirmation::Skip)
        }
        QueueInputValue::Timeout => Answer::Given(Confirmation::Skip),
    }
}

/// Emit `ErrorRetryOrSkip` for the failed item and wait for the action.
async fn decide<T: QueueItem>(
    inner: &Arc<Inner<T>>,
    generation: u64,
    id: ItemId,
    error: ProcessingError,
) -> Answer<ErrorHandlingAction> {
    let timeout = inner.config.error_decision_timeout();

    let pending = {
        let st = inner.lock().await;
        if !st.is_live(generation) {
            return Answer::Stopped;
        }
        if !st.head_is(id) {
            return Answer::Removed;
        }
        let request = QueueInputRequest::ErrorRetryOrSkip {
            id: inner.ids.generate_request_id(),
            item_id: id,
            error,
            timeout,
        };
        let pending = inner.queue_inputs.register(request.id());
        inner.publish_request(request);
        pending
    };

    let request_id = pending.id();
    let response = pending.wait(timeout).await;
    inner.clear_request(request_id);

    match response.value {
        QueueInputValue::ErrorAction(action) => Answer::Given(action),
        QueueInputValue::Timeout => {
            let action = inner.config.timeout_policy.on_error_timeout;
            tracing::info!(item_id = %id, ?action, "error decision timed out");
            Answer::Given(action)
        }
        QueueInputValue::Canceled => match interruption(inner, generation, id).await {
            Some(answer) => answer,
            None => Answer::Given(ErrorHandlingAction::AbortAll),
        },
        QueueInputValue::Proceed(_) => {
            tracing::warn!(item_id = %id, "proceed sent to an error decision, treated as retry");
            Answer::Given(ErrorHandlingAction::Retry)
        }
        QueueInputValue::Skip => Answer::Given(ErrorHandlingAction::Skip),
    }
}

/// Why a wait was canceled: by `abort`/`clear_queue`, by `remove`, or
/// (`None`) by the caller itself.
async fn interruption<T: QueueItem, V>(
    inner: &Arc<Inner<T>>,
    generation: u64,
    id: ItemId,
) -> Option<Answer<V>> {
    let st = inner.lock().await;
    if !st.is_live(generation) {
        Some(Answer::Stopped)
    } else if !st.head_is(id) {
        Some(Answer::Removed)
    } else {
        None
    }
}

/// Run `process` on its own task so a panic becomes `Generic`, racing it
/// against the interrupt signal.
async fn dispatch<T: QueueItem>(
    inner: &Arc<Inner<T>>,
    interrupt: &mut watch::Receiver<Interrupt>,
    item: T,
) -> Dispatch<T::Success> {
    let id = item.id();
    let processor = Arc::clone(&inner.processor);
    let mut task = tokio::spawn(async move { processor.process(item).await });

    tokio::select! {
        biased;
        joined = &mut task => {
            let result = joined.unwrap_or_else(|join_error| {
                tracing::error!(item_id = %id, %join_error, "processor panicked");
                Err(ProcessingError::Generic)
            });
            Dispatch::Finished(result)
        }
        _ = interrupted(interrupt, id) => {
            // Whoever interrupted has already asked the processor to abort.
            wind_down(task, inner.config.abort_grace(), id).await;
            Dispatch::Interrupted
        }
    }
}

/// Resolves once the run is canceled or `id` is removed.
async fn interrupted(interrupt: &mut watch::Receiver<Interrupt>, id: ItemId) {
    // The returned guard must not outlive this statement: it blocks senders.
    let _ = interrupt.wait_for(|signal| signal.targets(id)).await;
}

async fn wind_down<S>(
    mut task: tokio::task::JoinHandle<ProcessingResult<S>>,
    grace: Duration,
    id: ItemId,
) {
    if tokio::time::timeout(grace, &mut task).await.is_err() {
        tracing::warn!(item_id = %id, "processor ignored abort, task aborted");
        task.abort();
    }
}

async fn complete<T: QueueItem>(
    inner: &Arc<Inner<T>>,
    generation: u64,
    item: T,
    success: T::Success,
) {
    let id = item.id();
    {
        let mut st = inner.lock().await;
        if !st.head_is(id) {
            // removed while its last step completed
            drop(st);
            announce_removed(inner, generation, item).await;
            return;
        }
        st.items.pop_front();
        st.in_flight = None;
        st.completed += 1;
        inner.publish_items(&st);
        let done = ProcessingState::ItemDone { item, success };
        if !inner.publish_item_state(&st, generation, done) {
            tracing::info!(item_id = %id, "item completed after the run was canceled");
        }
    }
    inner
        .mirror
        .apply(StorageOp::Status(id, ItemStatus::Completed))
        .await;
}

/// Drop the head item `id`, publishing `state(item)`.
async fn drop_head<T: QueueItem>(
    inner: &Arc<Inner<T>>,
    generation: u64,
    id: ItemId,
    status: ItemStatus,
    state: fn(T) -> ProcessingState<T>,
) {
    {
        let mut st = inner.lock().await;
        if !st.head_is(id) {
            return;
        }
        let Some(item) = st.items.pop_front() else {
            return;
        };
        st.in_flight = None;
        inner.publish_items(&st);
        inner.publish_item_state(&st, generation, state(item));
    }
    inner.mirror.apply(StorageOp::Status(id, status)).await;
}

/// `remove()` already took the item out; report it as aborted.
async fn announce_removed<T: QueueItem>(inner: &Arc<Inner<T>>, generation: u64, item: T) {
    tracing::info!(item_id = %item.id(), "in-flight item removed");
    let st = inner.lock().await;
    inner.publish_item_state(&st, generation, ProcessingState::ItemAborted(item));
}

/// ABORT_ALL, an explicit cancel answer, or a confirmation timeout set to abort.
async fn cancel_run<T: QueueItem>(inner: &Arc<Inner<T>>, generation: u64, item: Option<T>) {
    {
        let mut st = inner.lock().await;
        if !st.is_live(generation) {
            return;
        }
        if let Some(run) = st.run.as_mut() {
            run.canceled = true;
        }
        inner.publish_state(ProcessingState::QueueCanceled);
    }
    tracing::info!(generation, "queue run canceled");
    inner.processor.abort(item.as_ref()).await;
}
