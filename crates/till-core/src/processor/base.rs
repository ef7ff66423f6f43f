//! BaseProcessor - Handler を QueueProcessor に変換する
//!
//! # 学習ポイント
//! - ジェネリック trait (ProcessorHandler<T>)
//! - 共通の配管（イベント・ユーザー入力・中断）を 1 か所に集約
//! - Type erasure: `BaseProcessor<T, H>` → `Arc<dyn QueueProcessor<T>>`

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::context::ProcessorContext;
use crate::domain::{
    ProcessingEvent, ProcessingResult, QueueItem, UserInputRequest, UserInputResponse,
};
use crate::ports::{Clock, QueueProcessor};

/// ProcessorHandler はドメイン固有の処理だけを実装する
///
/// # 使用例
/// ```ignore
/// struct CashHandler;
///
/// #[async_trait]
/// impl ProcessorHandler<PaymentItem> for CashHandler {
///     async fn process_item(
///         &self,
///         item: &PaymentItem,
///         ctx: &ProcessorContext<PaymentEvent>,
///     ) -> ProcessingResult<PaymentSuccess> {
///         ctx.emit(PaymentEvent::CashReceived);
///         Ok(PaymentSuccess::new("CASH-0001"))
///     }
/// }
/// ```
#[async_trait]
pub trait ProcessorHandler<T: QueueItem>: Send + Sync + 'static {
    async fn process_item(
        &self,
        item: &T,
        ctx: &ProcessorContext<T::Event>,
    ) -> ProcessingResult<T::Success>;

    /// Domain-specific cancellation (tell the SDK to stop, release hardware).
    /// Returns whether cancellation actually succeeded.
    async fn on_abort(&self, _item: Option<&T>) -> bool {
        true
    }
}

/// Wraps a [`ProcessorHandler`] with the shared plumbing.
pub struct BaseProcessor<T: QueueItem, H: ProcessorHandler<T>> {
    handler: H,
    ctx: ProcessorContext<T::Event>,
    _marker: PhantomData<T>,
}

impl<T: QueueItem, H: ProcessorHandler<T>> BaseProcessor<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            ctx: ProcessorContext::new(),
            _marker: PhantomData,
        }
    }

    pub fn with_clock(handler: H, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler,
            ctx: ProcessorContext::with_clock(capacity, clock),
            _marker: PhantomData,
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn context(&self) -> &ProcessorContext<T::Event> {
        &self.ctx
    }

    /// Erase the handler type.
    pub fn into_shared(self) -> Arc<dyn QueueProcessor<T>> {
        Arc::new(self)
    }
}

#[async_trait]
impl<T: QueueItem, H: ProcessorHandler<T>> QueueProcessor<T> for BaseProcessor<T, H> {
    async fn process(&self, item: T) -> ProcessingResult<T::Success> {
        self.ctx.begin_dispatch();
        self.ctx.emit(T::Event::started());
        self.handler.process_item(&item, &self.ctx).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<T::Event> {
        self.ctx.subscribe_events()
    }

    fn subscribe_user_input_requests(&self) -> broadcast::Receiver<UserInputRequest> {
        self.ctx.subscribe_user_input_requests()
    }

    fn provide_user_input(&self, response: UserInputResponse) -> bool {
        self.ctx.provide_user_input(response)
    }

    async fn abort(&self, item: Option<&T>) -> bool {
        self.ctx.emit(T::Event::canceled());
        let released = self.ctx.cancel_pending();
        if released > 0 {
            tracing::debug!(released, "pending user input canceled by abort");
        }
        self.handler.on_abort(item).await
    }
}
