//! QueueProcessor port - 1 アイテムを処理する能力の契約
//!
//! 1 アイテムを受け取り、1 つの [`ProcessingResult`] を返す。
//! 処理中は進捗イベントを流し、ユーザー入力の相関を通してオペレーターに質問できる。

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{ProcessingResult, QueueItem, UserInputRequest, UserInputResponse};

/// QueueProcessor は具体的な処理戦略の共通インターフェース
///
/// # 契約
/// - `process` は vendor の失敗を `ProcessingError` に翻訳して返す
/// - `abort` は処理中かどうかに関係なく安全に呼べる
/// - `abort` は (a) キャンセルイベントを発行し (b) 未回答の入力要求を
///   canceled で解決し (c) ドメイン固有の中断フックを呼び (d) 中断できたかを返す
#[async_trait]
pub trait QueueProcessor<T: QueueItem>: Send + Sync {
    async fn process(&self, item: T) -> ProcessingResult<T::Success>;

    /// Progress events. Observational only.
    fn subscribe_events(&self) -> broadcast::Receiver<T::Event>;

    fn subscribe_user_input_requests(&self) -> broadcast::Receiver<UserInputRequest>;

    /// Resolve an outstanding user input request. `false` if nothing matched.
    fn provide_user_input(&self, response: UserInputResponse) -> bool;

    async fn abort(&self, item: Option<&T>) -> bool;
}
