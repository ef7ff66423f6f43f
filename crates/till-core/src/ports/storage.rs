//! QueueStorage port - キューの永続化ミラー
//!
//! 正本は QueueManager が持つメモリ上のアイテム列。
//! ストレージはそのミラーで、未処理アイテムを再起動後に戻すためだけに使う。

use async_trait::async_trait;

use crate::domain::{ItemId, ItemStatus, QueueItem};
use crate::error::StorageError;

/// QueueStorage はアイテムとそのステータスを保存する
///
/// # 設計原則
/// - 書き込みは `PersistenceStrategy` に従ってキューマネージャーから呼ばれる
/// - 失敗しても run loop は止まらない（ログのみ）
#[async_trait]
pub trait QueueStorage<T: QueueItem>: Send + Sync {
    /// Insert a new item with status `Pending`.
    async fn insert(&self, item: &T) -> Result<(), StorageError>;

    /// Overwrite an item's payload, keeping its status.
    async fn update(&self, item: &T) -> Result<(), StorageError>;

    async fn update_status(&self, id: ItemId, status: ItemStatus) -> Result<(), StorageError>;

    async fn remove(&self, id: ItemId) -> Result<(), StorageError>;

    /// Remove every item whose status is in `statuses`. Returns how many were removed.
    async fn remove_by_status(&self, statuses: &[ItemStatus]) -> Result<usize, StorageError>;

    /// Items whose status is in `statuses`, in insertion order.
    async fn get_all_by_status(&self, statuses: &[ItemStatus]) -> Result<Vec<T>, StorageError>;
}
