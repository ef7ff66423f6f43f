//! InMemoryQueueStorage - 開発・テスト用のストレージ
//!
//! # 実装詳細
//! - 挿入順を保つため `Vec<(T, ItemStatus)>` で管理
//! - `tokio::sync::Mutex` で排他制御
//! - `fail_writes` で書き込み失敗を再現できる（テスト用）

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ItemId, ItemStatus, QueueItem};
use crate::error::StorageError;
use crate::ports::QueueStorage;

pub struct InMemoryQueueStorage<T> {
    entries: Mutex<Vec<(T, ItemStatus)>>,
    fail_writes: AtomicBool,
}

impl<T: QueueItem> InMemoryQueueStorage<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Storage pre-filled with `items` in status `status` (e.g. left over from
    /// a previous session).
    pub fn with_items(items: impl IntoIterator<Item = T>, status: ItemStatus) -> Self {
        let entries = items.into_iter().map(|item| (item, status)).collect();
        Self {
            entries: Mutex::new(entries),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every write fail with `StorageError::Backend`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn status_of(&self, id: ItemId) -> Option<ItemStatus> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .find(|(item, _)| item.id() == id)
            .map(|(_, status)| *status)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("writes disabled".into()));
        }
        Ok(())
    }
}

impl<T: QueueItem> Default for InMemoryQueueStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: QueueItem> QueueStorage<T> for InMemoryQueueStorage<T> {
    async fn insert(&self, item: &T) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|(stored, _)| stored.id() == item.id()) {
            return Err(StorageError::AlreadyStored(item.id()));
        }
        entries.push((item.clone(), ItemStatus::Pending));
        Ok(())
    }

    async fn update(&self, item: &T) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|(stored, _)| stored.id() == item.id())
            .ok_or(StorageError::NotFound(item.id()))?;
        entry.0 = item.clone();
        Ok(())
    }

    async fn update_status(&self, id: ItemId, status: ItemStatus) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|(stored, _)| stored.id() == id)
            .ok_or(StorageError::NotFound(id))?;
        entry.1 = status;
        Ok(())
    }

    async fn remove(&self, id: ItemId) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(stored, _)| stored.id() != id);
        if entries.len() == before {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn remove_by_status(&self, statuses: &[ItemStatus]) -> Result<usize, StorageError> {
        self.check_writable()?;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|(_, status)| !statuses.contains(status));
        Ok(before - entries.len())
    }

    async fn get_all_by_status(&self, statuses: &[ItemStatus]) -> Result<Vec<T>, StorageError> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|(_, status)| statuses.contains(status))
            .map(|(item, _)| item.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestItem, TestKind};

    #[tokio::test]
    async fn insert_then_query_by_status() {
        let storage = InMemoryQueueStorage::new();
        let a = TestItem::new("a", TestKind::A);
        let b = TestItem::new("b", TestKind::B);
        storage.insert(&a).await.unwrap();
        storage.insert(&b).await.unwrap();
        storage
            .update_status(a.id(), ItemStatus::Completed)
            .await
            .unwrap();

        let pending = storage.get_all_by_status(&[ItemStatus::Pending]).await.unwrap();
        assert_eq!(pending, vec![b.clone()]);
        assert_eq!(storage.status_of(a.id()).await, Some(ItemStatus::Completed));
    }

    #[tokio::test]
    async fn duplicate_insert_and_missing_update_are_errors() {
        let storage = InMemoryQueueStorage::new();
        let a = TestItem::new("a", TestKind::A);
        storage.insert(&a).await.unwrap();

        assert!(matches!(
            storage.insert(&a).await,
            Err(StorageError::AlreadyStored(id)) if id == a.id()
        ));
        assert!(matches!(
            storage.update_status(TestItem::new("x", TestKind::A).id(), ItemStatus::Failed).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_by_status_keeps_other_entries() {
        let a = TestItem::new("a", TestKind::A);
        let b = TestItem::new("b", TestKind::A);
        let storage = InMemoryQueueStorage::with_items([a.clone(), b.clone()], ItemStatus::Pending);
        storage
            .update_status(a.id(), ItemStatus::Completed)
            .await
            .unwrap();

        let removed = storage
            .remove_by_status(&[ItemStatus::Completed])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(storage.len().await, 1);
        assert_eq!(storage.status_of(b.id()).await, Some(ItemStatus::Pending));
    }

    #[tokio::test]
    async fn failing_writes_report_backend_errors() {
        let storage = InMemoryQueueStorage::new();
        storage.set_fail_writes(true);
        assert!(matches!(
            storage.insert(&TestItem::new("a", TestKind::A)).await,
            Err(StorageError::Backend(_))
        ));
    }
}
