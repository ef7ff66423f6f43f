//! Storage mirror - applies queue mutations to `QueueStorage` according to
//! the configured `PersistenceStrategy`.
//!
//! `OnBackground` writes go through one writer task, so they reach storage in
//! the order the queue produced them.

use std::sync::{Arc, OnceLock};

use tokio::sync::{mpsc, oneshot};

use crate::domain::{ItemId, ItemStatus, PersistenceStrategy, QueueItem};
use crate::error::StorageError;
use crate::ports::QueueStorage;

/// One storage write.
#[derive(Debug)]
pub(crate) enum StorageOp<T> {
    Insert(T),
    Update(T),
    Status(ItemId, ItemStatus),
    Remove(ItemId),
    Purge(Vec<ItemStatus>),
}

enum Command<T> {
    Apply(StorageOp<T>),
    Flush(oneshot::Sender<()>),
}

pub(crate) struct StorageMirror<T: QueueItem> {
    storage: Arc<dyn QueueStorage<T>>,
    strategy: PersistenceStrategy,
    writer: OnceLock<mpsc::UnboundedSender<Command<T>>>,
}

impl<T: QueueItem> StorageMirror<T> {
    pub(crate) fn new(storage: Arc<dyn QueueStorage<T>>, strategy: PersistenceStrategy) -> Self {
        Self {
            storage,
            strategy,
            writer: OnceLock::new(),
        }
    }

    pub(crate) fn storage(&self) -> Option<&Arc<dyn QueueStorage<T>>> {
        self.strategy.is_enabled().then_some(&self.storage)
    }

    /// Mirror one mutation. Failures are logged, never returned: the
    /// in-memory queue stays authoritative.
    pub(crate) async fn apply(&self, op: StorageOp<T>) {
        match self.strategy {
            PersistenceStrategy::Never => {}
            PersistenceStrategy::Immediate => execute(self.storage.as_ref(), op).await,
            PersistenceStrategy::OnBackground => {
                if self.writer().send(Command::Apply(op)).is_err() {
                    tracing::warn!("storage writer stopped, mutation not mirrored");
                }
            }
        }
    }

    /// Wait until every background write issued so far has been applied.
    pub(crate) async fn flush(&self) {
        if self.strategy != PersistenceStrategy::OnBackground {
            return;
        }
        let (done_tx, done_rx) = oneshot::channel();
        if self.writer().send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn writer(&self) -> &mpsc::UnboundedSender<Command<T>> {
        self.writer.get_or_init(|| {
            let (tx, mut rx) = mpsc::unbounded_channel::<Command<T>>();
            let storage = Arc::clone(&self.storage);
            tokio::spawn(async move {
                while let Some(command) = rx.recv().await {
                    match command {
                        Command::Apply(op) => execute(storage.as_ref(), op).await,
                        Command::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            });
            tx
        })
    }
}

async fn execute<T: QueueItem>(storage: &dyn QueueStorage<T>, op: StorageOp<T>) {
    let (what, result): (&str, Result<(), StorageError>) = match op {
        StorageOp::Insert(item) => ("insert", storage.insert(&item).await),
        StorageOp::Update(item) => ("update", storage.update(&item).await),
        StorageOp::Status(id, status) => ("update_status", storage.update_status(id, status).await),
        StorageOp::Remove(id) => ("remove", storage.remove(id).await),
        StorageOp::Purge(statuses) => (
            "remove_by_status",
            storage.remove_by_status(&statuses).await.map(|_| ()),
        ),
    };
    if let Err(error) = result {
        tracing::warn!(operation = what, %error, "storage mirror write failed");
    }
}
