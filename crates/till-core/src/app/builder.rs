//! QueueBuilder - キューの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 既定値: 永続化が有効でストレージ未指定ならインメモリ実装を使う

use std::sync::Arc;

use super::config::QueueConfig;
use super::manager::QueueManager;
use super::persistence::StorageMirror;
use crate::domain::QueueItem;
use crate::error::ConfigError;
use crate::impls::InMemoryQueueStorage;
use crate::ports::{Clock, IdGenerator, QueueProcessor, QueueStorage, SystemClock, UlidGenerator};

/// QueueBuilder は QueueManager を構築
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new(processor)
///     .storage(storage)
///     .config(QueueConfig::default().with_start_mode(ProcessorStartMode::Confirmation))
///     .build()?;
/// ```
pub struct QueueBuilder<T: QueueItem> {
    processor: Arc<dyn QueueProcessor<T>>,
    storage: Option<Arc<dyn QueueStorage<T>>>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
}

impl<T: QueueItem> QueueBuilder<T> {
    pub fn new(processor: Arc<dyn QueueProcessor<T>>) -> Self {
        Self {
            processor,
            storage: None,
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn storage(mut self, storage: Arc<dyn QueueStorage<T>>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for request ids.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// # 検証
    /// - 設定値の妥当性（channel_capacity > 0 など）
    pub fn build(self) -> Result<QueueManager<T>, ConfigError> {
        self.config.validate()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryQueueStorage::<T>::new()));
        let mirror = StorageMirror::new(storage, self.config.persistence);
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(self.clock));

        Ok(QueueManager::new(self.processor, mirror, self.config, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestItem, scripted};

    #[test]
    fn build_with_defaults() {
        let (processor, _) = scripted();
        let queue = QueueBuilder::<TestItem>::new(processor).build();
        assert!(queue.is_ok());
    }

    #[test]
    fn build_rejects_invalid_config() {
        let (processor, _) = scripted();
        let config = QueueConfig {
            channel_capacity: 0,
            ..QueueConfig::default()
        };
        let queue = QueueBuilder::<TestItem>::new(processor).config(config).build();
        assert!(matches!(queue, Err(ConfigError::Invalid(_))));
    }
}
