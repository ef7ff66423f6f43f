//! ProcessorRegistry - processor の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - 二重登録はエラー（黙って上書きしない）
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::QueueItem;
use crate::error::RegistryError;
use crate::ports::QueueProcessor;

/// ProcessorRegistry は processor type ごとに 1 つの processor を保持
///
/// # 使用例
/// ```ignore
/// let mut registry = ProcessorRegistry::new();
/// registry.register(PaymentProcessorType::Cash, cash.into_shared())?;
///
/// let cash = registry.get(PaymentProcessorType::Cash);
/// ```
pub struct ProcessorRegistry<T: QueueItem> {
    processors: HashMap<T::ProcessorType, Arc<dyn QueueProcessor<T>>>,
}

impl<T: QueueItem> ProcessorRegistry<T> {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        processor_type: T::ProcessorType,
        processor: Arc<dyn QueueProcessor<T>>,
    ) -> Result<(), RegistryError> {
        if self.processors.contains_key(&processor_type) {
            return Err(RegistryError::AlreadyRegistered(format!("{processor_type:?}")));
        }
        self.processors.insert(processor_type, processor);
        Ok(())
    }

    pub fn get(&self, processor_type: T::ProcessorType) -> Option<Arc<dyn QueueProcessor<T>>> {
        self.processors.get(&processor_type).cloned()
    }

    pub fn contains(&self, processor_type: T::ProcessorType) -> bool {
        self.processors.contains_key(&processor_type)
    }

    pub fn registered_types(&self) -> Vec<T::ProcessorType> {
        self.processors.keys().copied().collect()
    }

    pub(crate) fn into_map(self) -> HashMap<T::ProcessorType, Arc<dyn QueueProcessor<T>>> {
        self.processors
    }
}

impl<T: QueueItem> Default for ProcessorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{BaseProcessor, ProcessorContext, ProcessorHandler};
    use crate::domain::ProcessingResult;
    use crate::testing::{TestEvent, TestItem, TestKind};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ProcessorHandler<TestItem> for Noop {
        async fn process_item(
            &self,
            _item: &TestItem,
            _ctx: &ProcessorContext<TestEvent>,
        ) -> ProcessingResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = ProcessorRegistry::<TestItem>::new();
        registry
            .register(TestKind::A, BaseProcessor::new(Noop).into_shared())
            .unwrap();

        assert!(registry.get(TestKind::A).is_some());
        assert!(registry.get(TestKind::B).is_none());
        assert_eq!(registry.registered_types(), vec![TestKind::A]);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = ProcessorRegistry::<TestItem>::new();
        registry
            .register(TestKind::A, BaseProcessor::new(Noop).into_shared())
            .unwrap();
        let result = registry.register(TestKind::A, BaseProcessor::new(Noop).into_shared());

        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(name)) if name == "A"));
    }
}
