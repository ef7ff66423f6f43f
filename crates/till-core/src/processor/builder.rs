//! DynamicProcessorBuilder - processor の組み立て
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use super::context::{DEFAULT_CHANNEL_CAPACITY, ProcessorContext};
use super::dynamic::DynamicProcessor;
use super::registry::ProcessorRegistry;
use crate::domain::QueueItem;
use crate::error::RegistryError;
use crate::ports::{Clock, QueueProcessor, SystemClock};

/// DynamicProcessorBuilder は DynamicProcessor を構築
///
/// # 使用例
/// ```ignore
/// let processor = DynamicProcessorBuilder::new()
///     .register(PaymentProcessorType::Cash, cash)?
///     .register(PaymentProcessorType::Acquirer, acquirer)?
///     .fallback(PaymentProcessorType::Acquirer)
///     .expect_types(&[PaymentProcessorType::Cash, PaymentProcessorType::Acquirer])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_types() で期待される processor type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば RegistryError::MissingProcessorTypes を返す
pub struct DynamicProcessorBuilder<T: QueueItem> {
    registry: ProcessorRegistry<T>,
    fallback: Option<T::ProcessorType>,
    expected: Option<Vec<T::ProcessorType>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl<T: QueueItem> DynamicProcessorBuilder<T> {
    pub fn new() -> Self {
        Self {
            registry: ProcessorRegistry::new(),
            fallback: None,
            expected: None,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn register(
        mut self,
        processor_type: T::ProcessorType,
        processor: Arc<dyn QueueProcessor<T>>,
    ) -> Result<Self, RegistryError> {
        self.registry.register(processor_type, processor)?;
        Ok(self)
    }

    /// Type used when an item's own type has no processor.
    pub fn fallback(mut self, processor_type: T::ProcessorType) -> Self {
        self.fallback = Some(processor_type);
        self
    }

    pub fn expect_types(mut self, processor_types: &[T::ProcessorType]) -> Self {
        self.expected = Some(processor_types.to_vec());
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// # 検証
    /// - expect_types() で設定された type が全て登録されているかチェック
    pub fn build(self) -> Result<DynamicProcessor<T>, RegistryError> {
        if let Some(expected) = &self.expected {
            let missing: Vec<String> = expected
                .iter()
                .filter(|ty| !self.registry.contains(**ty))
                .map(|ty| format!("{ty:?}"))
                .collect();
            if !missing.is_empty() {
                return Err(RegistryError::MissingProcessorTypes(missing));
            }
        }
        Ok(DynamicProcessor::from_parts(
            self.registry.into_map(),
            self.fallback,
            ProcessorContext::with_clock(self.capacity, self.clock),
        ))
    }
}

impl<T: QueueItem> Default for DynamicProcessorBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
