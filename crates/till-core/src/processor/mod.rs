//! Processors - 処理戦略の配管
//!
//! # 主要コンポーネント
//! - **ProcessorContext**: イベント・ユーザー入力の配管
//! - **BaseProcessor**: `ProcessorHandler` を `QueueProcessor` に変換
//! - **DynamicProcessor**: processor type ごとに委譲するファサード
//! - **ProcessorRegistry / DynamicProcessorBuilder**: 登録と起動時検証

pub mod base;
pub mod builder;
pub mod context;
pub mod dynamic;
pub mod registry;

pub use self::base::{BaseProcessor, ProcessorHandler};
pub use self::builder::DynamicProcessorBuilder;
pub use self::context::{DEFAULT_CHANNEL_CAPACITY, ProcessorContext};
pub use self::dynamic::DynamicProcessor;
pub use self::registry::ProcessorRegistry;
