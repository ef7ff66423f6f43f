//! Impls - ポートの実装
//!
//! # 実装
//! - **InMemoryQueueStorage**: 開発・テスト用のストレージ

pub mod memory_storage;

pub use self::memory_storage::InMemoryQueueStorage;
