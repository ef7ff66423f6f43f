//! till-core
//!
//! Interactive queue-processing engine of a point-of-sale terminal.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, errors, events, outcome, state, decision, input）
//! - **correlation**: 要求と応答の相関（InputBroker）
//! - **ports**: 抽象化レイヤー（QueueProcessor, QueueStorage, Clock, IdGenerator）
//! - **processor**: BaseProcessor, DynamicProcessor, ProcessorRegistry
//! - **app**: キューエンジン（QueueBuilder, QueueManager, 実行ループ）
//! - **impls**: 実装（InMemoryQueueStorage など開発用）
//! - **domains**: 同梱ドメイン（payment, printing）

pub mod app;
pub mod correlation;
pub mod domain;
pub mod domains;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod processor;

#[cfg(test)]
pub(crate) mod testing;
