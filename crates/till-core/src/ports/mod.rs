//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait はエンジンの外側にあるもの（決済端末 SDK、データベース、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - メモリ上のキューが source of truth（正本）
//! - QueueStorage は再起動後の再開用のミラー
//! - QueueProcessor は vendor SDK をラップする具体的な戦略

pub mod clock;
pub mod id_generator;
pub mod processor;
pub mod storage;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::processor::QueueProcessor;
pub use self::storage::QueueStorage;
