//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてキューエンジンを実装します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: キューの構築とワイヤリング
//! - **QueueManager**: アイテムの所有と公開 API
//! - **worker_loop**: 実行ループ（取り出し→確認→処理→判断）
//! - **persistence**: `PersistenceStrategy` に従ったストレージミラー

pub mod builder;
pub mod config;
pub mod manager;
mod persistence;
mod worker_loop;

pub use self::builder::QueueBuilder;
pub use self::config::QueueConfig;
pub use self::manager::QueueManager;
