//! Domains - 同梱ドメイン
//!
//! 汎用エンジンの上に作った具体的なアイテム型とローカル processor。
//!
//! # 同梱しないもの
//! - vendor SDK の戦略（acquirer 決済、acquirer プリンタ）
//! - processor type だけは定義済みなので、連携側が登録すれば DynamicProcessor から届く

pub mod payment;
pub mod printing;
