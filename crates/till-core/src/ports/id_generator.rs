//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use ulid::Ulid;

use crate::domain::ids::{ItemId, RequestId};
use crate::ports::Clock;

/// IdGenerator はアイテムとリクエストの ID を生成
///
/// # ULID の特性
/// - 時刻でソート可能
/// - 調整不要で生成可能
///
/// # Thread Safety
/// - `Send + Sync` を要求（run loop と processor の両方から使う）
pub trait IdGenerator: Send + Sync {
    fn generate_item_id(&self) -> ItemId;

    /// Correlation id for a queue or user input request.
    fn generate_request_id(&self) -> RequestId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// これにより、テスト時に FixedClock を使って決定的なタイムスタンプを得られます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_item_id(&self) -> ItemId {
        ItemId::from(self.next_ulid())
    }

    fn generate_request_id(&self) -> RequestId {
        RequestId::from(self.next_ulid())
    }
}
