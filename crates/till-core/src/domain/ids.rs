//! Domain identifiers (strongly-typed IDs).
//!
//! Every identifier is a ULID wrapped in `Id<T>`, where `T` is a zero-sized
//! marker. Item ids and correlation ids share one implementation but cannot be
//! mixed up at compile time.
//!
//! ## ULID の特性
//! - **時刻でソート可能**: 生成順に並ぶのでログが読みやすい
//! - **調整なしで生成可能**: プロセッサ側でもキュー側でも自由に採番できる

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait providing the display prefix of an id family.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
///
/// `T` is only a compile-time tag (PhantomData), so `Id<T>` has the size of a
/// bare `Ulid`.
#[repr(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Fresh id from the system clock and thread-local randomness.
    ///
    /// Prefer an [`IdGenerator`](crate::ports::IdGenerator) where the clock
    /// needs to be controlled.
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

// Manual impls: derives would put bounds on `T`, and markers are uninhabited enums.
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ulid.serialize(serializer)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ulid::deserialize(deserializer).map(Self::from_ulid)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Queue item marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

/// Correlation marker shared by queue-level and user-level input requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {}

impl IdMarker for Request {
    fn prefix() -> &'static str {
        "req-"
    }
}

/// Identifier of a queue item (unique within one queue instance).
pub type ItemId = Id<Item>;

/// Correlation id linking an input request to its response.
pub type RequestId = Id<Request>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let item = ItemId::generate();
        let request = RequestId::generate();

        assert!(item.to_string().starts_with("item-"));
        assert!(request.to_string().starts_with("req-"));
        // let _: ItemId = request; // <- does not compile
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let id1 = ItemId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = ItemId::generate();

        assert!(id1 < id2);
    }

    #[test]
    fn ids_serialize_as_plain_ulid_strings() {
        let ulid = Ulid::new();
        let id = RequestId::from_ulid(ulid);

        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, format!("\"{ulid}\""));

        let back: RequestId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn phantom_marker_costs_nothing() {
        assert_eq!(std::mem::size_of::<ItemId>(), std::mem::size_of::<Ulid>());
    }
}
