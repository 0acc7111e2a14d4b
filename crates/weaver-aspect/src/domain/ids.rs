//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型ごとに区別します。
//! `OperationId` と `WovenTypeId` は同じ表現を持ちますが、混同はコンパイルエラーになります。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"op-", "woven-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しません。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// 新しい ID を生成（時刻 + ランダム）
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
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

/// Operation のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {}

impl IdMarker for Operation {
    fn prefix() -> &'static str {
        "op-"
    }
}

/// Woven type のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Woven {}

impl IdMarker for Woven {
    fn prefix() -> &'static str {
        "woven-"
    }
}

/// Identifier of one in-flight invocation (one start call).
pub type OperationId = Id<Operation>;

/// Identifier of one woven type (one successful weave per weaver).
pub type WovenTypeId = Id<Woven>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let op = OperationId::generate();
        let woven = WovenTypeId::generate();

        assert!(op.to_string().starts_with("op-"));
        assert!(woven.to_string().starts_with("woven-"));

        // let _: OperationId = woven; // <- does not compile
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: Vec<OperationId> = (0..64).map(|_| OperationId::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn ids_can_be_serialized() {
        let id = OperationId::generate();
        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: OperationId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<OperationId>(), size_of::<Ulid>());
        assert_eq!(size_of::<WovenTypeId>(), 16);
    }
}
