//! Binding - start/await 宣言と同期メソッドの対応付け
//!
//! # 構成
//! - **declaration**: 宣言（`begin_x` の 3 つの overload と `end_x`）と明示 binding
//! - **descriptor**: 型ごとのメソッド・宣言の登録（`AsyncAspect` trait）
//! - **resolver**: 宣言から `BindingTable` を構築
//! - **table**: 構築後は読み取り専用の binding 表

pub mod declaration;
pub mod descriptor;
pub mod resolver;
pub mod table;

pub use self::declaration::{
    BEGIN_PREFIX, Completion, DeclId, DeclKind, Declaration, END_PREFIX, ExplicitBinding,
};
pub use self::descriptor::{AsyncAspect, DynMethod, ErasedValue, MethodEntry, TypeDescriptor};
pub use self::resolver::resolve;
pub use self::table::{Binding, BindingId, BindingSummary, BindingTable};
