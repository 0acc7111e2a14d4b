//! weaver-aspect
//!
//! Start/await (begin/end) pairs for synchronous methods, attached to a type
//! by registration instead of hand-written plumbing.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, fault, signature）
//! - **binding**: 宣言の登録と binding 解決（declaration, descriptor, resolver, table）
//! - **handle**: OperationHandle（Pending -> Running -> Completed | Faulted）
//! - **dispatcher**: worker pool（tokio blocking pool）と callback 配送
//! - **weaver**: 型ごとの weave とキャッシュ、`Woven<T>`
//! - **config**: DispatcherConfig
//! - **observability**: dispatcher のカウンタ
//! - **error**: ConfigurationError / MisuseError / DispatchError / AspectError
//!
//! # 使用例
//! ```ignore
//! impl AsyncAspect for TestObject {
//!     fn declare(ty: &mut TypeDescriptor<Self>) {
//!         ty.method("test", |o: &TestObject, (i, s): (i32, Option<String>)| o.test(i, s));
//!         ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test").with_callback());
//!         ty.declare(Declaration::end::<i32>("end_test"));
//!     }
//! }
//!
//! let weaver = Weaver::new(&DispatcherConfig::default())?;
//! let obj = weaver.instantiate(TestObject)?;
//! let handle = obj.begin_with_callback("begin_test", (2, None::<String>), None)?;
//! let value: i32 = obj.end("end_test", &handle)?;
//! ```

pub mod binding;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod handle;
pub mod observability;
pub mod weaver;

pub use binding::{
    AsyncAspect, BindingTable, Completion, Declaration, ExplicitBinding, TypeDescriptor,
};
pub use config::DispatcherConfig;
pub use dispatcher::{Callback, Dispatcher};
pub use domain::{ExecutionFault, FaultKind, HandleState, OperationId, WovenTypeId};
pub use error::{AspectError, ConfigurationError, DispatchError, MisuseError};
pub use handle::{AsyncState, HandleOrigin, OperationHandle, Outcome};
pub use observability::DispatcherCounts;
pub use weaver::{Weaver, Woven, WovenType};
