//! Weaver - binding 表から start/await の振る舞いを組み立てる
//!
//! # 学習ポイント
//! - 型ごとのキャッシュ（`TypeId` -> `OnceLock`）で weave は 1 回だけ
//! - 振る舞いはクロージャとして保持し、元のメソッドには触れない
//! - `Woven<T>` は `Deref<Target = T>` なので同期メソッドもそのまま呼べる
//!
//! # 使用例
//! ```ignore
//! let weaver = Weaver::new(&DispatcherConfig::default())?;
//! let obj = weaver.instantiate(TestObject::default())?;
//!
//! let handle = obj.begin("begin_test", (2, Some("12".to_string())))?;
//! let value: i32 = obj.end("end_test", &handle)?;
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::{error, info, warn};

use crate::binding::{
    AsyncAspect, BindingId, BindingTable, Completion, DeclId, DeclKind, DynMethod, TypeDescriptor,
    resolve,
};
use crate::config::DispatcherConfig;
use crate::dispatcher::{Callback, Dispatcher, Work};
use crate::domain::signature::display_signature;
use crate::domain::{Args, ParamType, WovenTypeId};
use crate::error::{AspectError, ConfigurationError, DispatchError, MisuseError};
use crate::handle::{AsyncState, HandleOrigin, OperationHandle, Outcome};

type WeaveCell<T> = OnceLock<Result<Arc<WovenType<T>>, ConfigurationError>>;

/// Installs start/await behavior for types, once per type.
pub struct Weaver {
    dispatcher: Arc<Dispatcher>,
    woven: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Weaver {
    pub fn new(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        Ok(Self::with_dispatcher(Arc::new(Dispatcher::new(config)?)))
    }

    pub fn with_dispatcher(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            woven: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Resolve and install `T`'s bindings, or return the cached result.
    ///
    /// Concurrent callers block on the same cell; `T::declare` runs once.
    /// A configuration error is cached too, so it is reported identically
    /// every time.
    pub fn weave<T: AsyncAspect>(&self) -> Result<Arc<WovenType<T>>, ConfigurationError> {
        let cell = self.cell::<T>();
        cell.get_or_init(|| WovenType::build(Arc::clone(&self.dispatcher)))
            .clone()
    }

    /// Wrap a fresh instance of `T`.
    pub fn instantiate<T: AsyncAspect>(&self, value: T) -> Result<Woven<T>, ConfigurationError> {
        self.wrap(Arc::new(value))
    }

    /// Wrap an instance that is already shared.
    pub fn wrap<T: AsyncAspect>(&self, instance: Arc<T>) -> Result<Woven<T>, ConfigurationError> {
        Ok(Woven {
            instance,
            ty: self.weave::<T>()?,
        })
    }

    fn cell<T: AsyncAspect>(&self) -> Arc<WeaveCell<T>> {
        let mut woven = self.woven.lock().unwrap_or_else(PoisonError::into_inner);
        let key = TypeId::of::<T>();
        if let Some(Ok(cell)) = woven.get(&key).cloned().map(|c| c.downcast::<WeaveCell<T>>()) {
            return cell;
        }
        let cell = Arc::new(WeaveCell::<T>::new());
        woven.insert(key, Arc::clone(&cell) as Arc<dyn Any + Send + Sync>);
        cell
    }
}

/// Installed start behavior of one `begin_*` declaration.
struct BeginBehavior<T> {
    binding: BindingId,
    target: String,
    args_type: TypeId,
    params: Vec<ParamType>,
    invoker: Arc<dyn DynMethod<T>>,
}

/// Installed await behavior of one `end_*` declaration.
struct EndBehavior {
    binding: BindingId,
    result: ParamType,
}

/// The start/await behavior installed for one type.
pub struct WovenType<T> {
    id: WovenTypeId,
    table: BindingTable,
    begins: HashMap<DeclId, BeginBehavior<T>>,
    ends: HashMap<String, EndBehavior>,
    dispatcher: Arc<Dispatcher>,
}

impl<T: AsyncAspect> WovenType<T> {
    fn build(dispatcher: Arc<Dispatcher>) -> Result<Arc<Self>, ConfigurationError> {
        let mut ty = TypeDescriptor::<T>::new();
        T::declare(&mut ty);

        let table = resolve(&ty).inspect_err(|err| {
            error!(type_name = ty.type_name(), error = %err, "weave failed");
        })?;
        if table.is_empty() {
            warn!(type_name = ty.type_name(), "type declares no start/await pairs");
        }

        let mut begins = HashMap::new();
        let mut ends = HashMap::new();
        for decl in ty.declarations() {
            let Some(binding) = table.lookup(decl.id()) else {
                continue;
            };
            match decl.id().kind {
                DeclKind::Begin(_) => {
                    let method = &ty.methods()[binding.method_index];
                    begins.insert(
                        decl.id().clone(),
                        BeginBehavior {
                            binding: binding.id(),
                            target: binding.target().to_string(),
                            args_type: decl.value_type,
                            params: binding.params().to_vec(),
                            invoker: Arc::clone(&method.invoker),
                        },
                    );
                }
                DeclKind::End => {
                    ends.insert(
                        decl.id().name.clone(),
                        EndBehavior {
                            binding: binding.id(),
                            result: binding.result(),
                        },
                    );
                }
            }
        }

        let woven = Self {
            id: WovenTypeId::generate(),
            table,
            begins,
            ends,
            dispatcher,
        };
        info!(
            type_name = woven.table.type_name(),
            woven = %woven.id,
            bindings = woven.table.len(),
            "type woven"
        );
        Ok(Arc::new(woven))
    }

    pub fn id(&self) -> WovenTypeId {
        self.id
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.table
    }

    fn start<A: Args>(
        &self,
        instance: &Arc<T>,
        decl: DeclId,
        args: A,
        callback: Option<Callback>,
        state: Option<AsyncState>,
    ) -> Result<OperationHandle, AspectError> {
        let Some(behavior) = self.begins.get(&decl) else {
            return Err(MisuseError::UnknownDeclaration {
                type_name: self.table.type_name().to_string(),
                decl,
            }
            .into());
        };
        if TypeId::of::<A>() != behavior.args_type {
            return Err(MisuseError::ArgumentMismatch {
                decl,
                expected: display_signature(&behavior.params),
                found: display_signature(&A::signature()),
            }
            .into());
        }

        let handle = OperationHandle::new(
            HandleOrigin {
                woven: self.id,
                binding: behavior.binding,
                target: behavior.target.clone(),
                started_by: decl,
            },
            state,
        );
        let invoker = Arc::clone(&behavior.invoker);
        let target = Arc::clone(instance);
        let work: Work = Box::new(move || invoker.invoke(&target, Box::new(args)));
        self.dispatcher.submit(handle.clone(), work, callback)?;
        Ok(handle)
    }

    fn finish<R: Clone + 'static>(
        &self,
        name: &str,
        handle: &OperationHandle,
    ) -> Result<R, AspectError> {
        let decl = DeclId::end(name);
        let Some(behavior) = self.ends.get(name) else {
            return Err(MisuseError::UnknownDeclaration {
                type_name: self.table.type_name().to_string(),
                decl,
            }
            .into());
        };
        let requested = ParamType::of::<R>();
        if requested != behavior.result {
            return Err(MisuseError::ResultTypeMismatch {
                decl,
                expected: behavior.result.name().to_string(),
                found: requested.name().to_string(),
            }
            .into());
        }
        let origin = handle.origin();
        if origin.woven != self.id || origin.binding != behavior.binding {
            return Err(MisuseError::ForeignHandle {
                decl,
                operation: handle.id().to_string(),
                origin: origin.started_by.to_string(),
            }
            .into());
        }

        match handle.wait() {
            Outcome::Completed(value) => value.downcast_ref::<R>().cloned().ok_or_else(|| {
                AspectError::Misuse(MisuseError::ResultTypeMismatch {
                    decl,
                    expected: behavior.result.name().to_string(),
                    found: requested.name().to_string(),
                })
            }),
            Outcome::Faulted(fault) => Err(AspectError::Execution(fault)),
        }
    }
}

impl<T> fmt::Debug for WovenType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WovenType")
            .field("id", &self.id)
            .field("type_name", &self.table.type_name())
            .field("bindings", &self.table.len())
            .finish()
    }
}

/// An instance of `T` with its start/await behavior attached.
///
/// Dereferences to `T`, so the wrapped synchronous methods stay directly
/// callable.
pub struct Woven<T: AsyncAspect> {
    instance: Arc<T>,
    ty: Arc<WovenType<T>>,
}

impl<T: AsyncAspect> Woven<T> {
    /// `begin_x(args)`
    pub fn begin<A: Args>(&self, name: &str, args: A) -> Result<OperationHandle, AspectError> {
        self.start(name, Completion::None, args, None, None)
    }

    /// `begin_x(args, callback)`; `None` is a valid callback.
    pub fn begin_with_callback<A: Args>(
        &self,
        name: &str,
        args: A,
        callback: Option<Callback>,
    ) -> Result<OperationHandle, AspectError> {
        self.start(name, Completion::Callback, args, callback, None)
    }

    /// `begin_x(args, callback, state)`; the state is readable from the handle.
    pub fn begin_with_state<A: Args>(
        &self,
        name: &str,
        args: A,
        callback: Option<Callback>,
        state: Option<AsyncState>,
    ) -> Result<OperationHandle, AspectError> {
        self.start(name, Completion::CallbackState, args, callback, state)
    }

    /// `end_x(handle)`: blocks until the operation finishes, then returns its
    /// value or the captured fault.
    pub fn end<R: Clone + 'static>(
        &self,
        name: &str,
        handle: &OperationHandle,
    ) -> Result<R, AspectError> {
        self.ty.finish(name, handle)
    }

    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    pub fn woven_type(&self) -> &Arc<WovenType<T>> {
        &self.ty
    }

    fn start<A: Args>(
        &self,
        name: &str,
        completion: Completion,
        args: A,
        callback: Option<Callback>,
        state: Option<AsyncState>,
    ) -> Result<OperationHandle, AspectError> {
        let decl = DeclId::begin(name, completion);
        self.ty.start(&self.instance, decl, args, callback, state)
    }
}

impl<T: AsyncAspect> Clone for Woven<T> {
    fn clone(&self) -> Self {
        Self {
            instance: Arc::clone(&self.instance),
            ty: Arc::clone(&self.ty),
        }
    }
}

impl<T: AsyncAspect> Deref for Woven<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: AsyncAspect + fmt::Debug> fmt::Debug for Woven<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Woven")
            .field("instance", &self.instance)
            .field("woven", &self.ty.id)
            .finish()
    }
}
