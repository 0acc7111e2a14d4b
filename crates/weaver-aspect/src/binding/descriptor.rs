//! TypeDescriptor - 同期メソッドと start/await 宣言の登録
//!
//! # 学習ポイント
//! - ジェネリックなクロージャを object-safe な `DynMethod<T>` に型消去する
//! - 引数タプルは `Box<dyn Any + Send>` として worker に渡り、そこで復元される

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::binding::declaration::Declaration;
use crate::domain::{Args, ExecutionFault, ParamType};

/// Result of a wrapped call, shared by every observer of one handle.
pub type ErasedValue = Arc<dyn Any + Send + Sync>;

/// A type whose synchronous methods can be wrapped by start/await pairs.
///
/// # 使用例
/// ```ignore
/// impl AsyncAspect for Repository {
///     fn declare(ty: &mut TypeDescriptor<Self>) {
///         ty.method("load", |repo: &Repository, (id,): (u64,)| repo.load(id));
///         ty.declare(Declaration::begin::<(u64,)>("begin_load"));
///         ty.declare(Declaration::end::<Record>("end_load"));
///     }
/// }
/// ```
pub trait AsyncAspect: Send + Sync + Sized + 'static {
    fn declare(ty: &mut TypeDescriptor<Self>);
}

/// Object-safe invoker of one registered synchronous method.
pub trait DynMethod<T>: Send + Sync {
    fn invoke(&self, target: &T, args: Box<dyn Any + Send>) -> Result<ErasedValue, ExecutionFault>;
}

#[derive(Debug, thiserror::Error)]
#[error("arguments do not match {expected}")]
struct MismatchedArguments {
    expected: &'static str,
}

type BoxedFn<T, A, R> = Box<dyn Fn(&T, A) -> Result<R, ExecutionFault> + Send + Sync>;

/// `Fn(&T, A) -> Result<R, _>` を DynMethod に変換するラッパー
pub struct TypedMethod<T, A, R> {
    f: BoxedFn<T, A, R>,
    _marker: PhantomData<fn(A) -> R>,
}

impl<T, A, R> TypedMethod<T, A, R> {
    fn new(f: BoxedFn<T, A, R>) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<T, A, R> DynMethod<T> for TypedMethod<T, A, R>
where
    T: 'static,
    A: Args,
    R: Send + Sync + 'static,
{
    fn invoke(&self, target: &T, args: Box<dyn Any + Send>) -> Result<ErasedValue, ExecutionFault> {
        let args = args.downcast::<A>().map_err(|_| {
            ExecutionFault::from_error(MismatchedArguments {
                expected: std::any::type_name::<A>(),
            })
        })?;
        let value = (self.f)(target, *args)?;
        Ok(Arc::new(value))
    }
}

/// One registered synchronous method.
pub struct MethodEntry<T> {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamType>,
    pub(crate) result: ParamType,
    pub(crate) invoker: Arc<dyn DynMethod<T>>,
}

impl<T> MethodEntry<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn result(&self) -> ParamType {
        self.result
    }
}

/// Everything the resolver reads about one type: its synchronous methods and
/// its start/await declarations.
pub struct TypeDescriptor<T> {
    type_name: &'static str,
    pub(crate) methods: Vec<MethodEntry<T>>,
    pub(crate) declarations: Vec<Declaration>,
}

impl<T: 'static> TypeDescriptor<T> {
    pub fn new() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            methods: Vec::new(),
            declarations: Vec::new(),
        }
    }

    /// Register an infallible synchronous method.
    pub fn method<A, R, F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        A: Args,
        R: Send + Sync + 'static,
        F: Fn(&T, A) -> R + Send + Sync + 'static,
    {
        self.push_method::<A, R>(
            name.into(),
            Box::new(move |target: &T, args: A| Ok(f(target, args))),
        )
    }

    /// Register a synchronous method that may fail; its error becomes the
    /// handle's captured fault.
    pub fn try_method<A, R, E, F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        A: Args,
        R: Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&T, A) -> Result<R, E> + Send + Sync + 'static,
    {
        self.push_method::<A, R>(
            name.into(),
            Box::new(move |target: &T, args: A| {
                f(target, args).map_err(ExecutionFault::from_error)
            }),
        )
    }

    pub fn declare(&mut self, declaration: Declaration) -> &mut Self {
        self.declarations.push(declaration);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn methods(&self) -> &[MethodEntry<T>] {
        &self.methods
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    fn push_method<A, R>(&mut self, name: String, f: BoxedFn<T, A, R>) -> &mut Self
    where
        A: Args,
        R: Send + Sync + 'static,
    {
        self.methods.push(MethodEntry {
            name,
            params: A::signature(),
            result: ParamType::of::<R>(),
            invoker: Arc::new(TypedMethod::new(f)),
        });
        self
    }
}

impl<T: 'static> Default for TypeDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FaultKind;

    struct Calculator {
        offset: i64,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("division by zero")]
    struct DivByZero;

    fn describe() -> TypeDescriptor<Calculator> {
        let mut ty = TypeDescriptor::<Calculator>::new();
        ty.method("add", |c: &Calculator, (a, b): (i64, i64)| a + b + c.offset)
            .try_method("div", |_: &Calculator, (a, b): (i64, i64)| {
                if b == 0 { Err(DivByZero) } else { Ok(a / b) }
            });
        ty
    }

    #[test]
    fn registers_signature_from_argument_tuple() {
        let ty = describe();
        let add = &ty.methods()[0];
        assert_eq!(add.name(), "add");
        assert_eq!(add.params(), <(i64, i64)>::signature().as_slice());
        assert_eq!(add.result(), ParamType::of::<i64>());
        assert!(ty.type_name().ends_with("Calculator"));
    }

    #[test]
    fn erased_invoker_calls_the_method() {
        let ty = describe();
        let calc = Calculator { offset: 10 };
        let value = ty.methods()[0]
            .invoker
            .invoke(&calc, Box::new((1_i64, 2_i64)))
            .unwrap();
        assert_eq!(value.downcast_ref::<i64>(), Some(&13));
    }

    #[test]
    fn fallible_method_errors_become_faults() {
        let ty = describe();
        let calc = Calculator { offset: 0 };
        let fault = ty.methods()[1]
            .invoker
            .invoke(&calc, Box::new((1_i64, 0_i64)))
            .unwrap_err();
        assert_eq!(fault.kind(), FaultKind::Error);
        assert_eq!(fault.message(), "division by zero");
        assert!(fault.downcast_ref::<DivByZero>().is_some());
    }

    #[test]
    fn wrong_argument_tuple_is_reported_not_panicked() {
        let ty = describe();
        let calc = Calculator { offset: 0 };
        let fault = ty.methods()[0]
            .invoker
            .invoke(&calc, Box::new(("one", "two")))
            .unwrap_err();
        assert!(fault.message().contains("arguments do not match"));
    }
}
