//! Parameter signatures.
//!
//! Rust has no runtime reflection over method parameters, so a method's
//! signature is derived from the tuple type of its arguments.

use std::any::TypeId;
use std::fmt;

/// One parameter (or result) type.
///
/// Equality is by `TypeId`; the name is kept for diagnostics only.
#[derive(Clone, Copy)]
pub struct ParamType {
    id: TypeId,
    name: &'static str,
}

impl ParamType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ParamType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParamType {}

impl std::hash::Hash for ParamType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Renders a parameter list as `(a, b, c)`.
pub fn display_signature(params: &[ParamType]) -> String {
    let names: Vec<&str> = params.iter().map(ParamType::name).collect();
    format!("({})", names.join(", "))
}

/// An argument list, forwarded as one value from the start call to the worker.
///
/// Implemented for tuples of up to eight `'static + Send` elements; `()` is
/// the empty list.
pub trait Args: Send + 'static {
    fn signature() -> Vec<ParamType>;
}

macro_rules! impl_args {
    ($($name:ident),*) => {
        impl<$($name: Send + 'static),*> Args for ($($name,)*) {
            fn signature() -> Vec<ParamType> {
                vec![$(ParamType::of::<$name>()),*]
            }
        }
    };
}

impl_args!();
impl_args!(A1);
impl_args!(A1, A2);
impl_args!(A1, A2, A3);
impl_args!(A1, A2, A3, A4);
impl_args!(A1, A2, A3, A4, A5);
impl_args!(A1, A2, A3, A4, A5, A6);
impl_args!(A1, A2, A3, A4, A5, A6, A7);
impl_args!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_signature_lists_each_element_in_order() {
        let sig = <(i32, Option<String>)>::signature();
        assert_eq!(sig, vec![ParamType::of::<i32>(), ParamType::of::<Option<String>>()]);
        assert_eq!(<()>::signature(), Vec::new());
        assert_eq!(<(u8,)>::signature().len(), 1);
    }

    #[test]
    fn equality_ignores_names_and_uses_type_ids() {
        assert_eq!(ParamType::of::<String>(), ParamType::of::<std::string::String>());
        assert_ne!(ParamType::of::<i32>(), ParamType::of::<i64>());
    }

    #[test]
    fn display_signature_renders_type_names() {
        let rendered = display_signature(&<(i32, bool)>::signature());
        assert_eq!(rendered, "(i32, bool)");
        assert_eq!(display_signature(&[]), "()");
    }
}
