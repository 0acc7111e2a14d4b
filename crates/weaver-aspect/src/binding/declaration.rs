//! Start/await declarations and their explicit-binding configuration.

use std::any::TypeId;
use std::fmt;

use crate::domain::{Args, ParamType};

/// Default name prefix of start declarations (`begin_<target>`).
pub const BEGIN_PREFIX: &str = "begin_";

/// Default name prefix of await declarations (`end_<target>`).
pub const END_PREFIX: &str = "end_";

/// Which trailing parameters a start overload takes after the forwarded arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Completion {
    /// `begin_x(args)`
    None,
    /// `begin_x(args, callback)`
    Callback,
    /// `begin_x(args, callback, state)`
    CallbackState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclKind {
    Begin(Completion),
    End,
}

/// Identity of a declaration: start overloads and an await declaration may
/// share a name, and are told apart by kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId {
    pub name: String,
    pub kind: DeclKind,
}

impl DeclId {
    pub fn begin(name: impl Into<String>, completion: Completion) -> Self {
        Self {
            name: name.into(),
            kind: DeclKind::Begin(completion),
        }
    }

    pub fn end(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DeclKind::End,
        }
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeclKind::Begin(Completion::None) => write!(f, "{}(args)", self.name),
            DeclKind::Begin(Completion::Callback) => write!(f, "{}(args, callback)", self.name),
            DeclKind::Begin(Completion::CallbackState) => {
                write!(f, "{}(args, callback, state)", self.name)
            }
            DeclKind::End => write!(f, "{}(handle)", self.name),
        }
    }
}

/// Explicit target override: `{ target name?, ordered parameter types? }`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplicitBinding {
    pub target: Option<String>,
    pub param_types: Option<Vec<ParamType>>,
}

/// One declared start or await method.
///
/// # Example
/// ```ignore
/// ty.declare(Declaration::begin::<(i32, Option<String>)>("begin_test"));
/// ty.declare(Declaration::end::<i32>("end_test"));
///
/// // name differs from the target; explicit types pick the overload
/// ty.declare(
///     Declaration::begin::<(i32, Option<String>)>("any_name")
///         .with_state()
///         .target("test"),
/// );
/// ty.declare(
///     Declaration::end::<i32>("any_name")
///         .target("test")
///         .param_types::<(i32, Option<String>)>(),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Declaration {
    pub(crate) id: DeclId,
    /// Begin: forwarded argument types. End: empty.
    pub(crate) params: Vec<ParamType>,
    /// Begin: `TypeId` of the argument tuple. End: `TypeId` of the result.
    pub(crate) value_type: TypeId,
    /// End: declared result type.
    pub(crate) result: Option<ParamType>,
    pub(crate) explicit: ExplicitBinding,
}

impl Declaration {
    /// A start declaration without callback; chain `with_callback` /
    /// `with_state` for the other overloads.
    pub fn begin<A: Args>(name: impl Into<String>) -> Self {
        Self {
            id: DeclId::begin(name, Completion::None),
            params: A::signature(),
            value_type: TypeId::of::<A>(),
            result: None,
            explicit: ExplicitBinding::default(),
        }
    }

    /// An await declaration yielding `R`.
    pub fn end<R: 'static>(name: impl Into<String>) -> Self {
        Self {
            id: DeclId::end(name),
            params: Vec::new(),
            value_type: TypeId::of::<R>(),
            result: Some(ParamType::of::<R>()),
            explicit: ExplicitBinding::default(),
        }
    }

    pub fn with_callback(mut self) -> Self {
        if let DeclKind::Begin(_) = self.id.kind {
            self.id.kind = DeclKind::Begin(Completion::Callback);
        }
        self
    }

    pub fn with_state(mut self) -> Self {
        if let DeclKind::Begin(_) = self.id.kind {
            self.id.kind = DeclKind::Begin(Completion::CallbackState);
        }
        self
    }

    /// Bind to the method named `target` instead of the prefix-derived name.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.explicit.target = Some(target.into());
        self
    }

    /// Pick the target overload with exactly these parameter types.
    pub fn param_types<A: Args>(mut self) -> Self {
        self.explicit.param_types = Some(A::signature());
        self
    }

    /// Apply a whole explicit-binding configuration at once.
    pub fn with_binding(mut self, binding: ExplicitBinding) -> Self {
        self.explicit = binding;
        self
    }

    pub fn id(&self) -> &DeclId {
        &self.id
    }

    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    pub fn explicit(&self) -> &ExplicitBinding {
        &self.explicit
    }

    /// Target method name: explicit, else derived from the default prefix.
    pub(crate) fn target_name(&self) -> Option<String> {
        if let Some(target) = &self.explicit.target {
            return Some(target.clone());
        }
        let prefix = match self.id.kind {
            DeclKind::Begin(_) => BEGIN_PREFIX,
            DeclKind::End => END_PREFIX,
        };
        self.id
            .name
            .strip_prefix(prefix)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_name_is_derived_from_prefix() {
        let begin = Declaration::begin::<(i32,)>("begin_load");
        let end = Declaration::end::<i32>("end_load");
        assert_eq!(begin.target_name().as_deref(), Some("load"));
        assert_eq!(end.target_name().as_deref(), Some("load"));
    }

    #[test]
    fn explicit_target_wins_over_prefix() {
        let decl = Declaration::begin::<(i32,)>("begin_load").target("fetch");
        assert_eq!(decl.target_name().as_deref(), Some("fetch"));
    }

    #[test]
    fn unprefixed_name_without_target_has_no_target() {
        assert_eq!(Declaration::begin::<()>("any_name").target_name(), None);
        assert_eq!(Declaration::end::<()>("begin_x").target_name(), None);
        assert_eq!(Declaration::begin::<()>("begin_").target_name(), None);
    }

    #[test]
    fn completion_overloads_change_identity() {
        let plain = Declaration::begin::<(i32,)>("begin_load");
        let cb = plain.clone().with_callback();
        let state = plain.clone().with_state();

        assert_eq!(plain.id().kind, DeclKind::Begin(Completion::None));
        assert_eq!(cb.id().kind, DeclKind::Begin(Completion::Callback));
        assert_eq!(state.id().kind, DeclKind::Begin(Completion::CallbackState));
        assert_ne!(plain.id(), cb.id());
    }

    #[test]
    fn completion_does_not_apply_to_end() {
        let end = Declaration::end::<i32>("end_load").with_state();
        assert_eq!(end.id().kind, DeclKind::End);
    }

    #[test]
    fn decl_id_display_shows_overload() {
        assert_eq!(
            DeclId::begin("begin_load", Completion::CallbackState).to_string(),
            "begin_load(args, callback, state)"
        );
        assert_eq!(DeclId::end("end_load").to_string(), "end_load(handle)");
    }
}
