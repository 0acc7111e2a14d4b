use thiserror::Error;

use crate::binding::DeclId;
use crate::domain::ExecutionFault;

/// Raised once while resolving a type's declarations. The type cannot be
/// woven until the declarations are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{type_name}: declaration `{decl}` names no target; use the `begin_`/`end_` prefix or an explicit target")]
    Untargeted { type_name: String, decl: DeclId },

    #[error("{type_name}: target method `{target}{signature}` for `{decl}` not found")]
    TargetNotFound {
        type_name: String,
        decl: DeclId,
        target: String,
        signature: String,
    },

    #[error("{type_name}: target `{target}` for `{decl}` is ambiguous between {candidates:?}; give explicit parameter types")]
    AmbiguousTarget {
        type_name: String,
        decl: DeclId,
        target: String,
        candidates: Vec<String>,
    },

    #[error("{type_name}: await declaration `{decl}` has no matching start declaration for `{target}`")]
    OrphanedEnd {
        type_name: String,
        decl: DeclId,
        target: String,
    },

    #[error("{type_name}: `{decl}` takes {declared} but target `{target}` takes {actual}")]
    SignatureMismatch {
        type_name: String,
        decl: DeclId,
        target: String,
        declared: String,
        actual: String,
    },

    #[error("{type_name}: `{decl}` returns {declared} but target `{target}` returns {actual}")]
    ResultMismatch {
        type_name: String,
        decl: DeclId,
        target: String,
        declared: String,
        actual: String,
    },

    #[error("{type_name}: method `{name}{signature}` is registered twice")]
    DuplicateMethod {
        type_name: String,
        name: String,
        signature: String,
    },

    #[error("{type_name}: declaration `{decl}` is declared twice")]
    DuplicateDeclaration { type_name: String, decl: DeclId },
}

/// A start/await call that does not fit the woven type. Always deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MisuseError {
    #[error("{type_name} has no declaration `{decl}`")]
    UnknownDeclaration { type_name: String, decl: DeclId },

    #[error("`{decl}` expects arguments {expected}, got {found}")]
    ArgumentMismatch {
        decl: DeclId,
        expected: String,
        found: String,
    },

    #[error("`{decl}` cannot await handle {operation}: it was started by `{origin}`")]
    ForeignHandle {
        decl: DeclId,
        operation: String,
        origin: String,
    },

    #[error("`{decl}` returns {expected}, requested {found}")]
    ResultTypeMismatch {
        decl: DeclId,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid dispatcher config: {0}")]
    InvalidConfig(String),

    #[error("failed to build dispatcher runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("invalid dispatcher config json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("dispatcher runtime has shut down")]
    ShutDown,
}

/// Error surface of `begin_*` / `end_*` calls on a woven instance.
///
/// Configuration problems never show up here: they are reported by
/// `Weaver::weave`, before a woven instance exists.
#[derive(Debug, Error)]
pub enum AspectError {
    #[error(transparent)]
    Misuse(#[from] MisuseError),

    #[error(transparent)]
    Execution(#[from] ExecutionFault),

    /// The start call could not hand its work to the dispatcher.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl AspectError {
    /// The captured failure, when the wrapped call itself failed.
    pub fn as_fault(&self) -> Option<&ExecutionFault> {
        match self {
            AspectError::Execution(fault) => Some(fault),
            _ => None,
        }
    }
}
