//! Execution faults captured by dispatcher workers.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// How the wrapped call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    /// The target method returned `Err`.
    Error,

    /// The target method panicked.
    Panic,

    /// The dispatcher shut down before the job ran.
    Shutdown,
}

/// A failure raised by a wrapped call, captured on the worker thread.
///
/// The original error object is kept behind an `Arc` so every awaiter of the
/// same handle observes the identical failure, and so callers can recover it
/// with [`ExecutionFault::downcast_ref`].
#[derive(Clone)]
pub struct ExecutionFault {
    kind: FaultKind,
    type_name: &'static str,
    message: String,
    causes: Vec<String>,
    error: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl ExecutionFault {
    /// Capture an error returned by a target method.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let message = error.to_string();
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            kind: FaultKind::Error,
            type_name: std::any::type_name::<E>(),
            message,
            causes,
            error: Some(Arc::new(error)),
        }
    }

    /// Capture a panic payload from `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self {
            kind: FaultKind::Panic,
            type_name: "panic",
            message: panic_message(payload.as_ref()),
            causes: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn shutdown() -> Self {
        Self {
            kind: FaultKind::Shutdown,
            type_name: "shutdown",
            message: "dispatcher shut down before the operation ran".to_string(),
            causes: Vec::new(),
            error: None,
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Type name of the original error (`"panic"` / `"shutdown"` otherwise).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Rendered `source()` chain of the original error, outermost first.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Recover the original error by type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.error.as_deref()?.downcast_ref::<E>()
    }

    /// Whether two faults hold the very same captured error object.
    pub fn same_error(&self, other: &ExecutionFault) -> bool {
        match (&self.error, &other.error) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionFault")
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .field("message", &self.message)
            .field("causes", &self.causes)
            .finish()
    }
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for ExecutionFault {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.error
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}
