//! OperationHandle - 1 回の start 呼び出しに対応するハンドル
//!
//! # 学習ポイント
//! - Mutex + Condvar による blocking wait
//! - single-writer (worker) / multi-reader (await, callback) の publish
//! - Arc による共有所有権（最後の observer が drop した時点で解放）

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::binding::{BindingId, DeclId};
use crate::binding::descriptor::ErasedValue;
use crate::domain::{ExecutionFault, HandleState, OperationId, WovenTypeId};

/// User-supplied value passed to the `callback + state` start overload.
pub type AsyncState = Arc<dyn Any + Send + Sync>;

/// Terminal outcome of an operation.
#[derive(Clone)]
pub enum Outcome {
    Completed(ErasedValue),
    Faulted(ExecutionFault),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    /// The returned value, if the call completed and returned an `R`.
    pub fn value<R: 'static>(&self) -> Option<&R> {
        match self {
            Outcome::Completed(value) => value.downcast_ref::<R>(),
            Outcome::Faulted(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&ExecutionFault> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Faulted(fault) => Some(fault),
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed(_) => f.write_str("Completed(..)"),
            Outcome::Faulted(fault) => f.debug_tuple("Faulted").field(fault).finish(),
        }
    }
}

/// Which woven type and binding produced a handle. Await calls check it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleOrigin {
    pub woven: WovenTypeId,
    pub binding: BindingId,
    pub target: String,
    pub started_by: DeclId,
}

struct Slot {
    state: HandleState,
    outcome: Option<Outcome>,
}

struct Inner {
    id: OperationId,
    origin: HandleOrigin,
    async_state: Option<AsyncState>,
    slot: Mutex<Slot>,
    done: Condvar,
}

/// Opaque token for one in-flight invocation.
///
/// Cloning is cheap and every clone observes the same outcome. A handle holds
/// no reference to the instance it was started on.
#[derive(Clone)]
pub struct OperationHandle {
    inner: Arc<Inner>,
}

impl OperationHandle {
    pub(crate) fn new(origin: HandleOrigin, async_state: Option<AsyncState>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: OperationId::generate(),
                origin,
                async_state,
                slot: Mutex::new(Slot {
                    state: HandleState::Pending,
                    outcome: None,
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.inner.id
    }

    pub fn origin(&self) -> &HandleOrigin {
        &self.inner.origin
    }

    pub fn state(&self) -> HandleState {
        self.lock().state
    }

    /// `true` once the outcome is published.
    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn async_state(&self) -> Option<&AsyncState> {
        self.inner.async_state.as_ref()
    }

    /// The user state downcast to `S`.
    pub fn state_as<S: 'static>(&self) -> Option<&S> {
        self.inner.async_state.as_deref()?.downcast_ref::<S>()
    }

    /// Non-blocking peek at the outcome.
    pub fn outcome(&self) -> Option<Outcome> {
        self.lock().outcome.clone()
    }

    /// Block the calling thread until the outcome is published.
    ///
    /// Non-destructive: every call (on any clone) returns the same outcome.
    pub fn wait(&self) -> Outcome {
        let mut guard = self.lock();
        loop {
            if let Some(outcome) = &guard.outcome {
                return outcome.clone();
            }
            guard = self
                .inner
                .done
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Pending -> Running. Returns `false` if the handle already left Pending.
    pub(crate) fn mark_running(&self) -> bool {
        let mut slot = self.lock();
        if !slot.state.can_transition_to(HandleState::Running) {
            return false;
        }
        slot.state = HandleState::Running;
        trace!(operation = %self.inner.id, "operation running");
        true
    }

    /// The single publish of the terminal outcome. Later calls are ignored.
    pub(crate) fn publish(&self, outcome: Outcome) -> bool {
        let next = match outcome {
            Outcome::Completed(_) => HandleState::Completed,
            Outcome::Faulted(_) => HandleState::Faulted,
        };
        let mut slot = self.lock();
        if !slot.state.can_transition_to(next) {
            return false;
        }
        slot.state = next;
        slot.outcome = Some(outcome);
        drop(slot);
        self.inner.done.notify_all();
        trace!(operation = %self.inner.id, state = ?next, "operation published");
        true
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for OperationHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for OperationHandle {}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.inner.id)
            .field("target", &self.inner.origin.target)
            .field("state", &self.state())
            .field("has_async_state", &self.inner.async_state.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Completion;
    use std::thread;
    use std::time::{Duration, Instant};

    fn handle(state: Option<AsyncState>) -> OperationHandle {
        OperationHandle::new(
            HandleOrigin {
                woven: WovenTypeId::generate(),
                binding: BindingId(0),
                target: "test".to_string(),
                started_by: DeclId::begin("begin_test", Completion::None),
            },
            state,
        )
    }

    #[derive(Debug, thiserror::Error)]
    #[error("broken")]
    struct Broken;

    #[test]
    fn new_handle_is_pending_without_outcome() {
        let h = handle(None);
        assert_eq!(h.state(), HandleState::Pending);
        assert!(!h.is_completed());
        assert!(h.outcome().is_none());
    }

    #[test]
    fn publish_happens_exactly_once() {
        let h = handle(None);
        assert!(h.mark_running());
        assert!(!h.mark_running());
        assert!(h.publish(Outcome::Completed(Arc::new(7_i32))));
        assert!(!h.publish(Outcome::Faulted(ExecutionFault::from_error(Broken))));

        assert_eq!(h.state(), HandleState::Completed);
        assert_eq!(h.wait().value::<i32>(), Some(&7));
    }

    #[test]
    fn completed_outcome_requires_running_first() {
        let h = handle(None);
        assert!(!h.publish(Outcome::Completed(Arc::new(1_i32))));
        assert_eq!(h.state(), HandleState::Pending);
    }

    #[test]
    fn wait_blocks_until_publish_and_all_waiters_see_the_same_outcome() {
        let h = handle(None);
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let h = h.clone();
                thread::spawn(move || h.wait())
            })
            .collect();

        let start = Instant::now();
        thread::sleep(Duration::from_millis(50));
        h.mark_running();
        h.publish(Outcome::Faulted(ExecutionFault::from_error(Broken)));

        let first = h.wait();
        for waiter in waiters {
            let outcome = waiter.join().unwrap();
            assert!(outcome.fault().unwrap().same_error(first.fault().unwrap()));
        }
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(h.state(), HandleState::Faulted);
    }

    #[test]
    fn async_state_is_downcastable() {
        let h = handle(Some(Arc::new(String::from("ctx"))));
        assert_eq!(h.state_as::<String>().map(String::as_str), Some("ctx"));
        assert!(h.state_as::<i32>().is_none());
        assert!(handle(None).async_state().is_none());
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = handle(None);
        let b = handle(None);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a.id(), b.id());
    }
}
