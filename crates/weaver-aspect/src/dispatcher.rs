//! Dispatcher - 同期メソッド呼び出しを worker で実行し、結果を publish する
//!
//! # フロー
//! 1. start 呼び出しが `submit()` で Job を積む（呼び出し元はすぐ戻る）
//! 2. blocking pool の worker が Job を拾う（Pending -> Running）
//! 3. target を実行し、戻り値 / Err / panic を Outcome にして publish
//! 4. callback があれば publish の後に 1 回だけ呼ぶ
//!
//! tokio の blocking pool (`spawn_blocking`) を worker pool として使います。

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, info, warn};

use crate::binding::descriptor::ErasedValue;
use crate::config::DispatcherConfig;
use crate::domain::ExecutionFault;
use crate::domain::fault::panic_message;
use crate::error::DispatchError;
use crate::handle::{OperationHandle, Outcome};
use crate::observability::{DispatcherCounts, DispatcherStats};

/// Completion callback; invoked once per handle, on a worker thread.
pub type Callback = Box<dyn FnOnce(OperationHandle) + Send + 'static>;

/// The bound call with its arguments already captured.
pub(crate) type Work = Box<dyn FnOnce() -> Result<ErasedValue, ExecutionFault> + Send + 'static>;

thread_local! {
    // Some(_) while this thread is inside `submit`; Some(true) once the job was dropped there.
    static SUBMITTING: Cell<Option<bool>> = const { Cell::new(None) };
}

/// One submitted call.
///
/// If the job is dropped without running (the runtime shut down first), its
/// handle is still published, as a `Shutdown` fault, so no awaiter hangs.
/// A job the runtime rejects inside `submit` gets no callback; `submit`
/// reports the rejection instead.
struct Job {
    handle: OperationHandle,
    work: Option<Work>,
    callback: Option<Callback>,
    stats: Arc<DispatcherStats>,
}

impl Job {
    fn run(mut self) {
        let Some(work) = self.work.take() else {
            return;
        };
        if !self.handle.mark_running() {
            return;
        }
        self.stats.record_started();

        let outcome = match catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Outcome::Completed(value),
            Ok(Err(fault)) => Outcome::Faulted(fault),
            Err(payload) => Outcome::Faulted(ExecutionFault::from_panic(payload)),
        };

        match &outcome {
            Outcome::Completed(_) => self.stats.record_completed(),
            Outcome::Faulted(fault) => {
                debug!(
                    operation = %self.handle.id(),
                    target = %self.handle.origin().target,
                    kind = ?fault.kind(),
                    error_type = fault.type_name(),
                    message = fault.message(),
                    "wrapped call faulted"
                );
                self.stats.record_faulted();
            }
        }

        self.handle.publish(outcome);
        self.deliver_callback();
    }

    fn deliver_callback(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let handle = self.handle.clone();
        let operation = handle.id();
        let result = catch_unwind(AssertUnwindSafe(move || callback(handle)));
        if let Err(payload) = &result {
            warn!(
                operation = %operation,
                message = %panic_message(payload.as_ref()),
                "completion callback panicked"
            );
        }
        self.stats.record_callback(result.is_err());
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.work.take().is_none() {
            return;
        }
        let published = self.handle.publish(Outcome::Faulted(ExecutionFault::shutdown()));
        if SUBMITTING.get().is_some() {
            SUBMITTING.set(Some(true));
            return;
        }
        if published {
            warn!(operation = %self.handle.id(), "job dropped before it ran");
            self.stats.record_abandoned();
            self.deliver_callback();
        }
    }
}

/// Worker pool executing bound synchronous calls off the caller's thread.
///
/// Either owns a tokio runtime built from a [`DispatcherConfig`], or borrows
/// an existing one through its [`Handle`].
pub struct Dispatcher {
    handle: Handle,
    runtime: Option<Runtime>,
    stats: Arc<DispatcherStats>,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Result<Self, DispatchError> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_name(config.thread_name.clone())
            .thread_keep_alive(Duration::from_millis(config.keep_alive_ms))
            .build()?;
        info!(
            max_blocking_threads = config.max_blocking_threads,
            thread_name = %config.thread_name,
            "dispatcher started"
        );
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            stats: Arc::new(DispatcherStats::default()),
        })
    }

    /// Run wrapped calls on an existing runtime's blocking pool.
    ///
    /// Once that runtime shuts down, `submit` fails with
    /// [`DispatchError::ShutDown`] and never invokes the callback.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            runtime: None,
            stats: Arc::new(DispatcherStats::default()),
        }
    }

    /// Queue `work` and return at once; the outcome lands in `handle`.
    ///
    /// If the runtime has already shut down, `handle` is published as a
    /// `Shutdown` fault, the callback is dropped uncalled and
    /// [`DispatchError::ShutDown`] is returned.
    pub(crate) fn submit(
        &self,
        handle: OperationHandle,
        work: Work,
        callback: Option<Callback>,
    ) -> Result<(), DispatchError> {
        let operation = handle.id();
        self.stats.record_submitted();
        debug!(
            operation = %operation,
            target = %handle.origin().target,
            callback = callback.is_some(),
            "operation submitted"
        );
        let job = Job {
            handle,
            work: Some(work),
            callback,
            stats: Arc::clone(&self.stats),
        };

        // shut down runtime は task をこのスレッド上で即 drop する
        SUBMITTING.set(Some(false));
        // JoinHandle は使わない: 結果は OperationHandle 経由で届く
        let _ = self.handle.spawn_blocking(move || job.run());
        if SUBMITTING.replace(None) == Some(true) {
            warn!(operation = %operation, "runtime shut down; operation rejected");
            self.stats.record_abandoned();
            return Err(DispatchError::ShutDown);
        }
        Ok(())
    }

    pub fn stats(&self) -> DispatcherCounts {
        self.stats.snapshot()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // shutdown_background never blocks, so this is safe on a pool thread too
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
