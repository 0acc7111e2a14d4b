use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of dispatcher activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherCounts {
    pub submitted: u64,
    pub started: u64,
    pub completed: u64,
    pub faulted: u64,
    /// Jobs dropped unrun at shutdown (published as faulted).
    pub abandoned: u64,
    pub callbacks_delivered: u64,
    pub callback_panics: u64,
}

/// Live counters shared by the dispatcher and its jobs.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    faulted: AtomicU64,
    abandoned: AtomicU64,
    callbacks_delivered: AtomicU64,
    callback_panics: AtomicU64,
}

impl DispatcherStats {
    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_faulted(&self) {
        self.faulted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callback(&self, panicked: bool) {
        if panicked {
            self.callback_panics.fetch_add(1, Ordering::Relaxed);
        } else {
            self.callbacks_delivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> DispatcherCounts {
        DispatcherCounts {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            callbacks_delivered: self.callbacks_delivered.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
        }
    }
}
