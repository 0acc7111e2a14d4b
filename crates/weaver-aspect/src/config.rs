//! Dispatcher configuration.
//!
//! Pool sizing is the only knob; the dispatch contract itself (eventual
//! execution, single delivery) does not depend on it.

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Async worker threads of the owned runtime. Wrapped calls do not run here.
    pub worker_threads: usize,

    /// Upper bound of threads running wrapped synchronous calls.
    pub max_blocking_threads: usize,

    /// Name given to every pool thread.
    pub thread_name: String,

    /// How long an idle pool thread is kept before it exits.
    pub keep_alive_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            max_blocking_threads: 64,
            thread_name: "weaver-aspect".to_string(),
            keep_alive_ms: 10_000,
        }
    }
}

impl DispatcherConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DispatchError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.worker_threads == 0 {
            return Err(DispatchError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.max_blocking_threads == 0 {
            return Err(DispatchError::InvalidConfig(
                "max_blocking_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
