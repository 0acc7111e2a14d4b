//! Operation handle state machine.

use serde::{Deserialize, Serialize};

/// State of one operation handle.
///
/// State transitions:
/// - Pending -> Running -> Completed
/// - Pending -> Running -> Faulted
/// - Pending -> Faulted (only when the dispatcher drops the job without running it)
///
/// Transitions never go backward; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandleState {
    /// Created by a start call, not yet picked up by a worker.
    Pending,

    /// A worker has begun the target call.
    Running,

    /// The target call returned a value.
    Completed,

    /// The target call raised a failure.
    Faulted,
}

impl HandleState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, HandleState::Completed | HandleState::Faulted)
    }

    /// Whether moving from `self` to `next` respects the monotonic order.
    pub fn can_transition_to(self, next: HandleState) -> bool {
        match (self, next) {
            (HandleState::Pending, HandleState::Running) => true,
            (HandleState::Pending, HandleState::Faulted) => true,
            (HandleState::Running, HandleState::Completed) => true,
            (HandleState::Running, HandleState::Faulted) => true,
            _ => false,
        }
    }
}
