//! Occurrence states and the transitions allowed between them
//!
//! `occurred -> recovering -> {recovered | failed}`; both outcomes are terminal.

use crate::error::LifecycleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a failure occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Reported by a boundary, no recovery started
    Occurred,
    /// A recovery execution is in progress
    Recovering,
    /// Terminal success
    Recovered,
    /// Terminal failure
    Failed,
}

impl LifecycleState {
    /// Every state
    pub const ALL: [LifecycleState; 4] = [
        LifecycleState::Occurred,
        LifecycleState::Recovering,
        LifecycleState::Recovered,
        LifecycleState::Failed,
    ];

    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Recovered | LifecycleState::Failed)
    }

    /// Stable name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Occurred => "occurred",
            LifecycleState::Recovering => "recovering",
            LifecycleState::Recovered => "recovered",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates a state transition.
///
/// Removal (`clear`) is not a transition and is allowed from any state; it is
/// handled by the reducer directly.
pub fn validate_transition(from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleError> {
    if allowed(from, to) {
        Ok(())
    } else {
        Err(LifecycleError::IllegalTransition { from, to })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: LifecycleState) -> Vec<LifecycleState> {
    use LifecycleState::*;
    match from {
        Occurred => vec![Recovering],
        Recovering => vec![Recovered, Failed],
        Recovered | Failed => vec![],
    }
}

fn allowed(from: LifecycleState, to: LifecycleState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
