//! Error types for the lifecycle store

use crate::state_machine::LifecycleState;
use rampart_core::OccurrenceId;

/// Lifecycle errors. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// No occurrence with this id (never recorded or already cleared)
    #[error("occurrence not found: {0}")]
    NotFound(OccurrenceId),

    /// Edge not in the transition table
    #[error("illegal lifecycle transition: {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: LifecycleState,
        /// Requested state
        to: LifecycleState,
    },

    /// An occurrence with this id already exists
    #[error("occurrence already recorded: {0}")]
    Duplicate(OccurrenceId),

    /// New occurrences must start in `occurred`
    #[error("occurrence {id} recorded in state {state}, expected occurred")]
    InvalidInitialState {
        /// Occurrence id
        id: OccurrenceId,
        /// State it carried
        state: LifecycleState,
    },

    /// Attempt recorded beyond the recovery's budget
    #[error("occurrence {id} exceeded its attempt budget of {max_attempts}")]
    AttemptBudgetExceeded {
        /// Occurrence id
        id: OccurrenceId,
        /// Budget set when recovery began
        max_attempts: u32,
    },

    /// Attempt recorded while not recovering
    #[error("occurrence {id} is {state}, attempts can only be recorded while recovering")]
    NotRecovering {
        /// Occurrence id
        id: OccurrenceId,
        /// Current state
        state: LifecycleState,
    },
}

impl LifecycleError {
    /// Whether the target occurrence no longer exists
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
