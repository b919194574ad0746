//! Recovery error types

use rampart_core::{FailureCategory, OccurrenceId, RecoveryId};
use rampart_lifecycle::LifecycleError;
use std::fmt;

/// Failure of a single recovery attempt.
///
/// Folded into "this attempt failed" by the orchestrator; never surfaced to the
/// caller until the attempt budget is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// What went wrong
    pub message: String,
}

impl AttemptFailure {
    /// Create from a message
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for AttemptFailure {}

impl From<String> for AttemptFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for AttemptFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Terminal outcome of a recovery execution that did not succeed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecoveryError {
    /// The policy's predicate declined the attempt
    #[error("recovery {recovery_id} for {category} aborted at attempt {attempt}: policy declined retry")]
    Aborted {
        /// Recovery id
        recovery_id: RecoveryId,
        /// Failure category
        category: FailureCategory,
        /// Attempt that was declined
        attempt: u32,
    },

    /// Every attempt in the budget failed
    #[error("recovery {recovery_id} exhausted {attempts} attempt(s): {last_error}")]
    Exhausted {
        /// Recovery id
        recovery_id: RecoveryId,
        /// Attempts made
        attempts: u32,
        /// Failure of the final attempt
        last_error: AttemptFailure,
    },

    /// Cancelled by the caller or by teardown
    #[error("recovery {0} cancelled")]
    Cancelled(RecoveryId),

    /// The occurrence was cleared while recovery was pending
    #[error("occurrence {occurrence_id} was cleared during recovery {recovery_id}")]
    Cleared {
        /// Recovery id
        recovery_id: RecoveryId,
        /// Cleared occurrence
        occurrence_id: OccurrenceId,
    },

    /// The lifecycle store rejected starting recovery
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl RecoveryError {
    /// Whether the failure should be shown as terminal with a manual-retry affordance
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Aborted { .. } | Self::Exhausted { .. })
    }

    /// Whether a manual retry could plausibly succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exhausted { .. } | Self::Cancelled(_) => true,
            Self::Aborted { category, .. } => category.is_retryable(),
            Self::Cleared { .. } | Self::Lifecycle(_) => false,
        }
    }

    /// Recovery id, when one was assigned
    #[must_use]
    pub fn recovery_id(&self) -> Option<RecoveryId> {
        match self {
            Self::Aborted { recovery_id, .. }
            | Self::Exhausted { recovery_id, .. }
            | Self::Cleared { recovery_id, .. } => Some(*recovery_id),
            Self::Cancelled(id) => Some(*id),
            Self::Lifecycle(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_retryable_classification() {
        let id = RecoveryId::new();
        let exhausted = RecoveryError::Exhausted {
            recovery_id: id,
            attempts: 3,
            last_error: AttemptFailure::new("still down"),
        };
        assert!(exhausted.is_terminal());
        assert!(exhausted.is_retryable());

        let security = RecoveryError::Aborted {
            recovery_id: id,
            category: FailureCategory::Security,
            attempt: 1,
        };
        assert!(security.is_terminal());
        assert!(!security.is_retryable());

        assert!(!RecoveryError::Cancelled(id).is_terminal());
        assert_eq!(RecoveryError::Cancelled(id).recovery_id(), Some(id));
    }
}
