//! Service error types

use rampart_core::{ConfigError, OccurrenceId};
use rampart_lifecycle::{LifecycleError, LifecycleState};
use rampart_recovery::RecoveryError;
use rampart_stream::GuardianError;
use thiserror::Error;

/// Errors surfaced by [`crate::ResilienceService`]
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration rejected at build time
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lifecycle store rejected an action
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Recovery ended without success
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Stream guardian is gone
    #[error(transparent)]
    Guardian(#[from] GuardianError),

    /// Manual retry is only offered for failed occurrences
    #[error("occurrence {id} is {state}, only failed occurrences can be retried")]
    NotRetryable {
        /// Occurrence id
        id: OccurrenceId,
        /// Its current state
        state: LifecycleState,
    },
}

impl ServiceError {
    /// Whether the occurrence is unknown (never recorded or already cleared)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Lifecycle(e) => e.is_not_found(),
            Self::Recovery(RecoveryError::Lifecycle(e)) => e.is_not_found(),
            Self::Recovery(RecoveryError::Cleared { .. }) => true,
            _ => false,
        }
    }

    /// Whether the failure is final for this occurrence
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Recovery(e) => e.is_terminal(),
            Self::NotRetryable { .. } => true,
            _ => false,
        }
    }
}
