//! Failure boundary contract
//!
//! A boundary wraps one UI unit. When the unit faults, the boundary hands the
//! error and a snapshot of what the user was looking at to
//! [`FailureBoundary::on_failure_caught`] and renders whatever
//! [`FailureBoundary::view`] reports for the returned occurrence.

use crate::error::ServiceError;
use rampart_context::CapturedState;
use rampart_core::{FailureCategory, FaultError, OccurrenceId};
use rampart_lifecycle::{FailureOccurrence, LifecycleState};
use serde::Serialize;

/// What a boundary should render for an occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum BoundaryView {
    /// Nothing outstanding: render the wrapped unit normally
    Healthy,
    /// Recovery pending or running: show the recovering indicator
    Recovering {
        /// Occurrence id
        occurrence_id: OccurrenceId,
        /// Attempts made so far
        attempt: u32,
        /// Attempt budget, once recovery started
        max_attempts: Option<u32>,
    },
    /// Recovery gave up: show the failure with a manual retry affordance
    Failed {
        /// Occurrence id
        occurrence_id: OccurrenceId,
        /// Failure category
        category: FailureCategory,
        /// Original error message
        message: String,
        /// Why recovery stopped
        reason: Option<String>,
    },
}

impl BoundaryView {
    /// View for an occurrence snapshot; unknown and recovered occurrences render healthy
    #[must_use]
    pub fn from_occurrence(occurrence: Option<&FailureOccurrence>) -> Self {
        let Some(o) = occurrence else {
            return Self::Healthy;
        };
        match o.state {
            LifecycleState::Recovered => Self::Healthy,
            LifecycleState::Occurred | LifecycleState::Recovering => Self::Recovering {
                occurrence_id: o.id,
                attempt: o.attempt_count,
                max_attempts: o.max_attempts,
            },
            LifecycleState::Failed => Self::Failed {
                occurrence_id: o.id,
                category: o.category,
                message: o.error.message.clone(),
                reason: o.failure_reason.clone(),
            },
        }
    }

    /// Whether the manual retry affordance applies
    #[inline]
    #[must_use]
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Contract between a UI boundary and the resilience layer
pub trait FailureBoundary: Send + Sync {
    /// Report a caught fault; returns the id of the new occurrence
    fn on_failure_caught(
        &self,
        error: &FaultError,
        component_id: &str,
        captured: CapturedState,
    ) -> Result<OccurrenceId, ServiceError>;

    /// Current rendering for an occurrence
    fn view(&self, occurrence_id: &OccurrenceId) -> BoundaryView;
}
