//! Failure occurrence record

use crate::state_machine::LifecycleState;
use chrono::{DateTime, Utc};
use rampart_core::{ContextId, ErrorSummary, FailureCategory, OccurrenceId};
use serde::{Deserialize, Serialize};

/// A single caught failure, tracked through its lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureOccurrence {
    /// Occurrence id
    pub id: OccurrenceId,
    /// When the boundary reported it
    pub created_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
    /// Assigned category
    pub category: FailureCategory,
    /// UI unit that raised it
    pub origin_component_id: String,
    /// Message and kind
    pub error: ErrorSummary,
    /// Current state
    pub state: LifecycleState,
    /// Recovery attempts made so far
    pub attempt_count: u32,
    /// Attempt budget of the running recovery
    pub max_attempts: Option<u32>,
    /// Key of the captured diagnostic context
    pub context_id: ContextId,
    /// When a terminal state was reached
    pub resolved_at: Option<DateTime<Utc>>,
    /// Why recovery failed, when it did
    pub failure_reason: Option<String>,
}

impl FailureOccurrence {
    /// Create occurrence in state `occurred`; the context is keyed by the id
    #[must_use]
    pub fn new(
        category: FailureCategory,
        origin_component_id: impl Into<String>,
        error: ErrorSummary,
    ) -> Self {
        let id = OccurrenceId::new();
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            category,
            origin_component_id: origin_component_id.into(),
            error,
            state: LifecycleState::Occurred,
            attempt_count: 0,
            max_attempts: None,
            context_id: ContextId::from(id),
            resolved_at: None,
            failure_reason: None,
        }
    }

    /// With explicit context key
    #[inline]
    #[must_use]
    pub fn with_context_id(mut self, context_id: ContextId) -> Self {
        self.context_id = context_id;
        self
    }

    /// Whether the occurrence reached a terminal state
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state.is_terminal()
    }
}
