//! Error lifecycle store
//!
//! Owns the occurrence table and serializes every change through
//! [`reduce`]. Observers get two feeds:
//! - a `watch` channel holding the latest [`LifecycleSummary`]
//! - a `broadcast` channel of [`LifecycleEvent`]s, one per applied action

use crate::error::LifecycleError;
use crate::occurrence::FailureOccurrence;
use crate::reducer::{reduce, Applied, LifecycleAction, LifecycleSummary, LifecycleTable};
use crate::state_machine::LifecycleState;
use chrono::Utc;
use parking_lot::Mutex;
use rampart_core::telemetry::{events, noop};
use rampart_core::{LifecycleConfig, OccurrenceId, SharedTelemetry};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use tokio::sync::{broadcast, watch};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One applied action, with the occurrence as it looks afterwards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    /// What changed
    pub applied: Applied,
    /// Occurrence after the change; `None` once removed
    pub occurrence: Option<FailureOccurrence>,
}

/// Reducer-backed store of failure occurrences
pub struct ErrorLifecycleStore {
    table: Mutex<LifecycleTable>,
    summary_tx: watch::Sender<LifecycleSummary>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    telemetry: SharedTelemetry,
    config: LifecycleConfig,
}

impl ErrorLifecycleStore {
    /// Create empty store
    #[must_use]
    pub fn new(config: LifecycleConfig) -> Self {
        let (summary_tx, _) = watch::channel(LifecycleSummary::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            table: Mutex::new(LifecycleTable::new()),
            summary_tx,
            events_tx,
            telemetry: noop(),
            config,
        }
    }

    /// With telemetry sink
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Apply an action. Rejected actions leave the table untouched.
    pub fn dispatch(&self, action: LifecycleAction) -> Result<Applied, LifecycleError> {
        let target = action.target();
        let mut table = self.table.lock();

        let applied = match reduce(&mut table, action, Utc::now()) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::warn!(
                    occurrence_id = ?target.map(|id| id.to_string()),
                    error = %err,
                    "rejected lifecycle action"
                );
                return Err(err);
            }
        };

        let pruned = match self.config.max_retained_terminal {
            Some(keep) if matches!(applied, Applied::Transitioned { to, .. } if to.is_terminal()) => {
                table.prune_terminal(keep)
            }
            _ => Vec::new(),
        };
        let occurrence = target.and_then(|id| table.get(&id).cloned());

        // Published under the lock: summaries and events follow transition order.
        self.summary_tx.send_replace(table.summary());
        // No subscribers is fine.
        let _ = self.events_tx.send(LifecycleEvent {
            applied,
            occurrence: occurrence.clone(),
        });
        drop(table);

        for id in pruned {
            tracing::debug!(occurrence_id = %id, "pruned terminal occurrence past retention");
        }
        self.report(applied, occurrence.as_ref());
        Ok(applied)
    }

    fn report(&self, applied: Applied, occurrence: Option<&FailureOccurrence>) {
        match applied {
            Applied::Recorded { id } => {
                tracing::info!(occurrence_id = %id, "failure occurrence recorded");
                self.telemetry.record_event(
                    events::OCCURRENCE_RECORDED,
                    json!({
                        "occurrence_id": id.to_string(),
                        "category": occurrence.map(|o| o.category.as_str()),
                        "component_id": occurrence.map(|o| o.origin_component_id.clone()),
                    }),
                );
            }
            Applied::Transitioned { id, from, to } => {
                tracing::info!(occurrence_id = %id, %from, %to, "occurrence transitioned");
                self.telemetry.record_event(
                    events::OCCURRENCE_TRANSITION,
                    json!({ "occurrence_id": id.to_string(), "from": from, "to": to }),
                );
            }
            Applied::AttemptRecorded { id, attempt } => {
                tracing::debug!(occurrence_id = %id, attempt, "recovery attempt recorded");
            }
            Applied::Cleared { id, existed } => {
                if existed {
                    tracing::debug!(occurrence_id = %id, "occurrence cleared");
                    self.telemetry.record_event(
                        events::OCCURRENCE_CLEARED,
                        json!({ "occurrence_id": id.to_string() }),
                    );
                }
            }
            Applied::ClearedAll { removed } => {
                tracing::debug!(removed, "all occurrences cleared");
            }
        }
    }

    /// Record a new occurrence
    pub fn record(&self, occurrence: FailureOccurrence) -> Result<OccurrenceId, LifecycleError> {
        let id = occurrence.id;
        self.dispatch(LifecycleAction::Record(occurrence))?;
        Ok(id)
    }

    /// `occurred -> recovering` with the given attempt budget
    pub fn begin_recovery(&self, id: OccurrenceId, max_attempts: u32) -> Result<(), LifecycleError> {
        self.dispatch(LifecycleAction::BeginRecovery { id, max_attempts })
            .map(|_| ())
    }

    /// Count one attempt; returns the attempt number
    pub fn record_attempt(&self, id: OccurrenceId) -> Result<u32, LifecycleError> {
        match self.dispatch(LifecycleAction::RecordAttempt { id })? {
            Applied::AttemptRecorded { attempt, .. } => Ok(attempt),
            _ => Err(LifecycleError::NotFound(id)),
        }
    }

    /// `recovering -> recovered`
    pub fn resolve(&self, id: OccurrenceId) -> Result<(), LifecycleError> {
        self.dispatch(LifecycleAction::Resolve { id }).map(|_| ())
    }

    /// `recovering -> failed`
    pub fn fail(&self, id: OccurrenceId, reason: impl Into<String>) -> Result<(), LifecycleError> {
        self.dispatch(LifecycleAction::Fail {
            id,
            reason: reason.into(),
        })
        .map(|_| ())
    }

    /// Remove an occurrence from any state; returns whether it existed
    pub fn clear(&self, id: OccurrenceId) -> bool {
        matches!(
            self.dispatch(LifecycleAction::Clear { id }),
            Ok(Applied::Cleared { existed: true, .. })
        )
    }

    /// Remove everything; returns how many occurrences were dropped
    pub fn clear_all(&self) -> usize {
        match self.dispatch(LifecycleAction::ClearAll) {
            Ok(Applied::ClearedAll { removed }) => removed,
            _ => 0,
        }
    }

    /// Occurrence snapshot
    #[must_use]
    pub fn get(&self, id: &OccurrenceId) -> Option<FailureOccurrence> {
        self.table.lock().get(id).cloned()
    }

    /// Current state of an occurrence
    #[must_use]
    pub fn state(&self, id: &OccurrenceId) -> Option<LifecycleState> {
        self.table.lock().get(id).map(|o| o.state)
    }

    /// Whether the occurrence is still held
    #[must_use]
    pub fn contains(&self, id: &OccurrenceId) -> bool {
        self.table.lock().get(id).is_some()
    }

    /// All occurrences, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<FailureOccurrence> {
        self.table.lock().iter().cloned().collect()
    }

    /// Occurrences currently in `state`
    #[must_use]
    pub fn list_in(&self, state: LifecycleState) -> Vec<FailureOccurrence> {
        self.table
            .lock()
            .iter()
            .filter(|o| o.state == state)
            .cloned()
            .collect()
    }

    /// Current aggregate
    #[must_use]
    pub fn summary(&self) -> LifecycleSummary {
        self.summary_tx.borrow().clone()
    }

    /// Receiver that always holds the latest summary
    #[must_use]
    pub fn subscribe_summary(&self) -> watch::Receiver<LifecycleSummary> {
        self.summary_tx.subscribe()
    }

    /// Receiver of every applied action from now on
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }
}

impl fmt::Debug for ErrorLifecycleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorLifecycleStore")
            .field("occurrences", &self.table.lock().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ErrorLifecycleStore {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}
