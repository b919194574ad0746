//! Pure reducer over the occurrence table
//!
//! `reduce` either applies an action completely or returns an error and leaves
//! the table untouched. Summaries are derived, never stored.

use crate::error::LifecycleError;
use crate::occurrence::FailureOccurrence;
use crate::state_machine::{validate_transition, LifecycleState};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rampart_core::{FailureCategory, OccurrenceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Actions accepted by the reducer
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleAction {
    /// Insert a new occurrence (must be in `occurred`)
    Record(FailureOccurrence),
    /// `occurred -> recovering`, fixing the attempt budget
    BeginRecovery {
        /// Target occurrence
        id: OccurrenceId,
        /// Attempt budget of the policy driving recovery
        max_attempts: u32,
    },
    /// Count one recovery attempt
    RecordAttempt {
        /// Target occurrence
        id: OccurrenceId,
    },
    /// `recovering -> recovered`
    Resolve {
        /// Target occurrence
        id: OccurrenceId,
    },
    /// `recovering -> failed`
    Fail {
        /// Target occurrence
        id: OccurrenceId,
        /// Terminal reason
        reason: String,
    },
    /// Remove one occurrence from any state
    Clear {
        /// Target occurrence
        id: OccurrenceId,
    },
    /// Remove every occurrence
    ClearAll,
}

impl LifecycleAction {
    /// Occurrence targeted by the action, if any
    #[must_use]
    pub fn target(&self) -> Option<OccurrenceId> {
        match self {
            Self::Record(occ) => Some(occ.id),
            Self::BeginRecovery { id, .. }
            | Self::RecordAttempt { id }
            | Self::Resolve { id }
            | Self::Fail { id, .. }
            | Self::Clear { id } => Some(*id),
            Self::ClearAll => None,
        }
    }
}

/// What an action changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Applied {
    /// New occurrence inserted
    Recorded {
        /// Occurrence id
        id: OccurrenceId,
    },
    /// State changed along a legal edge
    Transitioned {
        /// Occurrence id
        id: OccurrenceId,
        /// Previous state
        from: LifecycleState,
        /// New state
        to: LifecycleState,
    },
    /// Attempt counter advanced
    AttemptRecorded {
        /// Occurrence id
        id: OccurrenceId,
        /// Attempt number now recorded
        attempt: u32,
    },
    /// Removal; `existed` is false for a repeated clear
    Cleared {
        /// Occurrence id
        id: OccurrenceId,
        /// Whether anything was removed
        existed: bool,
    },
    /// Table emptied
    ClearedAll {
        /// Number removed
        removed: usize,
    },
}

/// Occurrence table in insertion order
#[derive(Debug, Clone, Default)]
pub struct LifecycleTable {
    occurrences: IndexMap<OccurrenceId, FailureOccurrence>,
}

impl LifecycleTable {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup
    #[inline]
    #[must_use]
    pub fn get(&self, id: &OccurrenceId) -> Option<&FailureOccurrence> {
        self.occurrences.get(id)
    }

    /// Occurrences, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &FailureOccurrence> {
        self.occurrences.values()
    }

    /// Number of occurrences
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    /// Whether empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }

    /// Drop the oldest terminal occurrences beyond `keep`; returns removed ids
    pub fn prune_terminal(&mut self, keep: usize) -> Vec<OccurrenceId> {
        let terminal: Vec<OccurrenceId> = self
            .occurrences
            .values()
            .filter(|o| o.is_resolved())
            .map(|o| o.id)
            .collect();
        let excess = terminal.len().saturating_sub(keep);
        let pruned: Vec<OccurrenceId> = terminal.into_iter().take(excess).collect();
        for id in &pruned {
            self.occurrences.shift_remove(id);
        }
        pruned
    }

    /// Aggregate view
    #[must_use]
    pub fn summary(&self) -> LifecycleSummary {
        let mut summary = LifecycleSummary::default();
        for occ in self.occurrences.values() {
            summary.total += 1;
            match occ.state {
                LifecycleState::Occurred => summary.occurred += 1,
                LifecycleState::Recovering => summary.recovering += 1,
                LifecycleState::Recovered => summary.recovered += 1,
                LifecycleState::Failed => summary.failed += 1,
            }
            *summary.by_category.entry(occ.category).or_default() += 1;
        }
        summary.success_rate = summary.compute_success_rate();
        summary
    }

    fn get_mut(&mut self, id: &OccurrenceId) -> Result<&mut FailureOccurrence, LifecycleError> {
        self.occurrences
            .get_mut(id)
            .ok_or(LifecycleError::NotFound(*id))
    }
}

/// Counts by state and overall success rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSummary {
    /// Occurrences held
    pub total: usize,
    /// In `occurred`
    pub occurred: usize,
    /// In `recovering`
    pub recovering: usize,
    /// In `recovered`
    pub recovered: usize,
    /// In `failed`
    pub failed: usize,
    /// recovered / (recovered + failed); 1.0 with no terminal outcomes
    pub success_rate: f64,
    /// Occurrences per category
    pub by_category: BTreeMap<FailureCategory, usize>,
}

impl LifecycleSummary {
    fn compute_success_rate(&self) -> f64 {
        let terminal = self.recovered + self.failed;
        if terminal == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.recovered as f64 / terminal as f64;
            rate
        }
    }

    /// Occurrences not yet terminal
    #[inline]
    #[must_use]
    pub fn active(&self) -> usize {
        self.occurred + self.recovering
    }
}

impl Default for LifecycleSummary {
    fn default() -> Self {
        Self {
            total: 0,
            occurred: 0,
            recovering: 0,
            recovered: 0,
            failed: 0,
            success_rate: 1.0,
            by_category: BTreeMap::new(),
        }
    }
}

/// Apply one action at time `now`
pub fn reduce(
    table: &mut LifecycleTable,
    action: LifecycleAction,
    now: DateTime<Utc>,
) -> Result<Applied, LifecycleError> {
    match action {
        LifecycleAction::Record(occ) => {
            if table.occurrences.contains_key(&occ.id) {
                return Err(LifecycleError::Duplicate(occ.id));
            }
            if occ.state != LifecycleState::Occurred {
                return Err(LifecycleError::InvalidInitialState {
                    id: occ.id,
                    state: occ.state,
                });
            }
            let id = occ.id;
            table.occurrences.insert(id, occ);
            Ok(Applied::Recorded { id })
        }
        LifecycleAction::BeginRecovery { id, max_attempts } => {
            let occ = table.get_mut(&id)?;
            let from = occ.state;
            validate_transition(from, LifecycleState::Recovering)?;
            occ.state = LifecycleState::Recovering;
            occ.max_attempts = Some(max_attempts);
            occ.updated_at = now;
            Ok(Applied::Transitioned {
                id,
                from,
                to: LifecycleState::Recovering,
            })
        }
        LifecycleAction::RecordAttempt { id } => {
            let occ = table.get_mut(&id)?;
            if occ.state != LifecycleState::Recovering {
                return Err(LifecycleError::NotRecovering {
                    id,
                    state: occ.state,
                });
            }
            if let Some(max_attempts) = occ.max_attempts {
                if occ.attempt_count >= max_attempts {
                    return Err(LifecycleError::AttemptBudgetExceeded { id, max_attempts });
                }
            }
            occ.attempt_count += 1;
            occ.updated_at = now;
            Ok(Applied::AttemptRecorded {
                id,
                attempt: occ.attempt_count,
            })
        }
        LifecycleAction::Resolve { id } => {
            let occ = table.get_mut(&id)?;
            let from = occ.state;
            validate_transition(from, LifecycleState::Recovered)?;
            occ.state = LifecycleState::Recovered;
            occ.updated_at = now;
            occ.resolved_at = Some(now);
            Ok(Applied::Transitioned {
                id,
                from,
                to: LifecycleState::Recovered,
            })
        }
        LifecycleAction::Fail { id, reason } => {
            let occ = table.get_mut(&id)?;
            let from = occ.state;
            validate_transition(from, LifecycleState::Failed)?;
            occ.state = LifecycleState::Failed;
            occ.updated_at = now;
            occ.resolved_at = Some(now);
            occ.failure_reason = Some(reason);
            Ok(Applied::Transitioned {
                id,
                from,
                to: LifecycleState::Failed,
            })
        }
        LifecycleAction::Clear { id } => {
            let existed = table.occurrences.shift_remove(&id).is_some();
            Ok(Applied::Cleared { id, existed })
        }
        LifecycleAction::ClearAll => {
            let removed = table.occurrences.len();
            table.occurrences.clear();
            Ok(Applied::ClearedAll { removed })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rampart_core::ErrorSummary;

    fn occurrence() -> FailureOccurrence {
        FailureOccurrence::new(
            FailureCategory::Network,
            "poll-chart",
            ErrorSummary::new("Failed to fetch", "TypeError"),
        )
    }

    fn apply(table: &mut LifecycleTable, action: LifecycleAction) -> Result<Applied, LifecycleError> {
        reduce(table, action, Utc::now())
    }

    #[test]
    fn happy_path_to_recovered() {
        let mut table = LifecycleTable::new();
        let occ = occurrence();
        let id = occ.id;

        apply(&mut table, LifecycleAction::Record(occ)).unwrap();
        apply(&mut table, LifecycleAction::BeginRecovery { id, max_attempts: 3 }).unwrap();
        apply(&mut table, LifecycleAction::RecordAttempt { id }).unwrap();
        apply(&mut table, LifecycleAction::RecordAttempt { id }).unwrap();
        let applied = apply(&mut table, LifecycleAction::Resolve { id }).unwrap();

        assert_eq!(
            applied,
            Applied::Transitioned {
                id,
                from: LifecycleState::Recovering,
                to: LifecycleState::Recovered
            }
        );
        let stored = table.get(&id).unwrap();
        assert_eq!(stored.attempt_count, 2);
        assert!(stored.resolved_at.is_some());
    }

    #[test]
    fn illegal_transition_leaves_state_untouched() {
        let mut table = LifecycleTable::new();
        let occ = occurrence();
        let id = occ.id;
        apply(&mut table, LifecycleAction::Record(occ)).unwrap();
        apply(&mut table, LifecycleAction::BeginRecovery { id, max_attempts: 1 }).unwrap();
        apply(&mut table, LifecycleAction::Resolve { id }).unwrap();

        let before = table.get(&id).cloned();
        let err = apply(&mut table, LifecycleAction::BeginRecovery { id, max_attempts: 1 })
            .unwrap_err();

        assert_eq!(
            err,
            LifecycleError::IllegalTransition {
                from: LifecycleState::Recovered,
                to: LifecycleState::Recovering
            }
        );
        assert_eq!(table.get(&id).cloned(), before);
    }

    #[test]
    fn attempts_cannot_exceed_budget() {
        let mut table = LifecycleTable::new();
        let occ = occurrence();
        let id = occ.id;
        apply(&mut table, LifecycleAction::Record(occ)).unwrap();
        apply(&mut table, LifecycleAction::BeginRecovery { id, max_attempts: 1 }).unwrap();
        apply(&mut table, LifecycleAction::RecordAttempt { id }).unwrap();

        let err = apply(&mut table, LifecycleAction::RecordAttempt { id }).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::AttemptBudgetExceeded {
                id,
                max_attempts: 1
            }
        );
        assert_eq!(table.get(&id).unwrap().attempt_count, 1);
    }

    #[test]
    fn attempts_require_recovering() {
        let mut table = LifecycleTable::new();
        let occ = occurrence();
        let id = occ.id;
        apply(&mut table, LifecycleAction::Record(occ)).unwrap();
        assert!(matches!(
            apply(&mut table, LifecycleAction::RecordAttempt { id }),
            Err(LifecycleError::NotRecovering { .. })
        ));
    }

    #[test]
    fn clear_is_idempotent() {
        let mut table = LifecycleTable::new();
        let occ = occurrence();
        let id = occ.id;
        apply(&mut table, LifecycleAction::Record(occ)).unwrap();

        assert_eq!(
            apply(&mut table, LifecycleAction::Clear { id }).unwrap(),
            Applied::Cleared { id, existed: true }
        );
        assert_eq!(
            apply(&mut table, LifecycleAction::Clear { id }).unwrap(),
            Applied::Cleared { id, existed: false }
        );
    }

    #[test]
    fn duplicate_record_is_rejected() {
        let mut table = LifecycleTable::new();
        let occ = occurrence();
        apply(&mut table, LifecycleAction::Record(occ.clone())).unwrap();
        assert_eq!(
            apply(&mut table, LifecycleAction::Record(occ.clone())),
            Err(LifecycleError::Duplicate(occ.id))
        );
    }

    #[test]
    fn summary_counts_and_rate() {
        let mut table = LifecycleTable::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            let occ = occurrence();
            ids.push(occ.id);
            apply(&mut table, LifecycleAction::Record(occ)).unwrap();
        }
        for id in &ids[..3] {
            apply(&mut table, LifecycleAction::BeginRecovery { id: *id, max_attempts: 3 }).unwrap();
        }
        apply(&mut table, LifecycleAction::Resolve { id: ids[0] }).unwrap();
        apply(
            &mut table,
            LifecycleAction::Fail {
                id: ids[1],
                reason: "exhausted".into(),
            },
        )
        .unwrap();

        let summary = table.summary();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.occurred, 1);
        assert_eq!(summary.recovering, 1);
        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.active(), 2);
        assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.by_category[&FailureCategory::Network], 4);
    }

    #[test]
    fn empty_summary_reports_full_success() {
        assert!((LifecycleTable::new().summary().success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prune_drops_oldest_terminal_only() {
        let mut table = LifecycleTable::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let occ = occurrence();
            let id = occ.id;
            ids.push(id);
            apply(&mut table, LifecycleAction::Record(occ)).unwrap();
            apply(&mut table, LifecycleAction::BeginRecovery { id, max_attempts: 1 }).unwrap();
            apply(&mut table, LifecycleAction::Resolve { id }).unwrap();
        }
        let live = occurrence();
        let live_id = live.id;
        apply(&mut table, LifecycleAction::Record(live)).unwrap();

        assert_eq!(table.prune_terminal(1), vec![ids[0], ids[1]]);
        assert!(table.get(&live_id).is_some());
        assert!(table.get(&ids[2]).is_some());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Begin,
        Attempt,
        Resolve,
        Fail,
    }

    proptest! {
        #[test]
        fn arbitrary_action_sequences_follow_legal_edges(
            ops in proptest::collection::vec(
                prop_oneof![Just(Op::Begin), Just(Op::Attempt), Just(Op::Resolve), Just(Op::Fail)],
                0..24,
            ),
            budget in 1u32..5,
        ) {
            let mut table = LifecycleTable::new();
            let occ = occurrence();
            let id = occ.id;
            apply(&mut table, LifecycleAction::Record(occ)).unwrap();

            for op in ops {
                let before = table.get(&id).unwrap().clone();
                let action = match op {
                    Op::Begin => LifecycleAction::BeginRecovery { id, max_attempts: budget },
                    Op::Attempt => LifecycleAction::RecordAttempt { id },
                    Op::Resolve => LifecycleAction::Resolve { id },
                    Op::Fail => LifecycleAction::Fail { id, reason: "x".into() },
                };
                let result = apply(&mut table, action);
                let after = table.get(&id).unwrap();

                if before.state != after.state {
                    prop_assert!(result.is_ok());
                    prop_assert!(validate_transition(before.state, after.state).is_ok());
                }
                if result.is_err() {
                    prop_assert_eq!(&before, after);
                }
                prop_assert!(after.attempt_count <= after.max_attempts.unwrap_or(0));
            }
        }
    }
}
