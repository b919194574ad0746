//! Recovery orchestrator
//!
//! Drives one policy against one failure:
//!
//! ```text
//! resolve policy ─▶ occurred→recovering ─▶ save context
//!     │
//!     └─▶ for attempt in 1..=max_attempts
//!            should_retry? ── no ──▶ failed (aborted)
//!            recover(ctx)  ── ok ──▶ recovered
//!            last attempt? ── yes ─▶ failed (exhausted)
//!            sleep(backoff(attempt) ± jitter), cancellable
//! ```
//!
//! Intermediate failures only drive the next wait. Every lifecycle transition
//! first checks the occurrence still exists; a cleared occurrence turns the
//! pending completion into a no-op.

use crate::context::RecoveryRequest;
use crate::error::{AttemptFailure, RecoveryError};
use crate::metrics::RecoveryMetrics;
use crate::registry::PolicyRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rampart_context::DiagnosticContextStore;
use rampart_core::telemetry::{events, noop};
use rampart_core::{
    Backoff, ContextId, ErrorSummary, FailureCategory, OccurrenceId, RecoveryId, SharedTelemetry,
};
use rampart_lifecycle::{ErrorLifecycleStore, LifecycleError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Successful recovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    /// Recovery id
    pub recovery_id: RecoveryId,
    /// Occurrence recovered, if tracked
    pub occurrence_id: Option<OccurrenceId>,
    /// Failure category
    pub category: FailureCategory,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Wall time from start to success
    pub elapsed: Duration,
}

/// Snapshot of a running recovery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InFlightRecovery {
    /// Recovery id
    pub recovery_id: RecoveryId,
    /// Occurrence, if tracked
    pub occurrence_id: Option<OccurrenceId>,
    /// Failure category
    pub category: FailureCategory,
    /// Current attempt (0 before the first)
    pub attempt: u32,
    /// When the execution started
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

#[derive(Debug)]
struct InFlightEntry {
    info: InFlightRecovery,
    signal: Arc<CancelSignal>,
}

/// Removes the in-flight entry however the execution ends
struct InFlightGuard<'a> {
    orchestrator: &'a RecoveryOrchestrator,
    recovery_id: RecoveryId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.in_flight.remove(&self.recovery_id);
        self.orchestrator.metrics.lock().record_finished();
    }
}

#[derive(Debug, Clone, Copy)]
struct Run {
    recovery_id: RecoveryId,
    occurrence_id: Option<OccurrenceId>,
    category: FailureCategory,
    started: Instant,
}

/// Executes recovery policies with bounded retry and backoff
pub struct RecoveryOrchestrator {
    registry: Arc<PolicyRegistry>,
    contexts: Arc<DiagnosticContextStore>,
    lifecycle: Option<Arc<ErrorLifecycleStore>>,
    telemetry: SharedTelemetry,
    metrics: Mutex<RecoveryMetrics>,
    in_flight: DashMap<RecoveryId, InFlightEntry>,
    rng: Mutex<Option<StdRng>>,
}

impl fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("registry", &self.registry)
            .field("lifecycle", &self.lifecycle.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl RecoveryOrchestrator {
    /// Create orchestrator over a registry and a context store
    #[must_use]
    pub fn new(registry: Arc<PolicyRegistry>, contexts: Arc<DiagnosticContextStore>) -> Self {
        Self {
            registry,
            contexts,
            lifecycle: None,
            telemetry: noop(),
            metrics: Mutex::new(RecoveryMetrics::default()),
            in_flight: DashMap::new(),
            rng: Mutex::new(None),
        }
    }

    /// With lifecycle store receiving transitions for tracked occurrences
    #[inline]
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Arc<ErrorLifecycleStore>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// With telemetry sink
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Draw jitter from a seeded generator (reproducible runs)
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = Some(StdRng::seed_from_u64(seed));
        self
    }

    /// Policy registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Diagnostic context store
    #[inline]
    #[must_use]
    pub fn contexts(&self) -> &Arc<DiagnosticContextStore> {
        &self.contexts
    }

    /// Metrics snapshot
    #[must_use]
    pub fn metrics(&self) -> RecoveryMetrics {
        *self.metrics.lock()
    }

    /// Running recoveries
    #[must_use]
    pub fn in_flight(&self) -> Vec<InFlightRecovery> {
        let mut running: Vec<_> = self.in_flight.iter().map(|e| e.info.clone()).collect();
        running.sort_by_key(|r| r.recovery_id);
        running
    }

    /// Cancel a running recovery at its next wait point; returns whether it was running
    pub fn cancel(&self, recovery_id: RecoveryId) -> bool {
        match self.in_flight.get(&recovery_id) {
            Some(entry) => {
                entry.signal.cancel();
                tracing::info!(%recovery_id, "recovery cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every running recovery; returns how many were signalled
    pub fn teardown(&self) -> usize {
        let mut cancelled = 0;
        for entry in &self.in_flight {
            entry.signal.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::info!(cancelled, "recoveries cancelled on teardown");
        }
        cancelled
    }

    /// Recover a recorded occurrence using its category and error
    pub async fn recover_occurrence(
        &self,
        occurrence_id: OccurrenceId,
        request: RecoveryRequest,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        let occurrence = self
            .lifecycle
            .as_ref()
            .and_then(|l| l.get(&occurrence_id))
            .ok_or(LifecycleError::NotFound(occurrence_id))?;
        self.execute_recovery(
            occurrence.category,
            &occurrence.error,
            request.for_occurrence(occurrence_id),
        )
        .await
    }

    /// Run the category's policy against `error`
    pub async fn execute_recovery(
        &self,
        category: FailureCategory,
        error: &ErrorSummary,
        request: RecoveryRequest,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        let policy = self.registry.get(category);
        let recovery_id = RecoveryId::new();
        let occurrence_id = request.occurrence_id;

        if let (Some(id), Some(lifecycle)) = (occurrence_id, &self.lifecycle) {
            match lifecycle.begin_recovery(id, policy.max_attempts) {
                Ok(()) => {}
                Err(LifecycleError::NotFound(_)) => {
                    return Err(RecoveryError::Cleared {
                        recovery_id,
                        occurrence_id: id,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        let context_id = occurrence_id.map_or_else(|| ContextId::from(recovery_id), ContextId::from);
        let snapshot = request.context.clone().rekeyed(context_id.clone());
        self.contexts.save_context(context_id.clone(), snapshot);

        let run = Run {
            recovery_id,
            occurrence_id,
            category,
            started: Instant::now(),
        };
        let signal = Arc::new(CancelSignal::default());
        self.in_flight.insert(
            recovery_id,
            InFlightEntry {
                info: InFlightRecovery {
                    recovery_id,
                    occurrence_id,
                    category,
                    attempt: 0,
                    started_at: Utc::now(),
                },
                signal: signal.clone(),
            },
        );
        self.metrics.lock().record_started(category);
        let _guard = InFlightGuard {
            orchestrator: self,
            recovery_id,
        };

        tracing::info!(
            %recovery_id,
            occurrence_id = ?occurrence_id.map(|id| id.to_string()),
            %category,
            max_attempts = policy.max_attempts,
            action = policy.action().name(),
            "recovery started"
        );
        self.telemetry.record_event(
            events::RECOVERY_STARTED,
            json!({
                "recovery_id": recovery_id.to_string(),
                "occurrence_id": occurrence_id.map(|id| id.to_string()),
                "category": category.as_str(),
                "max_attempts": policy.max_attempts,
            }),
        );

        let mut ctx = request.into_attempt_context(recovery_id, category, error.clone());
        let mut last_error = AttemptFailure::new("no attempt made");

        for attempt in 1..=policy.max_attempts {
            if signal.is_cancelled() {
                return Err(self.conclude_cancelled(&run, attempt - 1));
            }
            if !policy.should_retry(error, attempt) {
                tracing::warn!(%recovery_id, %category, attempt, "policy declined retry");
                self.conclude_failed(&run, attempt - 1, "aborted: policy declined retry");
                return Err(RecoveryError::Aborted {
                    recovery_id,
                    category,
                    attempt,
                });
            }
            if let Some(err) = self.lifecycle_attempt(&run) {
                return Err(err);
            }
            if let Some(mut entry) = self.in_flight.get_mut(&recovery_id) {
                entry.info.attempt = attempt;
            }

            ctx.attempt = attempt;
            if let Some(preserved) = self.contexts.restore_context(&context_id) {
                ctx.diagnostic = preserved;
            }
            self.metrics.lock().record_attempt(category);

            let result = policy.action().recover(&ctx).await;
            self.telemetry.record_event(
                events::RECOVERY_ATTEMPT,
                json!({
                    "recovery_id": recovery_id.to_string(),
                    "attempt": attempt,
                    "success": result.is_ok(),
                    "error": result.as_ref().err().map(ToString::to_string),
                }),
            );

            match result {
                Ok(()) => return Ok(self.conclude_recovered(&run, attempt)),
                Err(failure) => {
                    last_error = failure;
                    if attempt == policy.max_attempts {
                        break;
                    }
                    let delay = self.backoff_delay(&policy.backoff, attempt);
                    tracing::warn!(
                        %recovery_id,
                        %category,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %last_error,
                        "recovery attempt failed, backing off"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = signal.cancelled() => {
                            return Err(self.conclude_cancelled(&run, attempt));
                        }
                    }
                    if let Some(err) = self.check_cleared(&run) {
                        return Err(err);
                    }
                }
            }
        }

        let attempts = policy.max_attempts;
        self.conclude_failed(&run, attempts, &format!("exhausted: {last_error}"));
        Err(RecoveryError::Exhausted {
            recovery_id,
            attempts,
            last_error,
        })
    }

    fn backoff_delay(&self, backoff: &Backoff, attempt: u32) -> Duration {
        match self.rng.lock().as_mut() {
            Some(rng) => backoff.jittered_delay_with(attempt, rng),
            None => backoff.jittered_delay_for(attempt),
        }
    }

    fn lifecycle_attempt(&self, run: &Run) -> Option<RecoveryError> {
        let (Some(id), Some(lifecycle)) = (run.occurrence_id, &self.lifecycle) else {
            return None;
        };
        match lifecycle.record_attempt(id) {
            Ok(_) => None,
            Err(err) if err.is_not_found() => Some(self.conclude_cleared(run, id)),
            Err(err) => {
                tracing::warn!(recovery_id = %run.recovery_id, error = %err, "attempt not recorded");
                Some(err.into())
            }
        }
    }

    fn check_cleared(&self, run: &Run) -> Option<RecoveryError> {
        let (Some(id), Some(lifecycle)) = (run.occurrence_id, &self.lifecycle) else {
            return None;
        };
        if lifecycle.contains(&id) {
            None
        } else {
            Some(self.conclude_cleared(run, id))
        }
    }

    fn conclude_recovered(&self, run: &Run, attempts: u32) -> RecoveryOutcome {
        let elapsed = run.started.elapsed();
        if let (Some(id), Some(lifecycle)) = (run.occurrence_id, &self.lifecycle) {
            if let Err(err) = lifecycle.resolve(id) {
                tracing::debug!(occurrence_id = %id, error = %err, "recovered completion ignored");
            }
        }
        self.metrics.lock().record_success(run.category, elapsed);
        tracing::info!(
            recovery_id = %run.recovery_id,
            category = %run.category,
            attempts,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "recovery succeeded"
        );
        self.emit_finished(run, "recovered", attempts, elapsed);
        RecoveryOutcome {
            recovery_id: run.recovery_id,
            occurrence_id: run.occurrence_id,
            category: run.category,
            attempts,
            elapsed,
        }
    }

    fn conclude_failed(&self, run: &Run, attempts: u32, reason: &str) {
        let elapsed = run.started.elapsed();
        if let (Some(id), Some(lifecycle)) = (run.occurrence_id, &self.lifecycle) {
            if let Err(err) = lifecycle.fail(id, reason) {
                tracing::debug!(occurrence_id = %id, error = %err, "failed completion ignored");
            }
        }
        self.metrics.lock().record_failure(run.category, elapsed);
        tracing::error!(
            recovery_id = %run.recovery_id,
            category = %run.category,
            attempts,
            reason,
            "recovery failed"
        );
        self.emit_finished(run, "failed", attempts, elapsed);
    }

    fn conclude_cancelled(&self, run: &Run, attempts: u32) -> RecoveryError {
        if let (Some(id), Some(lifecycle)) = (run.occurrence_id, &self.lifecycle) {
            if let Err(err) = lifecycle.fail(id, "cancelled") {
                tracing::debug!(occurrence_id = %id, error = %err, "cancelled completion ignored");
            }
        }
        self.metrics.lock().record_cancelled();
        tracing::info!(recovery_id = %run.recovery_id, attempts, "recovery cancelled");
        self.emit_finished(run, "cancelled", attempts, run.started.elapsed());
        RecoveryError::Cancelled(run.recovery_id)
    }

    fn conclude_cleared(&self, run: &Run, occurrence_id: OccurrenceId) -> RecoveryError {
        self.metrics.lock().record_cancelled();
        tracing::debug!(
            recovery_id = %run.recovery_id,
            %occurrence_id,
            "occurrence cleared, abandoning recovery"
        );
        RecoveryError::Cleared {
            recovery_id: run.recovery_id,
            occurrence_id,
        }
    }

    fn emit_finished(&self, run: &Run, outcome: &str, attempts: u32, elapsed: Duration) {
        self.telemetry.record_event(
            events::RECOVERY_FINISHED,
            json!({
                "recovery_id": run.recovery_id.to_string(),
                "occurrence_id": run.occurrence_id.map(|id| id.to_string()),
                "category": run.category.as_str(),
                "outcome": outcome,
                "attempts": attempts,
                "elapsed_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            }),
        );
    }
}
