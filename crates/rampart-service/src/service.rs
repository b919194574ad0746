//! Resilience service
//!
//! The application-level context that owns one instance of every component
//! and wires them together:
//!
//! ```text
//! boundary ─▶ classify ─▶ save context ─▶ record occurrence
//!                                              │
//! recover(id) ─▶ restore context ─▶ orchestrator ─▶ lifecycle transitions
//! retry(id)   ─▶ clear failed ─▶ record fresh ─▶ recover
//! ```
//!
//! Created once per application via [`ResilienceService::new`] or the
//! builder, started with [`ResilienceService::init`] and stopped with
//! [`ResilienceService::teardown`].

use crate::boundary::{BoundaryView, FailureBoundary};
use crate::error::ServiceError;
use rampart_context::{CapturedState, DiagnosticContext, DiagnosticContextStore};
use rampart_core::telemetry::noop;
use rampart_core::{
    ContextId, FailureCategory, FaultClassifier, FaultError, OccurrenceId, ResilienceConfig,
    SharedTelemetry,
};
use rampart_lifecycle::{
    ErrorLifecycleStore, FailureOccurrence, LifecycleError, LifecycleEvent, LifecycleState,
    LifecycleSummary,
};
use rampart_recovery::{
    CleanupHook, PolicyRegistry, RecoveryError, RecoveryMetrics, RecoveryOrchestrator,
    RecoveryOutcome, RecoveryPolicy, RecoveryRequest, RetryCallback,
};
use rampart_stream::{GuardianOptions, StreamGuardian, Transport};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Caller-supplied hooks for one recovery execution
#[derive(Clone, Default)]
pub struct RecoveryHooks {
    retry: Option<RetryCallback>,
    cleanup: Option<CleanupHook>,
}

impl RecoveryHooks {
    /// No hooks: retry-style actions succeed trivially
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With the operation to re-run on each attempt
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryCallback) -> Self {
        self.retry = Some(retry);
        self
    }

    /// With a hook that releases resources before retrying
    #[inline]
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: CleanupHook) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    fn into_request(self, context: DiagnosticContext, occurrence_id: OccurrenceId) -> RecoveryRequest {
        let mut request = RecoveryRequest::new(context).for_occurrence(occurrence_id);
        if let Some(retry) = self.retry {
            request = request.with_retry(retry);
        }
        if let Some(cleanup) = self.cleanup {
            request = request.with_cleanup(cleanup);
        }
        request
    }
}

impl fmt::Debug for RecoveryHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryHooks")
            .field("retry", &self.retry.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Result of recording an occurrence and driving its recovery
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryReport {
    /// Occurrence that was recovered (or failed)
    pub occurrence_id: OccurrenceId,
    /// How the recovery ended
    pub outcome: Result<RecoveryOutcome, RecoveryError>,
}

impl RecoveryReport {
    /// Whether the occurrence ended `recovered`
    #[inline]
    #[must_use]
    pub fn is_recovered(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Builder for [`ResilienceService`]
#[derive(Clone)]
pub struct ResilienceServiceBuilder {
    config: ResilienceConfig,
    classifier: FaultClassifier,
    telemetry: SharedTelemetry,
    seed: Option<u64>,
}

impl ResilienceServiceBuilder {
    /// With a custom classification table
    #[inline]
    #[must_use]
    pub fn with_classifier(mut self, classifier: FaultClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// With telemetry sink shared by every component
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Seed jitter for reproducible runs
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate the configuration and assemble the components
    pub fn build(self) -> Result<ResilienceService, ServiceError> {
        self.config.validate()?;

        let contexts = Arc::new(DiagnosticContextStore::new(self.config.context.clone()));
        let lifecycle = Arc::new(
            ErrorLifecycleStore::new(self.config.lifecycle.clone())
                .with_telemetry(self.telemetry.clone()),
        );
        let registry = Arc::new(PolicyRegistry::from_config(self.config.recovery.clone()));
        let mut orchestrator = RecoveryOrchestrator::new(registry.clone(), contexts.clone())
            .with_lifecycle(lifecycle.clone())
            .with_telemetry(self.telemetry.clone());
        if let Some(seed) = self.seed {
            orchestrator = orchestrator.with_seed(seed);
        }

        tracing::debug!(
            policies = registry.len(),
            context_capacity = contexts.capacity(),
            "resilience service assembled"
        );

        Ok(ResilienceService {
            config: self.config,
            classifier: self.classifier,
            contexts,
            lifecycle,
            registry,
            orchestrator: Arc::new(orchestrator),
            telemetry: self.telemetry,
            seed: self.seed,
            initialized: AtomicBool::new(false),
        })
    }
}

impl fmt::Debug for ResilienceServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceServiceBuilder")
            .field("config", &self.config)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Application context owning the classifier, stores, registry and orchestrator
pub struct ResilienceService {
    config: ResilienceConfig,
    classifier: FaultClassifier,
    contexts: Arc<DiagnosticContextStore>,
    lifecycle: Arc<ErrorLifecycleStore>,
    registry: Arc<PolicyRegistry>,
    orchestrator: Arc<RecoveryOrchestrator>,
    telemetry: SharedTelemetry,
    seed: Option<u64>,
    initialized: AtomicBool,
}

impl ResilienceService {
    /// Builder with the default classifier and no telemetry
    #[must_use]
    pub fn builder(config: ResilienceConfig) -> ResilienceServiceBuilder {
        ResilienceServiceBuilder {
            config,
            classifier: FaultClassifier::new(),
            telemetry: noop(),
            seed: None,
        }
    }

    /// Assemble with defaults for everything but the configuration
    pub fn new(config: ResilienceConfig) -> Result<Self, ServiceError> {
        Self::builder(config).build()
    }

    /// Start background work (the context sweeper). Must run inside a tokio runtime.
    pub fn init(&self) {
        self.contexts.init();
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!(
                policies = self.registry.len(),
                "resilience service initialized"
            );
        }
    }

    /// Stop background work and cancel running recoveries; returns how many were cancelled.
    /// Stream guardians are owned by their callers and torn down separately.
    pub fn teardown(&self) -> usize {
        let cancelled = self.orchestrator.teardown();
        self.contexts.teardown();
        if self.initialized.swap(false, Ordering::SeqCst) {
            tracing::info!(cancelled, "resilience service torn down");
        }
        cancelled
    }

    /// Whether [`Self::init`] ran without a later teardown
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Effective configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Diagnostic context store
    #[inline]
    #[must_use]
    pub fn contexts(&self) -> &Arc<DiagnosticContextStore> {
        &self.contexts
    }

    /// Lifecycle store
    #[inline]
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<ErrorLifecycleStore> {
        &self.lifecycle
    }

    /// Policy registry
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    /// Recovery orchestrator
    #[inline]
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<RecoveryOrchestrator> {
        &self.orchestrator
    }

    /// Category for a fault under this service's classification table
    #[must_use]
    pub fn classify(&self, error: &FaultError) -> FailureCategory {
        self.classifier.classify(error)
    }

    /// Register a policy; returns the one it replaced
    pub fn register_policy(&self, policy: RecoveryPolicy) -> Option<RecoveryPolicy> {
        self.registry.register(policy)
    }

    /// Classify, snapshot and record a caught fault
    pub fn on_failure_caught(
        &self,
        error: &FaultError,
        component_id: &str,
        captured: CapturedState,
    ) -> Result<OccurrenceId, ServiceError> {
        let category = self.classifier.classify(error);
        let occurrence = FailureOccurrence::new(category, component_id, error.summary());
        let id = occurrence.id;

        let context = captured.into_context(occurrence.context_id.clone(), component_id);
        self.contexts.save_context(occurrence.context_id.clone(), context);
        self.lifecycle.record(occurrence)?;

        tracing::info!(
            occurrence_id = %id,
            %category,
            component_id,
            error = %error,
            "failure caught"
        );
        Ok(id)
    }

    /// Run the category's policy for a recorded occurrence
    pub async fn recover(
        &self,
        occurrence_id: OccurrenceId,
        hooks: RecoveryHooks,
    ) -> Result<RecoveryOutcome, ServiceError> {
        let occurrence = self
            .lifecycle
            .get(&occurrence_id)
            .ok_or(LifecycleError::NotFound(occurrence_id))?;
        let context = self.snapshot_for(&occurrence);
        let request = hooks.into_request(context, occurrence_id);
        Ok(self.orchestrator.recover_occurrence(occurrence_id, request).await?)
    }

    /// Record a caught fault and drive its recovery to a terminal state
    pub async fn catch_and_recover(
        &self,
        error: &FaultError,
        component_id: &str,
        captured: CapturedState,
        hooks: RecoveryHooks,
    ) -> Result<RecoveryReport, ServiceError> {
        let occurrence_id = self.on_failure_caught(error, component_id, captured)?;
        self.drive(occurrence_id, hooks).await
    }

    /// Manual retry of a failed occurrence.
    ///
    /// The failed occurrence is cleared and a fresh one with the same error,
    /// component and diagnostic context is recorded and recovered.
    pub async fn retry(
        &self,
        occurrence_id: OccurrenceId,
        hooks: RecoveryHooks,
    ) -> Result<RecoveryReport, ServiceError> {
        let previous = self
            .lifecycle
            .get(&occurrence_id)
            .ok_or(LifecycleError::NotFound(occurrence_id))?;
        if previous.state != LifecycleState::Failed {
            return Err(ServiceError::NotRetryable {
                id: occurrence_id,
                state: previous.state,
            });
        }

        let snapshot = self.snapshot_for(&previous);
        self.clear(occurrence_id);

        let fresh = FailureOccurrence::new(
            previous.category,
            previous.origin_component_id.clone(),
            previous.error.clone(),
        );
        let fresh_id = fresh.id;
        self.contexts
            .save_context(fresh.context_id.clone(), snapshot.rekeyed(fresh.context_id.clone()));
        self.lifecycle.record(fresh)?;

        tracing::info!(
            previous_id = %occurrence_id,
            occurrence_id = %fresh_id,
            category = %previous.category,
            "manual retry"
        );
        self.drive(fresh_id, hooks).await
    }

    async fn drive(
        &self,
        occurrence_id: OccurrenceId,
        hooks: RecoveryHooks,
    ) -> Result<RecoveryReport, ServiceError> {
        match self.recover(occurrence_id, hooks).await {
            Ok(outcome) => Ok(RecoveryReport {
                occurrence_id,
                outcome: Ok(outcome),
            }),
            Err(ServiceError::Recovery(err)) if !matches!(err, RecoveryError::Lifecycle(_)) => {
                Ok(RecoveryReport {
                    occurrence_id,
                    outcome: Err(err),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Remove an occurrence and its diagnostic context; returns whether it existed
    pub fn clear(&self, occurrence_id: OccurrenceId) -> bool {
        let context_id = self
            .lifecycle
            .get(&occurrence_id)
            .map_or_else(|| ContextId::from(occurrence_id), |o| o.context_id);
        let existed = self.lifecycle.clear(occurrence_id);
        self.contexts.remove(&context_id);
        existed
    }

    /// Remove every occurrence and context; returns how many occurrences were dropped
    pub fn clear_all(&self) -> usize {
        let removed = self.lifecycle.clear_all();
        self.contexts.clear();
        removed
    }

    /// Occurrence snapshot
    #[must_use]
    pub fn occurrence(&self, occurrence_id: &OccurrenceId) -> Option<FailureOccurrence> {
        self.lifecycle.get(occurrence_id)
    }

    /// Diagnostic context captured for an occurrence, if still retained
    #[must_use]
    pub fn diagnostic_context(&self, occurrence_id: &OccurrenceId) -> Option<DiagnosticContext> {
        let occurrence = self.lifecycle.get(occurrence_id)?;
        self.contexts.restore_context(&occurrence.context_id)
    }

    /// Lifecycle summary
    #[must_use]
    pub fn summary(&self) -> LifecycleSummary {
        self.lifecycle.summary()
    }

    /// Watch the lifecycle summary
    #[must_use]
    pub fn subscribe_summary(&self) -> watch::Receiver<LifecycleSummary> {
        self.lifecycle.subscribe_summary()
    }

    /// Stream of lifecycle events
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle.subscribe_events()
    }

    /// Recovery metrics snapshot
    #[must_use]
    pub fn metrics(&self) -> RecoveryMetrics {
        self.orchestrator.metrics()
    }

    /// Open a guarded subscription with this service's stream settings and telemetry
    pub fn guard_stream<M: Send + 'static>(
        &self,
        transport: Arc<dyn Transport<M>>,
    ) -> (StreamGuardian, mpsc::UnboundedReceiver<M>) {
        let mut options =
            GuardianOptions::new(self.config.stream.clone()).with_telemetry(self.telemetry.clone());
        if let Some(seed) = self.seed {
            options = options.with_seed(seed);
        }
        StreamGuardian::spawn_with(transport, options)
    }

    fn snapshot_for(&self, occurrence: &FailureOccurrence) -> DiagnosticContext {
        self.contexts
            .restore_context(&occurrence.context_id)
            .unwrap_or_else(|| {
                tracing::debug!(
                    occurrence_id = %occurrence.id,
                    "diagnostic context expired, recovering with an empty snapshot"
                );
                DiagnosticContext::new(
                    occurrence.context_id.clone(),
                    occurrence.origin_component_id.clone(),
                )
            })
    }
}

impl FailureBoundary for ResilienceService {
    fn on_failure_caught(
        &self,
        error: &FaultError,
        component_id: &str,
        captured: CapturedState,
    ) -> Result<OccurrenceId, ServiceError> {
        ResilienceService::on_failure_caught(self, error, component_id, captured)
    }

    fn view(&self, occurrence_id: &OccurrenceId) -> BoundaryView {
        BoundaryView::from_occurrence(self.lifecycle.get(occurrence_id).as_ref())
    }
}

impl fmt::Debug for ResilienceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilienceService")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("orchestrator", &self.orchestrator)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}
