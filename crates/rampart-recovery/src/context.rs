//! What a recovery action gets to work with

use crate::error::AttemptFailure;
use futures::future::BoxFuture;
use rampart_context::DiagnosticContext;
use rampart_core::{ErrorSummary, FailureCategory, OccurrenceId, RecoveryId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a retry callback
pub type RetryFuture = BoxFuture<'static, Result<(), AttemptFailure>>;

/// Caller-supplied operation that re-runs whatever failed
pub type RetryCallback = Arc<dyn Fn() -> RetryFuture + Send + Sync>;

/// Caller-supplied cleanup run before a resource-exhaustion retry
pub type CleanupHook = Arc<dyn Fn() + Send + Sync>;

/// Wrap an async closure as a [`RetryCallback`]
pub fn retry_callback<F, Fut>(f: F) -> RetryCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AttemptFailure>> + Send + 'static,
{
    Arc::new(move || -> RetryFuture { Box::pin(f()) })
}

/// Input to one recovery execution
#[derive(Clone)]
pub struct RecoveryRequest {
    /// Occurrence being recovered, if tracked by a lifecycle store
    pub occurrence_id: Option<OccurrenceId>,
    /// Snapshot persisted before the first attempt
    pub context: DiagnosticContext,
    retry: Option<RetryCallback>,
    cleanup: Option<CleanupHook>,
}

impl RecoveryRequest {
    /// Request carrying a diagnostic snapshot
    #[must_use]
    pub fn new(context: DiagnosticContext) -> Self {
        Self {
            occurrence_id: None,
            context,
            retry: None,
            cleanup: None,
        }
    }

    /// Tie the execution to a recorded occurrence
    #[inline]
    #[must_use]
    pub fn for_occurrence(mut self, id: OccurrenceId) -> Self {
        self.occurrence_id = Some(id);
        self
    }

    /// With retry callback
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryCallback) -> Self {
        self.retry = Some(retry);
        self
    }

    /// With cleanup hook
    #[inline]
    #[must_use]
    pub fn with_cleanup(mut self, cleanup: CleanupHook) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub(crate) fn into_attempt_context(
        self,
        recovery_id: RecoveryId,
        category: FailureCategory,
        error: ErrorSummary,
    ) -> RecoveryContext {
        RecoveryContext {
            recovery_id,
            occurrence_id: self.occurrence_id,
            category,
            error,
            attempt: 0,
            diagnostic: self.context,
            retry: self.retry,
            cleanup: self.cleanup,
        }
    }
}

impl fmt::Debug for RecoveryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryRequest")
            .field("occurrence_id", &self.occurrence_id)
            .field("context", &self.context.context_id)
            .field("retry", &self.retry.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

/// Context handed to [`RecoveryAction::recover`](crate::RecoveryAction::recover) on each attempt
#[derive(Clone)]
pub struct RecoveryContext {
    /// Recovery id
    pub recovery_id: RecoveryId,
    /// Occurrence id, if tracked
    pub occurrence_id: Option<OccurrenceId>,
    /// Failure category
    pub category: FailureCategory,
    /// Error being recovered from
    pub error: ErrorSummary,
    /// 1-based attempt number
    pub attempt: u32,
    /// Diagnostic snapshot as preserved by the context store
    pub diagnostic: DiagnosticContext,
    retry: Option<RetryCallback>,
    cleanup: Option<CleanupHook>,
}

impl RecoveryContext {
    /// Whether a retry callback was supplied
    #[inline]
    #[must_use]
    pub fn has_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// Re-run the caller's operation. Succeeds immediately without a callback.
    pub async fn retry(&self) -> Result<(), AttemptFailure> {
        match &self.retry {
            Some(retry) => retry().await,
            None => Ok(()),
        }
    }

    /// Run the cleanup hook; returns whether one was supplied
    pub fn run_cleanup(&self) -> bool {
        match &self.cleanup {
            Some(cleanup) => {
                cleanup();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for RecoveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryContext")
            .field("recovery_id", &self.recovery_id)
            .field("occurrence_id", &self.occurrence_id)
            .field("category", &self.category)
            .field("attempt", &self.attempt)
            .field("context_id", &self.diagnostic.context_id)
            .finish_non_exhaustive()
    }
}
