//! Recovery policies and actions
//!
//! A policy is the per-category recipe: attempt budget, backoff curve, an
//! applicability predicate consulted before every attempt, and the action
//! that performs one attempt.

use crate::context::RecoveryContext;
use crate::error::AttemptFailure;
use async_trait::async_trait;
use rampart_core::{Backoff, ErrorSummary, FailureCategory, RecoveryConfig};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Performs one recovery attempt
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    /// Try to recover; an error counts as a failed attempt
    async fn recover(&self, ctx: &RecoveryContext) -> Result<(), AttemptFailure>;

    /// Name for logs
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Identity action: re-invokes the caller's retry callback
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryAction;

#[async_trait]
impl RecoveryAction for RetryAction {
    async fn recover(&self, ctx: &RecoveryContext) -> Result<(), AttemptFailure> {
        ctx.retry().await
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}

/// Runs the cleanup hook, then the retry callback
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupThenRetry;

#[async_trait]
impl RecoveryAction for CleanupThenRetry {
    async fn recover(&self, ctx: &RecoveryContext) -> Result<(), AttemptFailure> {
        if ctx.run_cleanup() {
            tracing::debug!(recovery_id = %ctx.recovery_id, "cleanup hook ran before retry");
        }
        ctx.retry().await
    }

    fn name(&self) -> &'static str {
        "cleanup_then_retry"
    }
}

/// Action backed by an async closure over a cloned context
pub struct FnAction<F> {
    f: F,
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnAction")
    }
}

/// Build an action from an async closure
pub fn fn_action<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(RecoveryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AttemptFailure>> + Send + 'static,
{
    FnAction { f }
}

#[async_trait]
impl<F, Fut> RecoveryAction for FnAction<F>
where
    F: Fn(RecoveryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), AttemptFailure>> + Send + 'static,
{
    async fn recover(&self, ctx: &RecoveryContext) -> Result<(), AttemptFailure> {
        (self.f)(ctx.clone()).await
    }
}

/// Predicate consulted before each attempt: `(error, attempt) -> bool`
pub type RetryPredicate = Arc<dyn Fn(&ErrorSummary, u32) -> bool + Send + Sync>;

/// Category-specific recovery recipe
#[derive(Clone)]
pub struct RecoveryPolicy {
    /// Category the policy is registered under
    pub category: FailureCategory,
    /// Attempt budget
    pub max_attempts: u32,
    /// Wait curve between attempts
    pub backoff: Backoff,
    should_retry: RetryPredicate,
    action: Arc<dyn RecoveryAction>,
}

impl RecoveryPolicy {
    /// Policy with the generic defaults: 3 attempts, 1000ms base, x2,
    /// unconditional retry and the identity action
    #[must_use]
    pub fn new(category: FailureCategory) -> Self {
        Self::from_config(category, &RecoveryConfig::default())
    }

    /// Generic bounded policy from configuration
    #[must_use]
    pub fn from_config(category: FailureCategory, config: &RecoveryConfig) -> Self {
        Self {
            category,
            max_attempts: config.default_max_attempts,
            backoff: config.default_backoff(),
            should_retry: Arc::new(|_, _| true),
            action: Arc::new(RetryAction),
        }
    }

    /// With attempt budget
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// With backoff curve
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// With applicability predicate
    #[must_use]
    pub fn with_should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ErrorSummary, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Decline every attempt; the failure is terminal immediately
    #[must_use]
    pub fn never_retry(self) -> Self {
        self.with_should_retry(|_, _| false)
    }

    /// With recovery action
    #[must_use]
    pub fn with_action(mut self, action: impl RecoveryAction + 'static) -> Self {
        self.action = Arc::new(action);
        self
    }

    /// With a shared recovery action
    #[inline]
    #[must_use]
    pub fn with_shared_action(mut self, action: Arc<dyn RecoveryAction>) -> Self {
        self.action = action;
        self
    }

    /// Whether attempt `attempt` may run
    #[inline]
    #[must_use]
    pub fn should_retry(&self, error: &ErrorSummary, attempt: u32) -> bool {
        (self.should_retry)(error, attempt)
    }

    /// Action performing each attempt
    #[inline]
    #[must_use]
    pub fn action(&self) -> &Arc<dyn RecoveryAction> {
        &self.action
    }
}

impl fmt::Debug for RecoveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPolicy")
            .field("category", &self.category)
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("action", &self.action.name())
            .finish_non_exhaustive()
    }
}

/// Taxonomy policies pre-registered by
/// [`PolicyRegistry::with_builtin_policies`](crate::PolicyRegistry::with_builtin_policies)
#[must_use]
pub fn builtin_policies(jitter_ratio: f64) -> Vec<RecoveryPolicy> {
    let curve = |base, cap, multiplier| Backoff::new(base, cap, multiplier).with_jitter(jitter_ratio);
    vec![
        RecoveryPolicy::new(FailureCategory::Network)
            .with_max_attempts(3)
            .with_backoff(curve(1_000, 10_000, 2.0)),
        RecoveryPolicy::new(FailureCategory::Timeout)
            .with_max_attempts(3)
            .with_backoff(curve(2_000, 15_000, 2.0)),
        RecoveryPolicy::new(FailureCategory::DataParsing)
            .with_max_attempts(2)
            .with_backoff(curve(500, 2_000, 1.5)),
        RecoveryPolicy::new(FailureCategory::Rendering)
            .with_max_attempts(2)
            .with_backoff(curve(250, 1_000, 2.0)),
        RecoveryPolicy::new(FailureCategory::Memory)
            .with_max_attempts(1)
            .with_action(CleanupThenRetry),
        RecoveryPolicy::new(FailureCategory::Integrity)
            .with_max_attempts(1)
            .never_retry(),
        RecoveryPolicy::new(FailureCategory::Security)
            .with_max_attempts(1)
            .never_retry(),
    ]
}
