//! Rampart Recovery
//!
//! Category-specific recovery with bounded retry:
//! - [`RecoveryPolicy`]: attempt budget, backoff curve, retry predicate, action
//! - [`PolicyRegistry`]: global per-category registrations, last write wins
//! - [`RecoveryOrchestrator`]: runs a policy, feeds the lifecycle store and metrics
//!
//! # Example
//!
//! ```rust,no_run
//! use rampart_context::{DiagnosticContext, DiagnosticContextStore};
//! use rampart_core::{ContextId, ErrorSummary, FailureCategory, RecoveryConfig};
//! use rampart_recovery::{PolicyRegistry, RecoveryOrchestrator, RecoveryRequest};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), rampart_recovery::RecoveryError> {
//! let orchestrator = RecoveryOrchestrator::new(
//!     Arc::new(PolicyRegistry::with_builtin_policies(RecoveryConfig::default())),
//!     Arc::new(DiagnosticContextStore::default()),
//! );
//! let request = RecoveryRequest::new(DiagnosticContext::new(ContextId::new("c1"), "results-map"));
//! let outcome = orchestrator
//!     .execute_recovery(
//!         FailureCategory::Network,
//!         &ErrorSummary::new("Failed to fetch", "TypeError"),
//!         request,
//!     )
//!     .await?;
//! assert_eq!(outcome.attempts, 1);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod context;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod policy;
pub mod registry;

pub use context::{retry_callback, CleanupHook, RecoveryContext, RecoveryRequest, RetryCallback};
pub use error::{AttemptFailure, RecoveryError};
pub use self::metrics::RecoveryMetrics;
pub use orchestrator::{InFlightRecovery, RecoveryOrchestrator, RecoveryOutcome};
pub use policy::{
    builtin_policies, fn_action, CleanupThenRetry, FnAction, RecoveryAction, RecoveryPolicy,
    RetryAction, RetryPredicate,
};
pub use registry::PolicyRegistry;
