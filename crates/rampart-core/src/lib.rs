//! Rampart Core
//!
//! Shared foundation for the Rampart resilience layer:
//! - Identifiers and the closed [`FailureCategory`] set
//! - Pure fault classification over an explicit rule table
//! - Backoff mathematics used by both recovery and stream reconnection
//! - The optional telemetry collaborator
//! - Configuration loading
//!
//! # Example
//!
//! ```rust
//! use rampart_core::{Backoff, FailureCategory, FaultClassifier, FaultError};
//!
//! let classifier = FaultClassifier::new();
//! let category = classifier.classify(&FaultError::new("Failed to fetch"));
//! assert_eq!(category, FailureCategory::Network);
//!
//! let backoff = Backoff::new(1_000, 5_000, 2.0).without_jitter();
//! assert_eq!(backoff.base_delay_for(2), 2_000);
//! ```

#![warn(unreachable_pub)]

pub mod backoff;
pub mod classifier;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use backoff::{Backoff, DEFAULT_JITTER_RATIO};
pub use classifier::{classify, ClassificationRule, FaultClassifier, DEFAULT_RULES};
pub use config::{ContextConfig, LifecycleConfig, RecoveryConfig, ResilienceConfig, StreamConfig};
pub use error::ConfigError;
pub use telemetry::{NoopTelemetry, SharedTelemetry, TelemetrySink, TracingTelemetry};
pub use types::{
    ContextId, ErrorSummary, FailureCategory, FailureClass, FaultError, OccurrenceId,
    ParseCategoryError, RecoveryId,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
