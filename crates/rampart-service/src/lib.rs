//! Rampart Service
//!
//! One application-level context tying the resilience components together:
//! - [`FailureBoundary`]: the contract a UI boundary reports caught faults through
//! - [`ResilienceService`]: classification, context capture, lifecycle tracking,
//!   recovery, manual retry and guarded streams behind one handle
//!
//! # Example
//!
//! ```rust,no_run
//! use rampart_context::CapturedState;
//! use rampart_core::{FaultError, ResilienceConfig};
//! use rampart_service::{RecoveryHooks, ResilienceService};
//!
//! # async fn run() -> Result<(), rampart_service::ServiceError> {
//! let service = ResilienceService::new(ResilienceConfig::default())?;
//! service.init();
//!
//! let report = service
//!     .catch_and_recover(
//!         &FaultError::new("Failed to fetch").with_kind("TypeError"),
//!         "turnout-chart",
//!         CapturedState::new().with_env("route", "/turnout"),
//!         RecoveryHooks::new(),
//!     )
//!     .await?;
//! assert!(report.is_recovered());
//!
//! service.teardown();
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod boundary;
pub mod error;
pub mod service;

pub use boundary::{BoundaryView, FailureBoundary};
pub use error::ServiceError;
pub use service::{RecoveryHooks, RecoveryReport, ResilienceService, ResilienceServiceBuilder};
