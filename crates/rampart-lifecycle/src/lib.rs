//! Rampart Error Lifecycle Store
//!
//! Tracks each failure occurrence through a closed state machine:
//!
//! ```text
//! occurred ──▶ recovering ──▶ recovered
//!                   └───────▶ failed
//! ```
//!
//! Every change goes through a pure reducer; the store wraps it with locking
//! and publishes summaries and events to observers.

#![warn(unreachable_pub)]

pub mod error;
pub mod occurrence;
pub mod reducer;
pub mod state_machine;
pub mod store;

pub use error::LifecycleError;
pub use occurrence::FailureOccurrence;
pub use reducer::{reduce, Applied, LifecycleAction, LifecycleSummary, LifecycleTable};
pub use state_machine::{allowed_transitions, validate_transition, LifecycleState};
pub use store::{ErrorLifecycleStore, LifecycleEvent};
