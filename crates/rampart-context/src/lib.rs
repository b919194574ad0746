//! Rampart Diagnostic Context Store
//!
//! Preserves what the UI looked like when a fault was caught so that every
//! recovery attempt, and whoever renders the terminal failure, sees the same
//! snapshot.
//!
//! ```text
//! boundary ── save_context(id) ──▶ [ oldest … newest ] ── restore_context(id) ──▶ recovery
//!                                      │ capacity: evict oldest inserted
//!                                      └ sweeper: drop entries older than TTL
//! ```

#![warn(unreachable_pub)]

pub mod snapshot;
pub mod store;

pub use snapshot::{CapturedState, DiagnosticContext};
pub use store::{ContextStats, DiagnosticContextStore};
