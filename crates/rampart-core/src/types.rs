//! Core types for Rampart
//!
//! Defines the vocabulary shared by every component:
//! - Occurrence, recovery and context identifiers
//! - The closed set of failure categories and their taxonomy class
//! - The fault reported by a boundary and its condensed summary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique identifier of a recorded failure occurrence (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OccurrenceId(pub Ulid);

impl OccurrenceId {
    /// Generate new occurrence ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for OccurrenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OccurrenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "occ_{}", self.0)
    }
}

/// Unique identifier of one recovery execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecoveryId(pub Ulid);

impl RecoveryId {
    /// Generate new recovery ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecoveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecoveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec_{}", self.0)
    }
}

/// Key into the diagnostic context store.
///
/// Always an explicit string; contexts captured for an occurrence are keyed by
/// the occurrence's display form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextId(pub String);

impl ContextId {
    /// Create a context id from any string
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<OccurrenceId> for ContextId {
    fn from(id: OccurrenceId) -> Self {
        Self(id.to_string())
    }
}

impl From<RecoveryId> for ContextId {
    fn from(id: RecoveryId) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of failure categories assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Fetch/socket/connectivity failures
    Network,
    /// Deadlines and request timeouts
    Timeout,
    /// Malformed payloads, JSON/syntax errors
    DataParsing,
    /// Component render or hydration failures
    Rendering,
    /// Heap/allocation exhaustion
    Memory,
    /// Checksum, invariant or corruption failures
    Integrity,
    /// Authorization and security violations
    Security,
    /// No rule matched
    Unknown,
}

impl FailureCategory {
    /// Every category, in declaration order
    pub const ALL: [FailureCategory; 8] = [
        FailureCategory::Network,
        FailureCategory::Timeout,
        FailureCategory::DataParsing,
        FailureCategory::Rendering,
        FailureCategory::Memory,
        FailureCategory::Integrity,
        FailureCategory::Security,
        FailureCategory::Unknown,
    ];

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Network => "network",
            FailureCategory::Timeout => "timeout",
            FailureCategory::DataParsing => "data_parsing",
            FailureCategory::Rendering => "rendering",
            FailureCategory::Memory => "memory",
            FailureCategory::Integrity => "integrity",
            FailureCategory::Security => "security",
            FailureCategory::Unknown => "unknown",
        }
    }

    /// Taxonomy class driving the default recovery treatment
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            FailureCategory::Network
            | FailureCategory::Timeout
            | FailureCategory::DataParsing
            | FailureCategory::Rendering => FailureClass::TransientRecoverable,
            FailureCategory::Memory => FailureClass::ResourceExhaustion,
            FailureCategory::Integrity | FailureCategory::Security => {
                FailureClass::StructuralUnrecoverable
            }
            FailureCategory::Unknown => FailureClass::Unclassified,
        }
    }

    /// Whether any retry may ever be attempted for this category
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self.class(), FailureClass::StructuralUnrecoverable)
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown failure category: {0}")]
pub struct ParseCategoryError(pub String);

impl FromStr for FailureCategory {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        FailureCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseCategoryError(s.to_string()))
    }
}

/// Recovery taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Retried per policy
    TransientRecoverable,
    /// Single bounded retry after a forced cleanup
    ResourceExhaustion,
    /// Immediately terminal
    StructuralUnrecoverable,
    /// Generic bounded policy
    Unclassified,
}

/// A fault as raised inside a UI unit and caught by a boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultError {
    /// Human-readable message
    pub message: String,
    /// Error kind/name (e.g. `TypeError`, `NetworkError`)
    pub kind: String,
    /// Optional captured stack trace
    pub stack: Option<String>,
}

impl FaultError {
    /// Create a fault with the generic `Error` kind
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: "Error".to_string(),
            stack: None,
        }
    }

    /// With error kind
    #[inline]
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// With stack trace
    #[inline]
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Condensed summary stored on occurrences
    #[inline]
    #[must_use]
    pub fn summary(&self) -> ErrorSummary {
        ErrorSummary {
            message: self.message.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl fmt::Display for FaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FaultError {}

/// Message and kind of a fault, without the stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorSummary {
    /// Human-readable message
    pub message: String,
    /// Error kind/name
    pub kind: String,
}

impl ErrorSummary {
    /// Create summary
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ErrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_name() {
        for category in FailureCategory::ALL {
            assert_eq!(category.as_str().parse::<FailureCategory>(), Ok(category));
        }
        assert_eq!("Data-Parsing".parse(), Ok(FailureCategory::DataParsing));
        assert!("gremlins".parse::<FailureCategory>().is_err());
    }

    #[test]
    fn structural_categories_are_not_retryable() {
        assert!(!FailureCategory::Security.is_retryable());
        assert!(!FailureCategory::Integrity.is_retryable());
        assert!(FailureCategory::Network.is_retryable());
        assert_eq!(
            FailureCategory::Memory.class(),
            FailureClass::ResourceExhaustion
        );
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&FailureCategory::DataParsing).unwrap();
        assert_eq!(json, "\"data_parsing\"");
    }

    #[test]
    fn context_id_from_occurrence_uses_display_form() {
        let occ = OccurrenceId::new();
        let ctx = ContextId::from(occ);
        assert_eq!(ctx.as_str(), occ.to_string());
        assert!(ctx.as_str().starts_with("occ_"));
    }

    #[test]
    fn fault_summary_drops_stack() {
        let fault = FaultError::new("boom")
            .with_kind("TypeError")
            .with_stack("at Chart.render");
        let summary = fault.summary();
        assert_eq!(summary, ErrorSummary::new("boom", "TypeError"));
        assert_eq!(fault.to_string(), "TypeError: boom");
    }
}
