//! Diagnostic snapshot captured when a boundary reports a fault

use chrono::{DateTime, Utc};
use rampart_core::ContextId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Environment and domain state at the moment a fault was caught
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticContext {
    /// Key in the context store
    pub context_id: ContextId,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
    /// UI unit that raised the fault
    pub component_id: String,
    /// Environment snapshot (route, viewport, connectivity, ...)
    pub environment: BTreeMap<String, String>,
    /// Domain snapshot (e.g. the active selection)
    pub domain: Value,
}

impl DiagnosticContext {
    /// Create an empty context for a component
    #[must_use]
    pub fn new(context_id: ContextId, component_id: impl Into<String>) -> Self {
        Self {
            context_id,
            captured_at: Utc::now(),
            component_id: component_id.into(),
            environment: BTreeMap::new(),
            domain: Value::Null,
        }
    }

    /// Add an environment entry
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the domain snapshot
    #[must_use]
    pub fn with_domain(mut self, domain: Value) -> Self {
        self.domain = domain;
        self
    }

    /// Rebind to another key, keeping the captured state
    #[must_use]
    pub fn rekeyed(mut self, context_id: ContextId) -> Self {
        self.context_id = context_id;
        self
    }
}

/// Snapshot supplied by a boundary before an id is assigned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedState {
    /// Environment snapshot
    pub environment: BTreeMap<String, String>,
    /// Domain snapshot
    pub domain: Value,
}

impl CapturedState {
    /// Empty capture
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment entry
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the domain snapshot
    #[must_use]
    pub fn with_domain(mut self, domain: Value) -> Self {
        self.domain = domain;
        self
    }

    /// Bind to a key and component
    #[must_use]
    pub fn into_context(
        self,
        context_id: ContextId,
        component_id: impl Into<String>,
    ) -> DiagnosticContext {
        DiagnosticContext {
            context_id,
            captured_at: Utc::now(),
            component_id: component_id.into(),
            environment: self.environment,
            domain: self.domain,
        }
    }
}
