//! Recovery policy registry
//!
//! Policies are global per category: registering a category again replaces the
//! previous policy for every subsequent lookup. Categories without a policy
//! resolve to the generic bounded fallback.

use crate::policy::{builtin_policies, RecoveryPolicy};
use dashmap::DashMap;
use rampart_core::{FailureCategory, RecoveryConfig};

/// Category to policy map with a documented fallback
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: DashMap<FailureCategory, RecoveryPolicy>,
    fallback: RecoveryConfig,
}

impl PolicyRegistry {
    /// Empty registry; every lookup falls back to the generic policy
    #[must_use]
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            policies: DashMap::new(),
            fallback: config,
        }
    }

    /// Registry with the taxonomy policies pre-registered
    #[must_use]
    pub fn with_builtin_policies(config: RecoveryConfig) -> Self {
        let registry = Self::new(config);
        for policy in builtin_policies(registry.fallback.jitter_ratio) {
            registry.register(policy);
        }
        registry
    }

    /// Build according to `config.builtin_policies`
    #[must_use]
    pub fn from_config(config: RecoveryConfig) -> Self {
        if config.builtin_policies {
            Self::with_builtin_policies(config)
        } else {
            Self::new(config)
        }
    }

    /// Store a policy under its category, replacing any previous one.
    /// Returns the replaced policy.
    pub fn register(&self, policy: RecoveryPolicy) -> Option<RecoveryPolicy> {
        let category = policy.category;
        let previous = self.policies.insert(category, policy);
        if previous.is_some() {
            tracing::debug!(%category, "recovery policy replaced");
        } else {
            tracing::debug!(%category, "recovery policy registered");
        }
        previous
    }

    /// Store a policy under an explicit category
    pub fn register_for(
        &self,
        category: FailureCategory,
        mut policy: RecoveryPolicy,
    ) -> Option<RecoveryPolicy> {
        policy.category = category;
        self.register(policy)
    }

    /// Remove a registration; lookups fall back afterwards
    pub fn unregister(&self, category: FailureCategory) -> Option<RecoveryPolicy> {
        self.policies.remove(&category).map(|(_, p)| p)
    }

    /// Policy for `category`, or the generic fallback
    #[must_use]
    pub fn get(&self, category: FailureCategory) -> RecoveryPolicy {
        self.policies
            .get(&category)
            .map(|p| p.value().clone())
            .unwrap_or_else(|| self.fallback_policy(category))
    }

    /// Whether an explicit registration exists
    #[must_use]
    pub fn contains(&self, category: FailureCategory) -> bool {
        self.policies.contains_key(&category)
    }

    /// Generic bounded policy used for unregistered categories
    #[must_use]
    pub fn fallback_policy(&self, category: FailureCategory) -> RecoveryPolicy {
        RecoveryPolicy::from_config(category, &self.fallback)
    }

    /// Registered categories in declaration order
    #[must_use]
    pub fn categories(&self) -> Vec<FailureCategory> {
        let mut categories: Vec<_> = self.policies.iter().map(|e| *e.key()).collect();
        categories.sort();
        categories
    }

    /// Number of registrations
    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::from_config(RecoveryConfig::default())
    }
}
