//! Fault classification
//!
//! Maps a caught fault onto a [`FailureCategory`] using an ordered rule table.
//! Rules are tried in order; the first with a pattern found in either the
//! message or the stack wins. Matching is case-insensitive substring search.
//! No match yields [`FailureCategory::Unknown`].

use crate::types::{FailureCategory, FaultError};

/// One classification rule: a category and the substrings that select it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Category assigned on match
    pub category: FailureCategory,
    /// Lowercase substrings; any one matching selects the rule
    pub patterns: Vec<String>,
}

impl ClassificationRule {
    /// Create rule; patterns are normalized to lowercase
    #[must_use]
    pub fn new<I, S>(category: FailureCategory, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            category,
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Whether any pattern occurs in the (already lowercased) haystack
    #[inline]
    #[must_use]
    pub fn matches(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|p| haystack.contains(p.as_str()))
    }
}

/// Default rule table, in precedence order.
///
/// Structural categories come first so an "integrity check failed while
/// fetching" message is never downgraded to a retryable network fault.
pub const DEFAULT_RULES: &[(FailureCategory, &[&str])] = &[
    (
        FailureCategory::Security,
        &[
            "security",
            "unauthorized",
            "forbidden",
            "permission denied",
            "csrf",
            "xss",
            "content security policy",
        ],
    ),
    (
        FailureCategory::Integrity,
        &[
            "integrity",
            "checksum",
            "tamper",
            "corrupt",
            "invariant",
            "hash mismatch",
        ],
    ),
    (
        FailureCategory::Memory,
        &[
            "out of memory",
            "heap",
            "allocation failed",
            "memory",
            "maximum call stack",
        ],
    ),
    (
        FailureCategory::Timeout,
        &["timeout", "timed out", "deadline exceeded", "aborterror"],
    ),
    (
        FailureCategory::Network,
        &[
            "network",
            "failed to fetch",
            "fetch",
            "connection",
            "econnrefused",
            "econnreset",
            "socket",
            "offline",
            "websocket",
        ],
    ),
    (
        FailureCategory::DataParsing,
        &[
            "json",
            "parse",
            "unexpected token",
            "syntaxerror",
            "deserializ",
            "malformed",
            "invalid data",
        ],
    ),
    (
        FailureCategory::Rendering,
        &[
            "render",
            "hydration",
            "cannot read propert",
            "is not a function",
            "undefined is not",
            "chart",
        ],
    ),
];

/// Pure, deterministic fault classifier
#[derive(Debug, Clone)]
pub struct FaultClassifier {
    rules: Vec<ClassificationRule>,
}

impl FaultClassifier {
    /// Classifier with the default rule table
    #[must_use]
    pub fn new() -> Self {
        Self::with_rules(
            DEFAULT_RULES
                .iter()
                .map(|(category, patterns)| ClassificationRule::new(*category, patterns.iter())),
        )
    }

    /// Classifier with a custom, ordered rule table
    #[must_use]
    pub fn with_rules(rules: impl IntoIterator<Item = ClassificationRule>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    /// Rules in precedence order
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classify a fault.
    ///
    /// Each rule is tested against the message (prefixed by the kind) and the
    /// stack before moving on to the next, so rule order alone decides.
    #[must_use]
    pub fn classify(&self, error: &FaultError) -> FailureCategory {
        let message = format!("{} {}", error.kind, error.message).to_lowercase();
        let stack = error.stack.as_deref().map(str::to_lowercase);

        self.rules
            .iter()
            .find(|rule| {
                rule.matches(&message) || stack.as_deref().is_some_and(|s| rule.matches(s))
            })
            .map_or(FailureCategory::Unknown, |rule| rule.category)
    }
}

impl Default for FaultClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify with the default table
#[must_use]
pub fn classify(error: &FaultError) -> FailureCategory {
    FaultClassifier::new().classify(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_messages_classify_as_network() {
        assert_eq!(
            classify(&FaultError::new("Failed to fetch")),
            FailureCategory::Network
        );
        assert_eq!(
            classify(&FaultError::new("ECONNREFUSED 127.0.0.1:443")),
            FailureCategory::Network
        );
    }

    #[test]
    fn kind_participates_in_matching() {
        let err = FaultError::new("Unexpected end of input").with_kind("SyntaxError");
        assert_eq!(classify(&err), FailureCategory::DataParsing);
    }

    #[test]
    fn first_rule_wins_on_overlap() {
        // Mentions both "integrity" and "fetch"; integrity precedes network.
        let err = FaultError::new("Subresource integrity check failed during fetch");
        assert_eq!(classify(&err), FailureCategory::Integrity);
    }

    #[test]
    fn stack_is_consulted_when_message_is_silent() {
        let err = FaultError::new("something went wrong")
            .with_stack("at renderPollChart (Chart.tsx:42)");
        assert_eq!(classify(&err), FailureCategory::Rendering);
    }

    #[test]
    fn earlier_rule_in_stack_beats_later_rule_in_message() {
        let err = FaultError::new("Failed to fetch")
            .with_stack("Error: integrity check failed\n    at verifyTally (tally.ts:88)");
        assert_eq!(classify(&err), FailureCategory::Integrity);
    }

    #[test]
    fn earlier_rule_in_message_beats_later_rule_in_stack() {
        let err = FaultError::new("request timed out").with_stack("at fetchJson (api.ts:10)");
        assert_eq!(classify(&err), FailureCategory::Timeout);
    }

    #[test]
    fn unmatched_is_unknown() {
        assert_eq!(
            classify(&FaultError::new("the quick brown fox")),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(
            classify(&FaultError::new("FORBIDDEN")),
            FailureCategory::Security
        );
    }

    #[test]
    fn custom_rules_replace_defaults() {
        let classifier = FaultClassifier::with_rules([ClassificationRule::new(
            FailureCategory::Memory,
            ["Quota"],
        )]);
        assert_eq!(
            classifier.classify(&FaultError::new("quota exceeded")),
            FailureCategory::Memory
        );
        assert_eq!(
            classifier.classify(&FaultError::new("Failed to fetch")),
            FailureCategory::Unknown
        );
    }

    #[test]
    fn every_default_rule_is_reachable() {
        let classifier = FaultClassifier::new();
        for rule in classifier.rules() {
            let sample = FaultError::new(rule.patterns[0].clone()).with_kind("");
            assert_eq!(classifier.classify(&sample), rule.category, "{:?}", rule);
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let err = FaultError::new("JSON.parse: bad control character");
        let first = classify(&err);
        for _ in 0..10 {
            assert_eq!(classify(&err), first);
        }
    }
}
