//! Stream error types

/// Failure reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Worth another attempt after backoff
    #[error("transport error (retryable): {0}")]
    Retryable(String),

    /// Reconnecting cannot help (rejected credentials, unknown channel)
    #[error("transport error (fatal): {0}")]
    Fatal(String),
}

impl TransportError {
    /// Whether another attempt may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Errors from the guardian handle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardianError {
    /// The driver task has stopped (torn down or panicked)
    #[error("guardian for session {0} is no longer running")]
    Closed(String),
}
