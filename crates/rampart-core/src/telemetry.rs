//! Telemetry collaborator
//!
//! An optional sink that the orchestrator, lifecycle store and guardian call on
//! every transition and attempt. Its absence never changes core behavior:
//! components hold a [`SharedTelemetry`] that defaults to [`NoopTelemetry`].

use serde_json::Value;
use std::sync::Arc;

/// Event sink for recovery and lifecycle telemetry
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    /// Record a named event with a JSON payload
    fn record_event(&self, name: &str, payload: Value);
}

/// Shared, type-erased telemetry sink
pub type SharedTelemetry = Arc<dyn TelemetrySink>;

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    #[inline]
    fn record_event(&self, _name: &str, _payload: Value) {}
}

/// Sink that forwards events to `tracing` at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record_event(&self, name: &str, payload: Value) {
        tracing::info!(target: "rampart::telemetry", event = name, payload = %payload);
    }
}

/// Default sink used when none is injected
#[inline]
#[must_use]
pub fn noop() -> SharedTelemetry {
    Arc::new(NoopTelemetry)
}

/// Event names emitted by Rampart components
pub mod events {
    /// A boundary reported a new failure occurrence
    pub const OCCURRENCE_RECORDED: &str = "occurrence.recorded";
    /// An occurrence changed lifecycle state
    pub const OCCURRENCE_TRANSITION: &str = "occurrence.transition";
    /// An occurrence was removed
    pub const OCCURRENCE_CLEARED: &str = "occurrence.cleared";
    /// A recovery execution started
    pub const RECOVERY_STARTED: &str = "recovery.started";
    /// One recovery attempt finished
    pub const RECOVERY_ATTEMPT: &str = "recovery.attempt";
    /// A recovery execution reached its outcome
    pub const RECOVERY_FINISHED: &str = "recovery.finished";
    /// A stream session changed connection state
    pub const STREAM_STATE: &str = "stream.state";
    /// The guardian flushed buffered messages
    pub const STREAM_FLUSH: &str = "stream.flush";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn noop_accepts_any_event() {
        let sink = noop();
        sink.record_event(events::RECOVERY_STARTED, json!({ "attempt": 1 }));
    }

    #[test]
    fn mock_sink_observes_calls() {
        let mut mock = MockTelemetrySink::new();
        mock.expect_record_event()
            .withf(|name, payload| name == events::STREAM_FLUSH && payload["count"] == 3)
            .times(1)
            .return_const(());

        let sink: SharedTelemetry = Arc::new(mock);
        sink.record_event(events::STREAM_FLUSH, json!({ "count": 3 }));
    }
}
