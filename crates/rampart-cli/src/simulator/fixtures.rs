//! Scripted collaborators driven by the simulator scenarios

use async_trait::async_trait;
use parking_lot::Mutex;
use rampart_context::CapturedState;
use rampart_core::{Backoff, FailureCategory, FaultError};
use rampart_recovery::{AttemptFailure, RecoveryAction, RecoveryContext, RecoveryPolicy};
use rampart_stream::{EventSink, Transport, TransportError, TransportEvent};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::time::Instant;

pub(super) fn network_error() -> FaultError {
    FaultError::new("NetworkError when attempting to fetch resource").with_kind("TypeError")
}

pub(super) fn captured_state(component_id: &str) -> CapturedState {
    CapturedState::new()
        .with_env("route", format!("/{component_id}"))
        .with_domain(json!({ "component": component_id }))
}

/// Network policy with a jitter-free doubling curve
pub(super) fn network_policy(
    max_attempts: u32,
    base_ms: u64,
    max_ms: u64,
    action: Arc<dyn RecoveryAction>,
) -> RecoveryPolicy {
    RecoveryPolicy::new(FailureCategory::Network)
        .with_max_attempts(max_attempts)
        .with_backoff(Backoff::new(base_ms, max_ms, 2.0).without_jitter())
        .with_shared_action(action)
}

/// Fails every attempt before `succeed_on`, noting when each one ran
#[derive(Debug, Default)]
pub(super) struct ScriptedAction {
    succeed_on: Option<u32>,
    invoked_at: Mutex<Vec<Instant>>,
}

impl ScriptedAction {
    pub(super) fn always_fail() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn succeed_on(attempt: u32) -> Arc<Self> {
        Arc::new(Self {
            succeed_on: Some(attempt),
            invoked_at: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn calls(&self) -> usize {
        self.invoked_at.lock().len()
    }

    /// Milliseconds from `start` to each invocation
    pub(super) fn offsets_ms(&self, start: Instant) -> Vec<u128> {
        self.invoked_at
            .lock()
            .iter()
            .map(|at| at.duration_since(start).as_millis())
            .collect()
    }
}

#[async_trait]
impl RecoveryAction for ScriptedAction {
    async fn recover(&self, ctx: &RecoveryContext) -> Result<(), AttemptFailure> {
        self.invoked_at.lock().push(Instant::now());
        match self.succeed_on {
            Some(n) if ctx.attempt >= n => Ok(()),
            _ => Err(AttemptFailure::new(format!("attempt {} refused", ctx.attempt))),
        }
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Transport answering connects from a queue; `Ok` once the queue is empty
pub(super) struct ScriptedTransport<M> {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sink: Mutex<Option<EventSink<M>>>,
}

impl<M> ScriptedTransport<M> {
    pub(super) fn with_script(
        script: impl IntoIterator<Item = Result<(), TransportError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            sink: Mutex::new(None),
        })
    }

    pub(super) fn refuse_next(&self, n: usize) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(Err(TransportError::Retryable("connection refused".into())));
        }
    }

    /// Deliver a message on the current connection; false when none is open
    pub(super) fn send(&self, message: M) -> bool {
        self.sink
            .lock()
            .as_ref()
            .is_some_and(|sink| sink.send(TransportEvent::Message(message)).is_ok())
    }
}

#[async_trait]
impl<M: Send + 'static> Transport<M> for ScriptedTransport<M> {
    async fn connect(&self, events: EventSink<M>) -> Result<(), TransportError> {
        *self.sink.lock() = Some(events);
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn disconnect(&self) {}
}
