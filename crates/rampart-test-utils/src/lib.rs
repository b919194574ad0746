//! Testing utilities for the Rampart workspace
//!
//! Scripted collaborators, recording telemetry and fault fixtures shared by
//! integration tests and the scenario simulator.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rampart_context::CapturedState;
use rampart_core::{Backoff, FailureCategory, FaultError, TelemetrySink};
use rampart_recovery::{AttemptFailure, RecoveryAction, RecoveryContext, RecoveryPolicy};
use rampart_stream::{EventSink, Transport, TransportError, TransportEvent};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// Fault fixtures
// ---------------------------------------------------------------------------

pub fn network_error() -> FaultError {
    FaultError::new("NetworkError when attempting to fetch resource").with_kind("TypeError")
}

pub fn timeout_error() -> FaultError {
    FaultError::new("Request timed out after 30000ms").with_kind("TimeoutError")
}

pub fn parse_error() -> FaultError {
    FaultError::new("Unexpected token < in JSON at position 0").with_kind("SyntaxError")
}

pub fn memory_error() -> FaultError {
    FaultError::new("Out of memory while decoding tile layer").with_kind("RangeError")
}

pub fn integrity_error() -> FaultError {
    FaultError::new("Checksum mismatch in tally payload").with_kind("IntegrityError")
}

pub fn captured_state(component_id: &str) -> CapturedState {
    CapturedState::new()
        .with_env("route", format!("/{component_id}"))
        .with_env("viewport", "1280x800")
        .with_domain(json!({ "component": component_id, "selection": ["precinct-14"] }))
}

/// Policy with a deterministic curve and the given action
pub fn deterministic_policy(
    category: FailureCategory,
    max_attempts: u32,
    base_ms: u64,
    max_ms: u64,
    action: Arc<dyn RecoveryAction>,
) -> RecoveryPolicy {
    RecoveryPolicy::new(category)
        .with_max_attempts(max_attempts)
        .with_backoff(Backoff::new(base_ms, max_ms, 2.0).without_jitter())
        .with_shared_action(action)
}

// ---------------------------------------------------------------------------
// Scripted recovery action
// ---------------------------------------------------------------------------

/// One invocation seen by a [`ScriptedAction`]
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub at: Instant,
    pub component_id: String,
    pub domain: Value,
}

/// Recovery action that fails until a given attempt, recording every call
#[derive(Debug, Default)]
pub struct ScriptedAction {
    succeed_on: Option<u32>,
    records: Mutex<Vec<AttemptRecord>>,
}

impl ScriptedAction {
    pub fn always_fail() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails attempts before `attempt`, succeeds from `attempt` on
    pub fn succeed_on(attempt: u32) -> Arc<Self> {
        Arc::new(Self {
            succeed_on: Some(attempt),
            records: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> u32 {
        u32::try_from(self.records.lock().len()).unwrap_or(u32::MAX)
    }

    pub fn records(&self) -> Vec<AttemptRecord> {
        self.records.lock().clone()
    }

    /// Milliseconds from `start` to each invocation
    pub fn offsets_ms(&self, start: Instant) -> Vec<u64> {
        self.records
            .lock()
            .iter()
            .map(|r| u64::try_from(r.at.duration_since(start).as_millis()).unwrap_or(u64::MAX))
            .collect()
    }
}

#[async_trait]
impl RecoveryAction for ScriptedAction {
    async fn recover(&self, ctx: &RecoveryContext) -> Result<(), AttemptFailure> {
        self.records.lock().push(AttemptRecord {
            attempt: ctx.attempt,
            at: Instant::now(),
            component_id: ctx.diagnostic.component_id.clone(),
            domain: ctx.diagnostic.domain.clone(),
        });
        match self.succeed_on {
            Some(n) if ctx.attempt >= n => Ok(()),
            _ => Err(AttemptFailure::new(format!(
                "scripted failure on attempt {}",
                ctx.attempt
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// Transport whose connect results follow a script; `Ok` once the script runs out
#[derive(Debug)]
pub struct ScriptedTransport<M> {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sink: Mutex<Option<EventSink<M>>>,
    connects: AtomicU32,
    disconnects: AtomicU32,
}

impl<M> Default for ScriptedTransport<M> {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            sink: Mutex::new(None),
            connects: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
        }
    }
}

impl<M> ScriptedTransport<M> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(
        script: impl IntoIterator<Item = Result<(), TransportError>>,
    ) -> Arc<Self> {
        let transport = Self::default();
        transport.script.lock().extend(script);
        Arc::new(transport)
    }

    /// Queue the result of a future connect
    pub fn push_result(&self, result: Result<(), TransportError>) {
        self.script.lock().push_back(result);
    }

    /// Refuse the next `n` connects with a retryable error
    pub fn refuse_next(&self, n: usize) {
        let mut script = self.script.lock();
        for _ in 0..n {
            script.push_back(Err(TransportError::Retryable("connection refused".into())));
        }
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Push an event into the current sink; false when nothing is listening
    pub fn emit(&self, event: TransportEvent<M>) -> bool {
        self.sink
            .lock()
            .as_ref()
            .is_some_and(|sink| sink.send(event).is_ok())
    }

    pub fn send(&self, message: M) -> bool {
        self.emit(TransportEvent::Message(message))
    }

    pub fn heartbeat(&self) -> bool {
        self.emit(TransportEvent::Heartbeat)
    }

    pub fn break_connection(&self, reason: &str) -> bool {
        self.emit(TransportEvent::Error(reason.to_string()))
    }
}

#[async_trait]
impl<M: Send + 'static> Transport<M> for ScriptedTransport<M> {
    async fn connect(&self, events: EventSink<M>) -> Result<(), TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(events);
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Recording telemetry
// ---------------------------------------------------------------------------

/// Telemetry sink keeping every event in order
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingTelemetry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|(n, _)| n == name).count()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn record_event(&self, name: &str, payload: Value) {
        self.events.lock().push((name.to_string(), payload));
    }
}
