//! Recovery scenarios on a virtual clock

use rampart_context::{DiagnosticContext, DiagnosticContextStore};
use rampart_core::{Backoff, ContextId, ErrorSummary, FailureCategory, RecoveryConfig};
use rampart_lifecycle::{ErrorLifecycleStore, FailureOccurrence, LifecycleState};
use rampart_recovery::{
    fn_action, retry_callback, AttemptFailure, PolicyRegistry, RecoveryError,
    RecoveryOrchestrator, RecoveryPolicy, RecoveryRequest,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

struct Harness {
    lifecycle: Arc<ErrorLifecycleStore>,
    orchestrator: RecoveryOrchestrator,
}

fn harness() -> Harness {
    let lifecycle = Arc::new(ErrorLifecycleStore::default());
    let orchestrator = RecoveryOrchestrator::new(
        Arc::new(PolicyRegistry::new(RecoveryConfig::default())),
        Arc::new(DiagnosticContextStore::default()),
    )
    .with_lifecycle(lifecycle.clone());
    Harness {
        lifecycle,
        orchestrator,
    }
}

fn network_error() -> ErrorSummary {
    ErrorSummary::new("NetworkError when attempting to fetch resource", "TypeError")
}

fn request() -> RecoveryRequest {
    RecoveryRequest::new(DiagnosticContext::new(ContextId::new("snap"), "precinct-map"))
}

fn scenario_policy() -> RecoveryPolicy {
    RecoveryPolicy::new(FailureCategory::Network)
        .with_max_attempts(3)
        .with_backoff(Backoff::new(1_000, 2_500, 2.0).without_jitter())
}

#[tokio::test(start_paused = true)]
async fn always_failing_action_uses_whole_budget_then_fails() {
    let h = harness();
    h.orchestrator.registry().register(scenario_policy());
    let id = h
        .lifecycle
        .record(FailureOccurrence::new(
            FailureCategory::Network,
            "precinct-map",
            network_error(),
        ))
        .unwrap();

    let start = Instant::now();
    let stamps = Arc::new(Mutex::new(Vec::new()));
    let log = stamps.clone();
    let req = request().with_retry(retry_callback(move || {
        log.lock().unwrap().push(start.elapsed());
        async { Err(AttemptFailure::new("still offline")) }
    }));

    let err = h.orchestrator.recover_occurrence(id, req).await.unwrap_err();

    assert!(matches!(err, RecoveryError::Exhausted { attempts: 3, .. }));
    assert!(err.is_terminal());
    assert_eq!(
        *stamps.lock().unwrap(),
        vec![
            Duration::ZERO,
            Duration::from_millis(1_000),
            Duration::from_millis(3_000),
        ]
    );
    // The wait after a third failure would be capped, but the budget ends first.
    assert_eq!(scenario_policy().backoff.base_delay_for(3), 2_500);

    let occ = h.lifecycle.get(&id).unwrap();
    assert_eq!(occ.state, LifecycleState::Failed);
    assert_eq!(occ.attempt_count, 3);
    assert!(occ.failure_reason.unwrap().contains("still offline"));
    assert_eq!(h.orchestrator.metrics().failed_recoveries, 1);
}

#[tokio::test(start_paused = true)]
async fn action_failing_once_recovers_on_second_attempt() {
    let h = harness();
    h.orchestrator.registry().register(scenario_policy());
    let id = h
        .lifecycle
        .record(FailureOccurrence::new(
            FailureCategory::Network,
            "precinct-map",
            network_error(),
        ))
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let req = request().with_retry(retry_callback(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(AttemptFailure::new("transient"))
            } else {
                Ok(())
            }
        }
    }));

    let outcome = h.orchestrator.recover_occurrence(id, req).await.unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.elapsed, Duration::from_millis(1_000));
    let occ = h.lifecycle.get(&id).unwrap();
    assert_eq!(occ.state, LifecycleState::Recovered);
    assert_eq!(occ.attempt_count, 2);
    assert!((h.lifecycle.summary().success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn re_registering_a_category_replaces_its_policy() {
    let h = harness();
    let first_calls = Arc::new(AtomicU32::new(0));
    let second_calls = Arc::new(AtomicU32::new(0));

    let first = first_calls.clone();
    h.orchestrator.registry().register(
        RecoveryPolicy::new(FailureCategory::Network).with_action(fn_action(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })),
    );
    let second = second_calls.clone();
    h.orchestrator.registry().register(
        RecoveryPolicy::new(FailureCategory::Network).with_action(fn_action(move |_| {
            second.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })),
    );

    for _ in 0..3 {
        h.orchestrator
            .execute_recovery(FailureCategory::Network, &network_error(), request())
            .await
            .unwrap();
    }

    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    assert_eq!(second_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn structural_failures_are_terminal_without_attempts() {
    let h = harness();
    for policy in rampart_recovery::builtin_policies(0.0) {
        h.orchestrator.registry().register(policy);
    }
    let id = h
        .lifecycle
        .record(FailureOccurrence::new(
            FailureCategory::Integrity,
            "ledger",
            ErrorSummary::new("checksum mismatch", "IntegrityError"),
        ))
        .unwrap();

    let err = h.orchestrator.recover_occurrence(id, request()).await.unwrap_err();

    assert!(matches!(err, RecoveryError::Aborted { .. }));
    let occ = h.lifecycle.get(&id).unwrap();
    assert_eq!(occ.state, LifecycleState::Failed);
    assert_eq!(occ.attempt_count, 0);
}

#[tokio::test(start_paused = true)]
async fn memory_policy_cleans_up_before_single_retry() {
    let h = harness();
    for policy in rampart_recovery::builtin_policies(0.0) {
        h.orchestrator.registry().register(policy);
    }
    let order = Arc::new(Mutex::new(Vec::new()));
    let cleanup_log = order.clone();
    let retry_log = order.clone();
    let req = request()
        .with_cleanup(Arc::new(move || cleanup_log.lock().unwrap().push("cleanup")))
        .with_retry(retry_callback(move || {
            retry_log.lock().unwrap().push("retry");
            async { Err(AttemptFailure::new("heap still full")) }
        }));

    let err = h
        .orchestrator
        .execute_recovery(
            FailureCategory::Memory,
            &ErrorSummary::new("out of memory", "RangeError"),
            req,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RecoveryError::Exhausted { attempts: 1, .. }));
    assert_eq!(*order.lock().unwrap(), vec!["cleanup", "retry"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_recoveries_proceed_independently() {
    let h = Arc::new(harness());
    h.orchestrator.registry().register(scenario_policy());

    let mut handles = Vec::new();
    for fail_times in 0..3u32 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            let calls = Arc::new(AtomicU32::new(0));
            let req = request().with_retry(retry_callback(move || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < fail_times {
                        Err(AttemptFailure::new("nope"))
                    } else {
                        Ok(())
                    }
                }
            }));
            h.orchestrator
                .execute_recovery(FailureCategory::Network, &network_error(), req)
                .await
        }));
    }

    let mut attempts = Vec::new();
    for handle in handles {
        attempts.push(handle.await.unwrap().unwrap().attempts);
    }
    assert_eq!(attempts, vec![1, 2, 3]);
    let metrics = h.orchestrator.metrics();
    assert_eq!(metrics.total_recoveries, 3);
    assert_eq!(metrics.successful_recoveries, 3);
    assert_eq!(metrics.total_attempts, 6);
    assert_eq!(metrics.in_flight, 0);
}
