//! End-to-end flows through the resilience service on a virtual clock

use pretty_assertions::assert_eq;
use rampart_core::telemetry::events;
use rampart_core::{ContextId, FailureCategory, ResilienceConfig};
use rampart_lifecycle::LifecycleState;
use rampart_recovery::RecoveryError;
use rampart_service::{
    BoundaryView, FailureBoundary, RecoveryHooks, ResilienceService, ServiceError,
};
use rampart_stream::ConnectionState;
use rampart_test_utils::{
    captured_state, deterministic_policy, integrity_error, network_error, RecordingTelemetry,
    ScriptedAction, ScriptedTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn service() -> ResilienceService {
    ResilienceService::new(ResilienceConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn transient_network_failure_recovers_on_second_attempt() {
    let service = service();
    let action = ScriptedAction::succeed_on(2);
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        3,
        1_000,
        10_000,
        action.clone(),
    ));

    let start = Instant::now();
    let report = service
        .catch_and_recover(
            &network_error(),
            "precinct-map",
            captured_state("precinct-map"),
            RecoveryHooks::new(),
        )
        .await
        .unwrap();

    assert!(report.is_recovered());
    assert_eq!(report.outcome.as_ref().unwrap().attempts, 2);
    assert_eq!(action.offsets_ms(start), vec![0, 1_000]);

    let occurrence = service.occurrence(&report.occurrence_id).unwrap();
    assert_eq!(occurrence.state, LifecycleState::Recovered);
    assert_eq!(occurrence.attempt_count, 2);
    assert_eq!(service.view(&report.occurrence_id), BoundaryView::Healthy);

    let summary = service.summary();
    assert_eq!(summary.recovered, 1);
    assert!((summary.success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_sees_the_captured_snapshot() {
    let service = service();
    let action = ScriptedAction::succeed_on(3);
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        3,
        100,
        1_000,
        action.clone(),
    ));

    let captured = captured_state("turnout-chart");
    let expected_domain = captured.domain.clone();
    let report = service
        .catch_and_recover(&network_error(), "turnout-chart", captured, RecoveryHooks::new())
        .await
        .unwrap();

    assert!(report.is_recovered());
    let records = action.records();
    assert_eq!(records.len(), 3);
    for record in records {
        assert_eq!(record.component_id, "turnout-chart");
        assert_eq!(record.domain, expected_domain);
    }
}

#[tokio::test(start_paused = true)]
async fn exhausted_failure_offers_manual_retry() {
    let service = service();
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        2,
        1_000,
        10_000,
        ScriptedAction::always_fail(),
    ));

    let report = service
        .catch_and_recover(
            &network_error(),
            "precinct-map",
            captured_state("precinct-map"),
            RecoveryHooks::new(),
        )
        .await
        .unwrap();
    let failed_id = report.occurrence_id;
    assert!(matches!(
        report.outcome,
        Err(RecoveryError::Exhausted { attempts: 2, .. })
    ));

    let view = service.view(&failed_id);
    assert!(view.can_retry());

    let healed = ScriptedAction::succeed_on(1);
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        2,
        1_000,
        10_000,
        healed.clone(),
    ));
    let retried = service.retry(failed_id, RecoveryHooks::new()).await.unwrap();

    assert_ne!(retried.occurrence_id, failed_id);
    assert!(retried.is_recovered());
    assert!(service.occurrence(&failed_id).is_none());
    assert!(!service.contexts().contains(&ContextId::from(failed_id)));

    let records = healed.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].component_id, "precinct-map");

    let fresh = service.occurrence(&retried.occurrence_id).unwrap();
    assert_eq!(fresh.error, network_error().summary());
    assert_eq!(fresh.state, LifecycleState::Recovered);
}

#[tokio::test]
async fn retry_is_only_offered_for_failed_occurrences() {
    let service = service();
    let id = service
        .on_failure_caught(&network_error(), "ticker", captured_state("ticker"))
        .unwrap();

    let err = service.retry(id, RecoveryHooks::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotRetryable {
            state: LifecycleState::Occurred,
            ..
        }
    ));
    assert_eq!(service.occurrence(&id).unwrap().state, LifecycleState::Occurred);
}

#[tokio::test]
async fn integrity_failure_is_terminal_without_attempts() {
    let service = service();
    let report = service
        .catch_and_recover(
            &integrity_error(),
            "tally-table",
            captured_state("tally-table"),
            RecoveryHooks::new(),
        )
        .await
        .unwrap();

    assert!(matches!(report.outcome, Err(RecoveryError::Aborted { .. })));
    let occurrence = service.occurrence(&report.occurrence_id).unwrap();
    assert_eq!(occurrence.category, FailureCategory::Integrity);
    assert_eq!(occurrence.state, LifecycleState::Failed);
    assert_eq!(occurrence.attempt_count, 0);
}

#[tokio::test(start_paused = true)]
async fn clearing_mid_recovery_stops_it() {
    let service = Arc::new(service());
    let action = ScriptedAction::always_fail();
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        3,
        1_000,
        10_000,
        action.clone(),
    ));
    let id = service
        .on_failure_caught(&network_error(), "precinct-map", captured_state("precinct-map"))
        .unwrap();

    let running = {
        let service = service.clone();
        tokio::spawn(async move { service.recover(id, RecoveryHooks::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(service.clear(id));

    let err = running.await.unwrap().unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(action.calls(), 1);
    assert!(service.occurrence(&id).is_none());
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_running_recoveries() {
    let service = Arc::new(service());
    service.init();
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        3,
        1_000,
        10_000,
        ScriptedAction::always_fail(),
    ));
    let id = service
        .on_failure_caught(&network_error(), "precinct-map", captured_state("precinct-map"))
        .unwrap();

    let running = {
        let service = service.clone();
        tokio::spawn(async move { service.recover(id, RecoveryHooks::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(service.teardown(), 1);

    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, ServiceError::Recovery(RecoveryError::Cancelled(_))));
    let occurrence = service.occurrence(&id).unwrap();
    assert_eq!(occurrence.state, LifecycleState::Failed);
    assert_eq!(occurrence.failure_reason.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn boundary_contract_reports_through_the_trait() {
    let service = service();
    let boundary: &dyn FailureBoundary = &service;
    let id = boundary
        .on_failure_caught(&network_error(), "results-map", captured_state("results-map"))
        .unwrap();

    assert_eq!(
        boundary.view(&id),
        BoundaryView::Recovering {
            occurrence_id: id,
            attempt: 0,
            max_attempts: None,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn telemetry_sees_the_whole_flow() {
    let telemetry = RecordingTelemetry::new();
    let service = ResilienceService::builder(ResilienceConfig::default())
        .with_telemetry(telemetry.clone())
        .build()
        .unwrap();
    service.register_policy(deterministic_policy(
        FailureCategory::Network,
        3,
        1_000,
        10_000,
        ScriptedAction::succeed_on(1),
    ));

    service
        .catch_and_recover(
            &network_error(),
            "precinct-map",
            captured_state("precinct-map"),
            RecoveryHooks::new(),
        )
        .await
        .unwrap();

    assert_eq!(telemetry.count(events::OCCURRENCE_RECORDED), 1);
    assert_eq!(telemetry.count(events::RECOVERY_STARTED), 1);
    assert_eq!(telemetry.count(events::RECOVERY_FINISHED), 1);
    assert!(telemetry.count(events::OCCURRENCE_TRANSITION) >= 2);
}

#[tokio::test(start_paused = true)]
async fn guarded_stream_uses_service_settings() {
    let service = service();
    let transport = ScriptedTransport::<String>::new();
    let (guardian, mut rx) = service.guard_stream::<String>(transport.clone());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(guardian.state(), ConnectionState::Connected);

    assert!(transport.send("precinct-14 reporting".to_string()));
    assert_eq!(rx.recv().await.unwrap(), "precinct-14 reporting");

    guardian.teardown().await.unwrap();
    assert_eq!(transport.disconnects(), 1);
}
