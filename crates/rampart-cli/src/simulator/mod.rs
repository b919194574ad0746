//! Scenario simulator
//!
//! Replays the reference resilience scenarios against a real
//! [`ResilienceService`] on a paused tokio clock, so minutes of backoff and
//! heartbeat silence run instantly and deterministically:
//!
//! - A: always-failing network recovery exhausts a 3-attempt budget
//! - B: recovery that fails once then succeeds
//! - C: a silent stream goes stale, reconnects and replays its buffer
//! - D: re-registering a category policy replaces the old one

mod fixtures;

use anyhow::Context as _;
use fixtures::{captured_state, network_error, network_policy, ScriptedAction, ScriptedTransport};
use rampart_core::{FailureCategory, ResilienceConfig, StreamConfig};
use rampart_lifecycle::LifecycleState;
use rampart_service::{RecoveryHooks, ResilienceService};
use rampart_stream::ConnectionState;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::time::Instant;

/// Reference scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Scenario {
    /// Exhausted network recovery
    A,
    /// Fail once, then recover
    B,
    /// Heartbeat staleness and buffered replay
    C,
    /// Last-write-wins policy registration
    D,
}

impl Scenario {
    pub(crate) const ALL: [Scenario; 4] = [Scenario::A, Scenario::B, Scenario::C, Scenario::D];

    fn title(self) -> &'static str {
        match self {
            Self::A => "always-failing recovery exhausts its budget",
            Self::B => "recovery fails once then succeeds",
            Self::C => "silent stream goes stale and replays on reconnect",
            Self::D => "re-registered policy replaces the previous one",
        }
    }
}

/// Simulator configuration
#[derive(Debug, Clone)]
pub(crate) struct SimulatorConfig {
    /// Seed for jitter
    pub(crate) seed: u64,
    /// Scenarios to run, in order
    pub(crate) scenarios: Vec<Scenario>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            scenarios: Scenario::ALL.to_vec(),
        }
    }
}

/// One expectation compared against what happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Check {
    pub(crate) name: &'static str,
    pub(crate) expected: String,
    pub(crate) actual: String,
}

impl Check {
    fn new(name: &'static str, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            name,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn passed(&self) -> bool {
        self.expected == self.actual
    }
}

/// Checks of one scenario
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScenarioReport {
    pub(crate) scenario: Scenario,
    pub(crate) checks: Vec<Check>,
}

impl ScenarioReport {
    pub(crate) fn passed(&self) -> bool {
        self.checks.iter().all(Check::passed)
    }
}

/// Final report from the simulator
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimulatorReport {
    pub(crate) seed: u64,
    pub(crate) scenarios: Vec<ScenarioReport>,
}

impl SimulatorReport {
    /// Whether every check of every scenario held
    pub(crate) fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// Human-readable report
    pub(crate) fn generate_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Rampart Scenario Report ===");
        let _ = writeln!(out, "Seed: {}", self.seed);
        for report in &self.scenarios {
            let _ = writeln!(
                out,
                "\n[{}] Scenario {:?}: {}",
                if report.passed() { "PASS" } else { "FAIL" },
                report.scenario,
                report.scenario.title()
            );
            for check in &report.checks {
                let mark = if check.passed() { "ok" } else { "MISMATCH" };
                let _ = writeln!(
                    out,
                    "  {:<28} expected {:<22} actual {:<22} {mark}",
                    check.name, check.expected, check.actual
                );
            }
        }
        let passed = self.scenarios.iter().filter(|r| r.passed()).count();
        let _ = writeln!(out, "\n{passed}/{} scenarios passed", self.scenarios.len());
        out
    }
}

/// Run the configured scenarios, each on a fresh paused runtime
pub(crate) fn run_simulator(config: &SimulatorConfig) -> anyhow::Result<SimulatorReport> {
    let mut scenarios = Vec::with_capacity(config.scenarios.len());
    for &scenario in &config.scenarios {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .context("failed to build simulator runtime")?;
        let checks = runtime
            .block_on(run_scenario(scenario, config.seed))
            .with_context(|| format!("scenario {scenario:?} aborted"))?;
        tracing::debug!(?scenario, checks = checks.len(), "scenario finished");
        scenarios.push(ScenarioReport { scenario, checks });
    }
    Ok(SimulatorReport {
        seed: config.seed,
        scenarios,
    })
}

async fn run_scenario(scenario: Scenario, seed: u64) -> anyhow::Result<Vec<Check>> {
    match scenario {
        Scenario::A => exhausted_recovery(seed).await,
        Scenario::B => fail_once_then_recover(seed).await,
        Scenario::C => stale_stream(seed).await,
        Scenario::D => last_write_wins(seed).await,
    }
}

fn service(config: ResilienceConfig, seed: u64) -> anyhow::Result<ResilienceService> {
    let service = ResilienceService::builder(config).with_seed(seed).build()?;
    service.init();
    Ok(service)
}

async fn exhausted_recovery(seed: u64) -> anyhow::Result<Vec<Check>> {
    let service = service(ResilienceConfig::default(), seed)?;
    let action = ScriptedAction::always_fail();
    service.register_policy(network_policy(3, 1_000, 10_000, action.clone()));

    let start = Instant::now();
    let report = service
        .catch_and_recover(
            &network_error(),
            "precinct-map",
            captured_state("precinct-map"),
            RecoveryHooks::new(),
        )
        .await?;
    let state = service
        .occurrence(&report.occurrence_id)
        .map(|o| o.state.to_string())
        .unwrap_or_default();
    service.teardown();

    Ok(vec![
        Check::new("attempts", 3, action.calls()),
        Check::new(
            "attempt offsets (ms)",
            format!("{:?}", [0, 1_000, 3_000]),
            format!("{:?}", action.offsets_ms(start)),
        ),
        Check::new("final state", LifecycleState::Failed, state),
    ])
}

async fn fail_once_then_recover(seed: u64) -> anyhow::Result<Vec<Check>> {
    let service = service(ResilienceConfig::default(), seed)?;
    service.register_policy(network_policy(3, 1_000, 10_000, ScriptedAction::succeed_on(2)));

    let report = service
        .catch_and_recover(
            &network_error(),
            "turnout-chart",
            captured_state("turnout-chart"),
            RecoveryHooks::new(),
        )
        .await?;
    let occurrence = service
        .occurrence(&report.occurrence_id)
        .context("occurrence vanished")?;
    service.teardown();

    Ok(vec![
        Check::new("final state", LifecycleState::Recovered, occurrence.state),
        Check::new("attempt count", 2, occurrence.attempt_count),
    ])
}

async fn stale_stream(seed: u64) -> anyhow::Result<Vec<Check>> {
    let config = ResilienceConfig::default()
        .with_stream(StreamConfig::default().with_buffer_capacity(3));
    let service = service(config, seed)?;

    let transport = ScriptedTransport::<String>::with_script([Ok(())]);
    transport.refuse_next(1);
    let (guardian, mut rx) = service.guard_stream::<String>(transport.clone());

    tokio::time::sleep(Duration::from_millis(1)).await;
    let opened = guardian.state();

    // Stale at 60s; the first reconnect near 61s is refused.
    tokio::time::sleep(Duration::from_millis(61_500)).await;
    let after_silence = guardian.state();

    for n in 1..=5 {
        transport.send(format!("precinct-{n}"));
    }
    tokio::time::sleep(Duration::from_secs(3)).await;
    let reopened = guardian.state();

    let mut replayed = Vec::new();
    while let Ok(message) = rx.try_recv() {
        replayed.push(message);
    }
    let stats = guardian.stats();
    guardian.teardown().await?;
    service.teardown();

    Ok(vec![
        Check::new("state after open", ConnectionState::Connected, opened),
        Check::new("state after 61s silence", ConnectionState::Reconnecting, after_silence),
        Check::new("state after reconnect", ConnectionState::Connected, reopened),
        Check::new(
            "replayed messages",
            "precinct-3,precinct-4,precinct-5",
            replayed.join(","),
        ),
        Check::new("dropped on overflow", 2, stats.dropped),
    ])
}

async fn last_write_wins(seed: u64) -> anyhow::Result<Vec<Check>> {
    let service = service(ResilienceConfig::default(), seed)?;
    let first = ScriptedAction::succeed_on(1);
    let second = ScriptedAction::succeed_on(1);
    service.register_policy(network_policy(3, 1_000, 10_000, first.clone()));
    let replaced = service.register_policy(network_policy(2, 500, 5_000, second.clone()));

    service
        .catch_and_recover(
            &network_error(),
            "results-map",
            captured_state("results-map"),
            RecoveryHooks::new(),
        )
        .await?;
    let budget = service.registry().get(FailureCategory::Network).max_attempts;
    service.teardown();

    Ok(vec![
        Check::new("previous policy returned", true, replaced.is_some()),
        Check::new("first policy invocations", 0, first.calls()),
        Check::new("second policy invocations", 1, second.calls()),
        Check::new("registered budget", 2, budget),
    ])
}
