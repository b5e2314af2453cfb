//! Integration test for the full circuit breaker lifecycle around a
//! flaky source: consecutive failures open the circuit, the open window
//! fails fast, and trial calls close it again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use async_trait::async_trait;
use vigil_core::config::{SourceEntry, VigilConfig};
use vigil_core::error::{Result, VigilError};
use vigil_core::pipeline::{FetchReport, SourceFetcher};
use vigil_core::resilience::CircuitState;
use vigil_core::runtime::VigilRuntime;
use vigil_core::{ErrorClass, IncidentTier, RunStatus};

/// Fails its first `fail_first` calls, then returns records
struct ScriptedFetcher {
    fail_first: u32,
    records: u64,
    calls: AtomicU32,
}

#[async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<FetchReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            Err(VigilError::transient(
                "fr-bulk",
                format!("connection reset on call {call}"),
            ))
        } else {
            Ok(FetchReport::records(self.records))
        }
    }
}

fn lifecycle_config() -> VigilConfig {
    let mut config = VigilConfig::default();
    // One attempt per run so each failed run marks the breaker exactly once
    config.resilience.retry.max_attempts = 1;
    config.resilience.retry.base_delay_ms = 5;
    config.resilience.breaker.failure_threshold = 5;
    config.resilience.breaker.success_threshold = 2;
    config.resilience.breaker.open_duration_seconds = 1;
    config.resilience.breaker.max_trial_calls = 1;
    config.sources.push(SourceEntry {
        name: "fr-bulk".to_string(),
        critical: true,
        expected_interval_minutes: Some(60),
        ..Default::default()
    });
    config
}

#[tokio::test]
async fn test_breaker_opens_rejects_and_recovers() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();

    info!("🧪 Testing full breaker lifecycle for a flaky source");

    let runtime = VigilRuntime::from_config(lifecycle_config())?;
    let fetcher = Arc::new(ScriptedFetcher {
        fail_first: 5,
        records: 42,
        calls: AtomicU32::new(0),
    });
    runtime.register_fetcher("fr-bulk", fetcher.clone())?;

    info!("🔧 Phase 1: five consecutive failures should open the circuit");
    for run in 1..=5u32 {
        let report = runtime.run_cycle().await;
        let outcome = &report.outcomes[0];
        assert_eq!(outcome.status, RunStatus::Error, "run {run} should fail");
        assert_eq!(outcome.attempts, 1, "run {run} should make one attempt");
    }
    assert_eq!(
        runtime.breakers().state("fr-bulk"),
        Some(CircuitState::Open),
        "breaker should open at the failure threshold"
    );

    info!("🛡️ Phase 2: the open circuit fails fast without calling upstream");
    let calls_before = fetcher.calls.load(Ordering::SeqCst);
    let report = runtime.run_cycle().await;
    let rejected = &report.outcomes[0];
    assert_eq!(rejected.status, RunStatus::Error);
    assert_eq!(rejected.attempts, 0, "rejected run must not attempt the fetch");
    assert_eq!(rejected.errors.len(), 1);
    assert_eq!(rejected.errors[0].class, ErrorClass::BreakerOpen);
    assert_eq!(
        fetcher.calls.load(Ordering::SeqCst),
        calls_before,
        "upstream must not be contacted while the circuit is open"
    );

    info!("🕐 Phase 3: waiting out the open window");
    tokio::time::sleep(Duration::from_millis(1200)).await;

    info!("🟡 Phase 4: trial calls succeed and close the circuit");
    let report = runtime.run_cycle().await;
    assert_eq!(report.outcomes[0].status, RunStatus::Success);
    assert_eq!(
        runtime.breakers().state("fr-bulk"),
        Some(CircuitState::HalfOpen),
        "one trial success of two keeps the breaker half-open"
    );

    let report = runtime.run_cycle().await;
    assert_eq!(report.outcomes[0].status, RunStatus::Success);
    assert_eq!(report.outcomes[0].record_count, 42);
    assert_eq!(
        runtime.breakers().state("fr-bulk"),
        Some(CircuitState::Closed),
        "second trial success should close the breaker"
    );

    info!("📜 Phase 5: the transition journal tells the whole story");
    let transitions = runtime
        .breakers()
        .transitions_within(Duration::from_secs(600));
    let shape: Vec<(CircuitState, CircuitState)> =
        transitions.iter().map(|t| (t.from, t.to)).collect();
    assert_eq!(
        shape,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );

    info!("🏥 Phase 6: recovery is visible in health and correlation");
    let score = runtime.health_score();
    assert!(
        score.score > 0.0,
        "recovered platform should score above zero, got {}",
        score.score
    );
    assert!(
        runtime.run_log().last_success_at("fr-bulk").is_some(),
        "run log should remember the recovery"
    );

    let incidents = runtime.correlate_failures();
    let volume = incidents
        .iter()
        .find(|i| i.sources == vec!["fr-bulk".to_string()])
        .expect("failures should correlate into an incident");
    assert_eq!(volume.tier, IncidentTier::Isolated);
    assert_eq!(
        volume.event_count, 5,
        "only executed failures count; the fail-fast rejection does not"
    );

    info!("🎉 Breaker lifecycle test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_force_open_overrides_and_force_close_recovers(
) -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();

    info!("🧪 Testing operational force-open and force-close overrides");

    let runtime = VigilRuntime::from_config(lifecycle_config())?;
    runtime.register_fetcher(
        "fr-bulk",
        Arc::new(ScriptedFetcher {
            fail_first: 0,
            records: 10,
            calls: AtomicU32::new(0),
        }),
    )?;

    // A healthy cycle first, so the breaker exists and is closed
    let report = runtime.run_cycle().await;
    assert_eq!(report.success_count(), 1);

    info!("🚨 Forcing the breaker open for maintenance");
    runtime
        .breakers()
        .force_open("fr-bulk", "upstream maintenance window");
    let report = runtime.run_cycle().await;
    assert_eq!(report.outcomes[0].status, RunStatus::Error);
    assert_eq!(report.outcomes[0].attempts, 0);

    info!("✅ Forcing it closed restores service immediately");
    runtime
        .breakers()
        .force_close("fr-bulk", "maintenance finished");
    let report = runtime.run_cycle().await;
    assert_eq!(report.outcomes[0].status, RunStatus::Success);

    info!("🎉 Operational override test completed successfully!");
    Ok(())
}
