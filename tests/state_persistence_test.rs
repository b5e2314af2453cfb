//! Integration test for resilience state persistence: breaker states and
//! bucket levels written by one process generation must keep protecting
//! sources in the next one.

use std::time::Duration;
use tracing::{info, Level};

use vigil_core::config::{RateLimitSettings, SourceEntry, VigilConfig};
use vigil_core::resilience::CircuitState;
use vigil_core::runtime::VigilRuntime;

fn persistent_config(state_file: &std::path::Path) -> VigilConfig {
    let mut config = VigilConfig::default();
    config.persistence.state_file = Some(state_file.to_string_lossy().into_owned());
    config.sources = vec![
        SourceEntry {
            name: "fr-bulk".to_string(),
            ..Default::default()
        },
        SourceEntry {
            name: "ofac-sdn".to_string(),
            rate_limit: Some(RateLimitSettings {
                capacity: 5.0,
                refill_per_second: 0.01,
            }),
            ..Default::default()
        },
    ];
    config
}

#[tokio::test]
async fn test_resilience_state_survives_restart() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();

    info!("🧪 Testing resilience state persistence across a restart");

    let dir = tempfile::tempdir()?;
    let state_file = dir.path().join("vigil-state.json");

    info!("🔧 Generation 1: trip a breaker and drain a bucket, then persist");
    {
        let runtime = VigilRuntime::from_config(persistent_config(&state_file))?;
        for _ in 0..5 {
            runtime.breakers().record_failure("fr-bulk");
        }
        assert_eq!(
            runtime.breakers().state("fr-bulk"),
            Some(CircuitState::Open)
        );
        assert!(runtime.limiter().try_acquire("ofac-sdn", 4.0));
        runtime.persist_state()?;
    }

    let raw = std::fs::read_to_string(&state_file)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    assert!(
        parsed["breakers"].is_array() && parsed["buckets"].is_array(),
        "state file should hold breaker and bucket snapshots"
    );

    info!("💾 Generation 2: a fresh runtime restores the same protections");
    let runtime = VigilRuntime::from_config(persistent_config(&state_file))?;
    assert!(
        runtime.breakers().is_empty(),
        "nothing exists before restore"
    );
    assert!(runtime.restore_state()?, "a saved snapshot should be found");

    let status = runtime
        .breakers()
        .status("fr-bulk")
        .expect("restored breaker should exist");
    assert_eq!(status.state, CircuitState::Open);
    assert_eq!(status.consecutive_failures, 5);
    let remaining = status
        .open_remaining
        .expect("an open breaker reports its remaining window");
    assert!(
        remaining > Duration::from_secs(250),
        "the open window resumes rather than restarting: {remaining:?}"
    );

    let available = runtime.limiter().available("ofac-sdn");
    assert!(
        available < 2.0,
        "drained bucket must not come back full, got {available}"
    );

    info!("🎉 State persistence test completed successfully!");
    Ok(())
}

#[tokio::test]
async fn test_corrupt_state_file_starts_fresh() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();

    info!("🧪 Testing that a corrupt state file never blocks startup");

    let dir = tempfile::tempdir()?;
    let state_file = dir.path().join("vigil-state.json");
    std::fs::write(&state_file, "{ this is not json")?;

    let runtime = VigilRuntime::from_config(persistent_config(&state_file))?;
    assert!(
        !runtime.restore_state()?,
        "corrupt snapshots are logged and discarded, not fatal"
    );
    assert!(runtime.breakers().is_empty(), "state starts fresh");

    info!("🎉 Corrupt state file handled gracefully!");
    Ok(())
}

#[tokio::test]
async fn test_persistence_disabled_is_a_noop() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();

    let mut config = VigilConfig::default();
    config.sources.push(SourceEntry {
        name: "fr-bulk".to_string(),
        ..Default::default()
    });

    let runtime = VigilRuntime::from_config(config)?;
    runtime.persist_state()?;
    assert!(!runtime.restore_state()?, "no store means nothing to restore");

    Ok(())
}
