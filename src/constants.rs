//! # System Constants and Defaults
//!
//! Core constants, enums, and default operational boundaries of the Vigil
//! resilience runtime.
//!
//! Defaults here are the single source of truth: configuration structs and
//! serde `default` attributes all read from [`defaults`] so a value changed
//! here changes everywhere.

use serde::{Deserialize, Serialize};

/// Lifecycle events emitted on the structured log stream.
///
/// Dotted names group by subsystem so log pipelines can filter on prefix
/// (`breaker.*`, `run.*`, `incident.*`).
pub mod events {
    // Circuit breaker transitions
    pub const BREAKER_OPENED: &str = "breaker.opened";
    pub const BREAKER_HALF_OPEN: &str = "breaker.half_open";
    pub const BREAKER_CLOSED: &str = "breaker.closed";

    // Run lifecycle events
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_REJECTED: &str = "run.rejected";

    // Health and correlation events
    pub const HEALTH_SCORED: &str = "health.scored";
    pub const INCIDENT_DETECTED: &str = "incident.detected";
    pub const CANARY_FAILED: &str = "canary.failed";
    pub const CANARY_WARNED: &str = "canary.warned";

    // State persistence events
    pub const STATE_PERSISTED: &str = "state.persisted";
    pub const STATE_RESTORED: &str = "state.restored";
}

/// Terminal status of a monitored run.
///
/// `NoData` is not an error: the fetch succeeded and returned zero records.
/// Whether that is suspicious is the canary layer's call, not the run's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NoData,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::NoData => "no_data",
            RunStatus::Error => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunStatus::Error)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse system health classification derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBand {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthBand {
    /// Band boundaries: below 50 is unhealthy, below 90 is degraded.
    pub fn from_score(score: f64) -> Self {
        if score < 50.0 {
            HealthBand::Unhealthy
        } else if score < 90.0 {
            HealthBand::Degraded
        } else {
            HealthBand::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthBand::Healthy => "healthy",
            HealthBand::Degraded => "degraded",
            HealthBand::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// System-wide default values
pub mod defaults {
    /// Version compatibility marker
    pub const VIGIL_CORE_VERSION: &str = "0.1.0";

    // Circuit breaker defaults
    /// Consecutive failures before a closed breaker opens
    pub const BREAKER_FAILURE_THRESHOLD: u32 = 5;
    /// Consecutive trial successes before a half-open breaker closes
    pub const BREAKER_SUCCESS_THRESHOLD: u32 = 2;
    /// Seconds an open breaker stays open before admitting trial calls
    pub const BREAKER_OPEN_DURATION_SECONDS: u64 = 300;
    /// Concurrent trial calls admitted while half-open
    pub const BREAKER_MAX_TRIAL_CALLS: u32 = 1;
    /// Transition journal entries retained per breaker
    pub const BREAKER_JOURNAL_CAPACITY: usize = 64;

    // Token bucket defaults
    /// Burst capacity of a per-source token bucket
    pub const BUCKET_CAPACITY: f64 = 10.0;
    /// Steady-state refill rate in tokens per second
    pub const BUCKET_REFILL_PER_SECOND: f64 = 1.0;

    // Retry defaults
    /// Attempts per run, including the first
    pub const RETRY_MAX_ATTEMPTS: u32 = 3;
    /// Base backoff delay in milliseconds
    pub const RETRY_BASE_DELAY_MS: u64 = 500;
    /// Exponential backoff multiplier
    pub const RETRY_MULTIPLIER: f64 = 2.0;
    /// Backoff ceiling in milliseconds
    pub const RETRY_MAX_DELAY_MS: u64 = 60_000;
    /// Symmetric jitter fraction applied to each delay
    pub const RETRY_JITTER: f64 = 0.1;

    // Scheduler defaults
    /// Sources polled concurrently in one cycle
    pub const MAX_CONCURRENT_SOURCES: usize = 10;
    /// Per-attempt operation deadline in seconds
    pub const RUN_TIMEOUT_SECONDS: u64 = 120;
    /// Run outcomes retained by the in-memory run log
    pub const RUN_LOG_CAPACITY: usize = 2048;

    // Health scoring defaults
    pub const HEALTH_FRESHNESS_WEIGHT: f64 = 0.30;
    pub const HEALTH_ERROR_RATE_WEIGHT: f64 = 0.30;
    pub const HEALTH_BREAKER_WEIGHT: f64 = 0.25;
    pub const HEALTH_COVERAGE_WEIGHT: f64 = 0.15;
    /// Scores below this floor gate the composite
    pub const HEALTH_FLOOR_SCORE: f64 = 30.0;
    /// Composite cap multiplier applied to the worst dimension when gated
    pub const HEALTH_FLOOR_MULTIPLIER: f64 = 1.5;
    /// Error-rate observation window in minutes
    pub const HEALTH_ERROR_WINDOW_MINUTES: u64 = 60;
    /// Error fraction below which no penalty applies
    pub const HEALTH_ERROR_PENALTY_START: f64 = 0.05;
    /// Multiple of the expected interval at which freshness reaches zero
    pub const HEALTH_STALE_MULTIPLE: f64 = 3.0;
    /// Coverage observation window in minutes
    pub const HEALTH_COVERAGE_WINDOW_MINUTES: u64 = 1440;

    // Failure correlation defaults
    /// Correlation window in minutes
    pub const CORRELATION_WINDOW_MINUTES: u64 = 30;
    /// Fraction of the catalog that marks an infrastructure-tier incident
    pub const CORRELATION_INFRASTRUCTURE_FRACTION: f64 = 0.10;
    /// Minimum distinct sources for the infrastructure tier
    pub const CORRELATION_INFRASTRUCTURE_MIN: usize = 3;
    /// Distinct breaker trips within the window that mark a cascade
    pub const CORRELATION_CASCADE_MIN_TRIPS: usize = 2;
    /// Failure events retained in the correlation buffer
    pub const CORRELATION_EVENT_CAPACITY: usize = 4096;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trip() {
        let json = serde_json::to_string(&RunStatus::NoData).unwrap();
        assert_eq!(json, "\"no_data\"");
        let status: RunStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, RunStatus::NoData);
    }

    #[test]
    fn test_health_band_boundaries() {
        assert_eq!(HealthBand::from_score(0.0), HealthBand::Unhealthy);
        assert_eq!(HealthBand::from_score(49.9), HealthBand::Unhealthy);
        assert_eq!(HealthBand::from_score(50.0), HealthBand::Degraded);
        assert_eq!(HealthBand::from_score(89.9), HealthBand::Degraded);
        assert_eq!(HealthBand::from_score(90.0), HealthBand::Healthy);
        assert_eq!(HealthBand::from_score(100.0), HealthBand::Healthy);
    }
}
