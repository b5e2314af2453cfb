//! # Vigil Configuration System
//!
//! YAML-based configuration management for the resilience runtime. It
//! eliminates hardcoded fallbacks and scattered environment variables in
//! favor of explicit, validated configuration loading.
//!
//! ## Architecture
//!
//! - **Single Source of Truth**: All tunables come from YAML files
//! - **Environment Awareness**: Supports development/test/production overrides
//! - **Explicit Validation**: No silent fallbacks or half-loaded configs
//! - **Fail Closed**: Invalid configuration aborts startup rather than
//!   running with guessed values
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! // Access configuration values
//! let timeout = manager.config().scheduler.run_timeout();
//! let threshold = manager.config().resilience.breaker.failure_threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring vigil-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VigilConfig {
    /// Poll scheduling and run execution settings
    pub scheduler: SchedulerSettings,

    /// Circuit breaker, rate limiter, and retry settings
    pub resilience: ResilienceSettings,

    /// Composite health scoring settings
    pub health: HealthSettings,

    /// Failure correlation settings
    pub correlation: CorrelationSettings,

    /// Resilience state persistence settings
    pub persistence: PersistenceSettings,

    /// The approved source catalog
    pub sources: Vec<SourceEntry>,
}

/// Poll scheduling and run execution settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Sources polled concurrently within one cycle
    pub max_concurrent_sources: usize,

    /// Per-attempt operation deadline in seconds
    pub run_timeout_seconds: u64,

    /// Run outcomes retained by the in-memory run log
    pub run_log_capacity: usize,
}

impl SchedulerSettings {
    /// Get run timeout as Duration
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_sources: defaults::MAX_CONCURRENT_SOURCES,
            run_timeout_seconds: defaults::RUN_TIMEOUT_SECONDS,
            run_log_capacity: defaults::RUN_LOG_CAPACITY,
        }
    }
}

/// Resilience settings grouping breaker, rate limit, and retry defaults.
/// Per-source overrides live on the [`SourceEntry`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub breaker: BreakerSettings,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
}

/// Circuit breaker settings from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures before a closed breaker opens
    pub failure_threshold: u32,

    /// Consecutive trial successes before a half-open breaker closes
    pub success_threshold: u32,

    /// Seconds an open breaker waits before admitting trial calls
    pub open_duration_seconds: u64,

    /// Concurrent trial calls admitted while half-open
    pub max_trial_calls: u32,
}

impl BreakerSettings {
    /// Get open duration as Duration
    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_duration_seconds)
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            success_threshold: defaults::BREAKER_SUCCESS_THRESHOLD,
            open_duration_seconds: defaults::BREAKER_OPEN_DURATION_SECONDS,
            max_trial_calls: defaults::BREAKER_MAX_TRIAL_CALLS,
        }
    }
}

/// Token bucket settings from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Burst capacity of the bucket
    pub capacity: f64,

    /// Steady-state refill rate in tokens per second
    pub refill_per_second: f64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: defaults::BUCKET_CAPACITY,
            refill_per_second: defaults::BUCKET_REFILL_PER_SECOND,
        }
    }
}

/// Retry and backoff settings from YAML
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts per run, including the first
    pub max_attempts: u32,

    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,

    /// Exponential backoff multiplier
    pub multiplier: f64,

    /// Backoff ceiling in milliseconds
    pub max_delay_ms: u64,

    /// Symmetric jitter fraction applied to each delay
    pub jitter: f64,
}

impl RetrySettings {
    /// Get base delay as Duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Get maximum delay as Duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            multiplier: defaults::RETRY_MULTIPLIER,
            max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            jitter: defaults::RETRY_JITTER,
        }
    }
}

/// Composite health scoring settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSettings {
    pub freshness_weight: f64,
    pub error_rate_weight: f64,
    pub breaker_weight: f64,
    pub coverage_weight: f64,

    /// Dimension scores below this floor gate the composite
    pub floor_score: f64,

    /// Composite cap multiplier applied to the worst dimension when gated
    pub floor_multiplier: f64,

    /// Error-rate observation window in minutes
    pub error_window_minutes: u64,

    /// Error fraction below which no penalty applies
    pub error_penalty_start: f64,

    /// Multiple of the expected interval at which freshness reaches zero
    pub stale_multiple: f64,

    /// Coverage observation window in minutes
    pub coverage_window_minutes: u64,
}

impl HealthSettings {
    /// Get error-rate window as Duration
    pub fn error_window(&self) -> Duration {
        Duration::from_secs(self.error_window_minutes * 60)
    }

    /// Get coverage window as Duration
    pub fn coverage_window(&self) -> Duration {
        Duration::from_secs(self.coverage_window_minutes * 60)
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            freshness_weight: defaults::HEALTH_FRESHNESS_WEIGHT,
            error_rate_weight: defaults::HEALTH_ERROR_RATE_WEIGHT,
            breaker_weight: defaults::HEALTH_BREAKER_WEIGHT,
            coverage_weight: defaults::HEALTH_COVERAGE_WEIGHT,
            floor_score: defaults::HEALTH_FLOOR_SCORE,
            floor_multiplier: defaults::HEALTH_FLOOR_MULTIPLIER,
            error_window_minutes: defaults::HEALTH_ERROR_WINDOW_MINUTES,
            error_penalty_start: defaults::HEALTH_ERROR_PENALTY_START,
            stale_multiple: defaults::HEALTH_STALE_MULTIPLE,
            coverage_window_minutes: defaults::HEALTH_COVERAGE_WINDOW_MINUTES,
        }
    }
}

/// Failure correlation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Correlation window in minutes
    pub window_minutes: u64,

    /// Fraction of the catalog that marks an infrastructure-tier incident
    pub infrastructure_fraction: f64,

    /// Minimum distinct sources for the infrastructure tier
    pub infrastructure_min: usize,

    /// Fixed distinct-source threshold overriding the scale-relative one
    pub fixed_source_threshold: Option<usize>,

    /// Distinct breaker trips within the window that mark a cascade
    pub cascade_min_trips: usize,

    /// Failure events retained in the correlation buffer
    pub event_capacity: usize,
}

impl CorrelationSettings {
    /// Get correlation window as Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            window_minutes: defaults::CORRELATION_WINDOW_MINUTES,
            infrastructure_fraction: defaults::CORRELATION_INFRASTRUCTURE_FRACTION,
            infrastructure_min: defaults::CORRELATION_INFRASTRUCTURE_MIN,
            fixed_source_threshold: None,
            cascade_min_trips: defaults::CORRELATION_CASCADE_MIN_TRIPS,
            event_capacity: defaults::CORRELATION_EVENT_CAPACITY,
        }
    }
}

/// Resilience state persistence settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Path to the JSON state file; None disables file-backed persistence
    pub state_file: Option<String>,
}

/// One approved source in the monitoring catalog.
///
/// Only `name` is required. Everything else inherits the global defaults
/// from [`ResilienceSettings`] and [`SchedulerSettings`] unless overridden
/// here.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceEntry {
    /// Unique source name, e.g. "fr-bulk" or "companies-house"
    pub name: String,

    /// Upstream provider shared with other sources, e.g. a hosting platform
    pub provider: Option<String>,

    /// Critical sources must carry canary coverage
    pub critical: bool,

    /// Expected minutes between successful runs; None disables freshness
    /// scoring for this source
    pub expected_interval_minutes: Option<u64>,

    /// Per-source run timeout override in seconds
    pub run_timeout_seconds: Option<u64>,

    /// Per-source rate limit override
    pub rate_limit: Option<RateLimitSettings>,

    /// Per-source breaker override
    pub breaker: Option<BreakerSettings>,
}

impl SourceEntry {
    /// Get expected interval as Duration, when configured
    pub fn expected_interval(&self) -> Option<Duration> {
        self.expected_interval_minutes
            .map(|m| Duration::from_secs(m * 60))
    }

    /// Get run timeout override as Duration, when configured
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }
}

impl VigilConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        // Scheduler validation
        if self.scheduler.max_concurrent_sources == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.max_concurrent_sources",
                "0",
                "concurrency must be greater than 0",
            ));
        }

        if self.scheduler.run_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "scheduler.run_timeout_seconds",
                "0",
                "run timeout must be greater than 0",
            ));
        }

        // Resilience validation
        validate_breaker(&self.resilience.breaker, "resilience.breaker")?;
        validate_rate_limit(&self.resilience.rate_limit, "resilience.rate_limit")?;

        let retry = &self.resilience.retry;
        if retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.max_attempts",
                "0",
                "at least one attempt is required",
            ));
        }
        if retry.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.multiplier",
                retry.multiplier.to_string(),
                "multiplier below 1.0 would shrink delays",
            ));
        }
        if !(0.0..1.0).contains(&retry.jitter) {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.jitter",
                retry.jitter.to_string(),
                "jitter must be in [0.0, 1.0)",
            ));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.max_delay_ms",
                retry.max_delay_ms.to_string(),
                "delay ceiling below base delay",
            ));
        }

        // Health validation
        let h = &self.health;
        let weights = [
            ("health.freshness_weight", h.freshness_weight),
            ("health.error_rate_weight", h.error_rate_weight),
            ("health.breaker_weight", h.breaker_weight),
            ("health.coverage_weight", h.coverage_weight),
        ];
        for (field, w) in weights {
            if w <= 0.0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    w.to_string(),
                    "weights must be positive",
                ));
            }
        }
        let weight_sum =
            h.freshness_weight + h.error_rate_weight + h.breaker_weight + h.coverage_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigurationError::invalid_value(
                "health weights",
                weight_sum.to_string(),
                "dimension weights must sum to 1.0",
            ));
        }
        if !(0.0..=100.0).contains(&h.floor_score) {
            return Err(ConfigurationError::invalid_value(
                "health.floor_score",
                h.floor_score.to_string(),
                "floor must be in [0, 100]",
            ));
        }
        if h.floor_multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "health.floor_multiplier",
                h.floor_multiplier.to_string(),
                "floor multiplier must be at least 1.0",
            ));
        }
        if h.stale_multiple <= 1.0 {
            return Err(ConfigurationError::invalid_value(
                "health.stale_multiple",
                h.stale_multiple.to_string(),
                "stale multiple must exceed 1.0",
            ));
        }
        if !(0.0..1.0).contains(&h.error_penalty_start) {
            return Err(ConfigurationError::invalid_value(
                "health.error_penalty_start",
                h.error_penalty_start.to_string(),
                "penalty start must be in [0.0, 1.0)",
            ));
        }

        // Correlation validation
        let c = &self.correlation;
        if c.window_minutes == 0 {
            return Err(ConfigurationError::invalid_value(
                "correlation.window_minutes",
                "0",
                "window must be at least one minute",
            ));
        }
        if !(0.0..=1.0).contains(&c.infrastructure_fraction) || c.infrastructure_fraction == 0.0 {
            return Err(ConfigurationError::invalid_value(
                "correlation.infrastructure_fraction",
                c.infrastructure_fraction.to_string(),
                "fraction must be in (0.0, 1.0]",
            ));
        }
        if c.cascade_min_trips < 2 {
            return Err(ConfigurationError::invalid_value(
                "correlation.cascade_min_trips",
                c.cascade_min_trips.to_string(),
                "a cascade needs at least two distinct trips",
            ));
        }
        if let Some(fixed) = c.fixed_source_threshold {
            if fixed == 0 {
                return Err(ConfigurationError::invalid_value(
                    "correlation.fixed_source_threshold",
                    "0",
                    "fixed threshold must be greater than 0",
                ));
            }
        }

        // Catalog validation
        let mut seen = HashSet::new();
        for entry in &self.sources {
            if entry.name.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "sources[].name",
                    "every catalog entry needs a non-empty name",
                ));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigurationError::duplicate_source(&entry.name));
            }
            if let Some(interval) = entry.expected_interval_minutes {
                if interval == 0 {
                    return Err(ConfigurationError::invalid_value(
                        format!("sources[{}].expected_interval_minutes", entry.name),
                        "0",
                        "expected interval must be at least one minute",
                    ));
                }
            }
            if let Some(timeout) = entry.run_timeout_seconds {
                if timeout == 0 {
                    return Err(ConfigurationError::invalid_value(
                        format!("sources[{}].run_timeout_seconds", entry.name),
                        "0",
                        "run timeout must be greater than 0",
                    ));
                }
            }
            if let Some(rl) = &entry.rate_limit {
                validate_rate_limit(rl, &format!("sources[{}].rate_limit", entry.name))?;
            }
            if let Some(br) = &entry.breaker {
                validate_breaker(br, &format!("sources[{}].breaker", entry.name))?;
            }
        }

        Ok(())
    }
}

fn validate_breaker(settings: &BreakerSettings, field: &str) -> Result<(), ConfigurationError> {
    if settings.failure_threshold == 0 {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.failure_threshold"),
            "0",
            "failure threshold must be greater than 0",
        ));
    }
    if settings.success_threshold == 0 {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.success_threshold"),
            "0",
            "success threshold must be greater than 0",
        ));
    }
    if settings.open_duration_seconds == 0 {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.open_duration_seconds"),
            "0",
            "open duration must be greater than 0",
        ));
    }
    if settings.max_trial_calls == 0 {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.max_trial_calls"),
            "0",
            "at least one trial call must be admitted",
        ));
    }
    Ok(())
}

fn validate_rate_limit(settings: &RateLimitSettings, field: &str) -> Result<(), ConfigurationError> {
    if settings.capacity <= 0.0 || !settings.capacity.is_finite() {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.capacity"),
            settings.capacity.to_string(),
            "capacity must be a positive finite number",
        ));
    }
    if settings.refill_per_second <= 0.0 || !settings.refill_per_second.is_finite() {
        return Err(ConfigurationError::invalid_value(
            format!("{field}.refill_per_second"),
            settings.refill_per_second.to_string(),
            "refill rate must be a positive finite number",
        ));
    }
    Ok(())
}
