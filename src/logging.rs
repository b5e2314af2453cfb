//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both console and files
//! for debugging resilience decisions across concurrent poll cycles.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::{events, RunStatus};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        // Create log directory if it doesn't exist
        let log_dir = PathBuf::from("log");
        if !log_dir.exists() {
            if let Err(e) = fs::create_dir_all(&log_dir) {
                eprintln!("vigil-core: failed to create log directory: {e}");
                return;
            }
        }

        // Log file name carries environment, PID, and timestamp so concurrent
        // processes never interleave into one file
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_path = log_dir.join(&log_filename);

        let file_appender = tracing_appender::rolling::never(&log_dir, log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true)
                    .with_filter(EnvFilter::new(log_level.clone())),
            )
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(log_level)),
            );

        // Use try_init to avoid panic if a global subscriber already exists
        // (embedding applications often install their own)
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_path.display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        // The guard must live for the process lifetime or the file layer
        // stops flushing
        std::mem::forget(guard);
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("VIGIL_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for a completed or rejected run
pub fn log_run_outcome(
    event: &str,
    source: &str,
    status: RunStatus,
    attempts: u32,
    record_count: u64,
    duration_ms: i64,
    detail: Option<&str>,
) {
    tracing::info!(
        event = %event,
        source = %source,
        status = %status,
        attempts = attempts,
        record_count = record_count,
        duration_ms = duration_ms,
        detail = detail,
        timestamp = %Utc::now().to_rfc3339(),
        "📡 RUN_OUTCOME"
    );
}

/// Log structured data for circuit breaker transitions.
///
/// A breaker opening is operationally urgent and logs at warn; recovery
/// transitions log at info.
pub fn log_breaker_transition(
    event: &str,
    source: &str,
    from_state: &str,
    to_state: &str,
    detail: Option<&str>,
) {
    if event == events::BREAKER_OPENED {
        tracing::warn!(
            event = %event,
            source = %source,
            from_state = %from_state,
            to_state = %to_state,
            detail = detail,
            timestamp = %Utc::now().to_rfc3339(),
            "🛡️ BREAKER_TRANSITION"
        );
    } else {
        tracing::info!(
            event = %event,
            source = %source,
            from_state = %from_state,
            to_state = %to_state,
            detail = detail,
            timestamp = %Utc::now().to_rfc3339(),
            "🛡️ BREAKER_TRANSITION"
        );
    }
}

/// Log structured data for detected failure incidents
pub fn log_incident(
    trigger: &str,
    tier: &str,
    sources: &[String],
    event_count: usize,
    provider_hint: Option<&str>,
) {
    tracing::warn!(
        event = events::INCIDENT_DETECTED,
        trigger = %trigger,
        tier = %tier,
        sources = ?sources,
        source_count = sources.len(),
        event_count = event_count,
        provider_hint = provider_hint,
        timestamp = %Utc::now().to_rfc3339(),
        "🚨 INCIDENT"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("VIGIL_ENV", "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var("VIGIL_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }
}
