//! # Run Lifecycle Orchestrator
//!
//! Wraps every source fetch in the full resilience envelope, in a fixed
//! order that the rest of the platform can rely on:
//!
//! 1. Catalog check: unapproved sources are rejected outright
//! 2. Breaker admission: open circuits fail fast without an attempt
//! 3. Rate limit: a drained token bucket defers the attempt, and the
//!    breaker admission is handed back so no trial slot leaks
//! 4. Timeout-bounded execution with classified retry and backoff
//! 5. Outcome recording, canary evaluation, and failure correlation
//!
//! The orchestrator never throws: every run, including rejected ones,
//! produces a [`RunOutcome`] that lands in the run log. Rejections are
//! recorded with zero attempts so downstream consumers can tell "we were
//! refused" apart from "we tried and failed".

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::SourceCatalog;
use crate::constants::{events, RunStatus};
use crate::error::{ErrorClass, Result, VigilError};
use crate::health::canary::{CanaryCheck, CanaryRegistry};
use crate::health::correlator::FailureCorrelator;
use crate::logging;
use crate::pipeline::outcome::{ErrorDescriptor, FetchReport, RunOutcome};
use crate::pipeline::run_log::RunLog;
use crate::resilience::{
    Admission, BreakerRegistry, RateLimiter, RetryExecutor, RetryPolicy,
};

/// Drives one source operation through admission, execution, and
/// post-run bookkeeping
pub struct LifecycleOrchestrator {
    catalog: Arc<SourceCatalog>,
    breakers: Arc<BreakerRegistry>,
    limiter: Arc<RateLimiter>,
    run_log: Arc<dyn RunLog>,
    canaries: Arc<CanaryRegistry>,
    correlator: Arc<FailureCorrelator>,
    retry: RetryExecutor,
    policy: RetryPolicy,
    default_timeout: Duration,
}

impl LifecycleOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<SourceCatalog>,
        breakers: Arc<BreakerRegistry>,
        limiter: Arc<RateLimiter>,
        run_log: Arc<dyn RunLog>,
        canaries: Arc<CanaryRegistry>,
        correlator: Arc<FailureCorrelator>,
        policy: RetryPolicy,
        default_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            breakers,
            limiter,
            run_log,
            canaries,
            correlator,
            retry: RetryExecutor::new(),
            policy,
            default_timeout,
        }
    }

    /// Execute `operation` for `source` under the full lifecycle.
    ///
    /// The closure is invoked once per admitted attempt; a run whose
    /// every attempt was refused admission reports zero attempts.
    pub async fn wrap<F, Fut>(&self, source: &str, operation: F) -> RunOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<FetchReport>>,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        debug!(
            event = events::RUN_STARTED,
            run_id = %run_id,
            source = %source,
            "Run starting"
        );

        let Some(entry) = self.catalog.get(source) else {
            let error = VigilError::configuration(
                "catalog",
                format!("source '{source}' is not in the approved catalog"),
            );
            let outcome = RunOutcome {
                run_id,
                source: source.to_string(),
                started_at,
                finished_at: Utc::now(),
                status: RunStatus::Error,
                record_count: 0,
                attempts: 0,
                errors: vec![ErrorDescriptor::from_error(0, &error)],
            };
            return self.finalize(outcome);
        };

        let run_timeout = entry.run_timeout().unwrap_or(self.default_timeout);
        let operation_attempts = AtomicU32::new(0);
        let operation = &operation;
        let attempts_ref = &operation_attempts;

        let report = self
            .retry
            .run(source, &self.policy, |_attempt| async move {
                match self.breakers.admit(source) {
                    Admission::Rejected { reason } => {
                        return Err(VigilError::breaker_open(source, reason));
                    }
                    Admission::Allowed => {}
                }

                if !self.limiter.try_acquire_one(source) {
                    // The admission was never used; hand the trial slot back
                    self.breakers.release(source);
                    return Err(VigilError::rate_limited(
                        source,
                        "token bucket empty; deferring attempt",
                    ));
                }

                attempts_ref.fetch_add(1, Ordering::Relaxed);
                match tokio::time::timeout(run_timeout, operation()).await {
                    Ok(Ok(fetch)) => {
                        self.breakers.record_success(source);
                        Ok(fetch)
                    }
                    Ok(Err(error)) => {
                        self.breakers.record_failure(source);
                        Err(error)
                    }
                    Err(_elapsed) => {
                        self.breakers.record_failure(source);
                        Err(VigilError::timeout(source, run_timeout))
                    }
                }
            })
            .await;

        let finished_at = Utc::now();
        let attempts = operation_attempts.load(Ordering::Relaxed);
        let errors: Vec<ErrorDescriptor> = report
            .failures
            .iter()
            .map(|failure| {
                // Breaker rejections never reached the operation, so they
                // carry no attempt position
                let position = if failure.error.class() == ErrorClass::BreakerOpen {
                    0
                } else {
                    failure.attempt
                };
                ErrorDescriptor::from_error(position, &failure.error)
            })
            .collect();

        let (status, record_count) = match &report.result {
            Ok(fetch) => {
                if fetch.record_count > 0 {
                    (RunStatus::Success, fetch.record_count)
                } else {
                    (RunStatus::NoData, 0)
                }
            }
            Err(_) => (RunStatus::Error, 0),
        };

        let outcome = RunOutcome {
            run_id,
            source: source.to_string(),
            started_at,
            finished_at,
            status,
            record_count,
            attempts,
            errors,
        };
        self.finalize(outcome)
    }

    /// Record the outcome, evaluate canaries, feed the correlator, and
    /// emit the structured run log line
    fn finalize(&self, outcome: RunOutcome) -> RunOutcome {
        let previous = self.run_log.last_outcome(&outcome.source);

        if let Err(error) = self.run_log.record(&outcome) {
            logging::log_error(
                "run_log",
                "record",
                &error.to_string(),
                Some(&outcome.source),
            );
        }

        if !outcome.is_error() {
            let check = CanaryCheck {
                outcome: &outcome,
                previous: previous.as_ref(),
            };
            self.canaries.run_for(&check);
        } else {
            for descriptor in &outcome.errors {
                if descriptor.class.is_execution_failure() {
                    self.correlator
                        .record_failure_at(&outcome.source, descriptor.class, descriptor.at);
                }
            }
        }

        let event = if outcome.status == RunStatus::Error && outcome.attempts == 0 {
            events::RUN_REJECTED
        } else {
            events::RUN_COMPLETED
        };
        let detail = outcome.primary_error().map(|e| e.message.clone());
        logging::log_run_outcome(
            event,
            &outcome.source,
            outcome.status,
            outcome.attempts,
            outcome.record_count,
            outcome.duration().num_milliseconds(),
            detail.as_deref(),
        );

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrelationSettings, SourceEntry};
    use crate::health::canary::{CanaryAssertion, CanaryVerdict};
    use crate::pipeline::run_log::InMemoryRunLog;
    use crate::resilience::{BreakerConfig, CircuitState, RateLimitConfig};
    use std::sync::atomic::{AtomicBool, AtomicU32};

    fn source(name: &str) -> SourceEntry {
        SourceEntry {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            multiplier: 2.0,
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        }
    }

    struct Fixture {
        catalog: Arc<SourceCatalog>,
        breakers: Arc<BreakerRegistry>,
        limiter: Arc<RateLimiter>,
        run_log: Arc<InMemoryRunLog>,
        canaries: Arc<CanaryRegistry>,
        correlator: Arc<FailureCorrelator>,
    }

    impl Fixture {
        fn new(entries: Vec<SourceEntry>) -> Self {
            Self::with_configs(entries, BreakerConfig::default(), RateLimitConfig::default())
        }

        fn with_configs(
            entries: Vec<SourceEntry>,
            breaker: BreakerConfig,
            limit: RateLimitConfig,
        ) -> Self {
            let catalog = Arc::new(SourceCatalog::from_entries(entries).unwrap());
            let breakers = Arc::new(BreakerRegistry::from_catalog(breaker, &catalog));
            let limiter = Arc::new(RateLimiter::from_catalog(limit, &catalog));
            let correlator = Arc::new(FailureCorrelator::new(
                catalog.clone(),
                breakers.clone(),
                CorrelationSettings::default(),
            ));
            Self {
                catalog,
                breakers,
                limiter,
                run_log: Arc::new(InMemoryRunLog::new(64)),
                canaries: Arc::new(CanaryRegistry::new()),
                correlator,
            }
        }

        fn orchestrator(&self) -> LifecycleOrchestrator {
            self.orchestrator_with_timeout(Duration::from_millis(250))
        }

        fn orchestrator_with_timeout(&self, timeout: Duration) -> LifecycleOrchestrator {
            LifecycleOrchestrator::new(
                self.catalog.clone(),
                self.breakers.clone(),
                self.limiter.clone(),
                self.run_log.clone(),
                self.canaries.clone(),
                self.correlator.clone(),
                fast_policy(),
                timeout,
            )
        }
    }

    #[tokio::test]
    async fn test_successful_run_records_success() {
        let fixture = Fixture::new(vec![source("feed")]);
        let outcome = fixture
            .orchestrator()
            .wrap("feed", || async { Ok(FetchReport::records(7)) })
            .await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.record_count, 7);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.errors.is_empty());
        assert!(fixture.run_log.last_outcome("feed").is_some());
        assert_eq!(fixture.breakers.state("feed"), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_empty_fetch_is_no_data_not_error() {
        let fixture = Fixture::new(vec![source("feed")]);
        let outcome = fixture
            .orchestrator()
            .wrap("feed", || async { Ok(FetchReport::empty()) })
            .await;

        assert_eq!(outcome.status, RunStatus::NoData);
        assert_eq!(outcome.record_count, 0);
        assert!(!outcome.is_error());
        assert!(
            fixture.run_log.last_success_at("feed").is_some(),
            "no-data runs still count as successful contact"
        );
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let fixture = Fixture::new(vec![source("feed")]);
        let calls = AtomicU32::new(0);
        let outcome = fixture
            .orchestrator()
            .wrap("feed", || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(VigilError::transient("feed", "connection reset"))
                    } else {
                        Ok(FetchReport::records(3))
                    }
                }
            })
            .await;

        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].class, ErrorClass::Transient);
        assert_eq!(outcome.errors[0].attempt, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let fixture = Fixture::new(vec![source("feed")]);
        let outcome = fixture
            .orchestrator()
            .wrap("feed", || async {
                Err::<FetchReport, _>(VigilError::permanent("feed", "schema mismatch"))
            })
            .await;

        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].class, ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_timeout_is_classified_and_retried() {
        let fixture = Fixture::new(vec![source("feed")]);
        let outcome = fixture
            .orchestrator_with_timeout(Duration::from_millis(40))
            .wrap("feed", || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(FetchReport::records(1))
            })
            .await;

        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.attempts, 3, "timeouts are retryable");
        assert!(outcome.has_error_class(ErrorClass::Timeout));
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_invoking_operation() {
        let fixture = Fixture::with_configs(
            vec![source("feed")],
            BreakerConfig {
                failure_threshold: 2,
                ..Default::default()
            },
            RateLimitConfig::default(),
        );
        fixture.breakers.record_failure("feed");
        fixture.breakers.record_failure("feed");
        assert_eq!(fixture.breakers.state("feed"), Some(CircuitState::Open));

        let invoked = AtomicBool::new(false);
        let outcome = fixture
            .orchestrator()
            .wrap("feed", || {
                invoked.store(true, Ordering::SeqCst);
                async { Ok(FetchReport::records(1)) }
            })
            .await;

        assert!(!invoked.load(Ordering::SeqCst));
        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].class, ErrorClass::BreakerOpen);
        assert_eq!(outcome.errors[0].attempt, 0);
        // Fail-fast rejections are not new evidence against the source
        assert_eq!(fixture.correlator.event_count(), 0);
    }

    #[tokio::test]
    async fn test_uncataloged_source_is_rejected_outright() {
        let fixture = Fixture::new(vec![source("known")]);
        let outcome = fixture
            .orchestrator()
            .wrap("ghost", || async { Ok(FetchReport::records(1)) })
            .await;

        assert_eq!(outcome.status, RunStatus::Error);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.errors[0].class, ErrorClass::Configuration);
        // No breaker was ever consulted for the rejected name
        assert_eq!(fixture.breakers.len(), 0);
        // The rejection is still on the record
        assert!(fixture.run_log.last_outcome("ghost").is_some());
    }

    #[tokio::test]
    async fn test_drained_bucket_defers_without_breaker_damage() {
        let fixture = Fixture::with_configs(
            vec![source("feed")],
            BreakerConfig::default(),
            RateLimitConfig {
                capacity: 1.0,
                refill_per_second: 0.0001,
            },
        );
        let orchestrator = fixture.orchestrator();

        let first = orchestrator
            .wrap("feed", || async { Ok(FetchReport::records(1)) })
            .await;
        assert_eq!(first.status, RunStatus::Success);

        let second = orchestrator
            .wrap("feed", || async { Ok(FetchReport::records(1)) })
            .await;
        assert_eq!(second.status, RunStatus::Error);
        assert_eq!(second.attempts, 0, "operation never ran without a token");
        assert_eq!(
            second.primary_error().map(|e| e.class),
            Some(ErrorClass::RateLimited)
        );

        let status = fixture.breakers.status("feed").expect("breaker exists");
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(
            status.consecutive_failures, 0,
            "deferrals must not accumulate breaker failures"
        );
    }

    #[tokio::test]
    async fn test_execution_failures_feed_the_correlator() {
        let fixture = Fixture::new(vec![source("feed")]);
        fixture
            .orchestrator()
            .wrap("feed", || async {
                Err::<FetchReport, _>(VigilError::permanent("feed", "bad payload"))
            })
            .await;

        assert_eq!(fixture.correlator.event_count(), 1);
    }

    #[tokio::test]
    async fn test_canaries_see_current_and_previous_outcome() {
        let fixture = Fixture::new(vec![source("feed")]);
        let saw_previous = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = saw_previous.clone();
        fixture.canaries.register(
            "feed",
            CanaryAssertion::new("previous_probe", move |check| {
                sink.lock().push(check.previous.is_some());
                (CanaryVerdict::Pass, "observed".to_string())
            }),
        );

        let orchestrator = fixture.orchestrator();
        orchestrator
            .wrap("feed", || async { Ok(FetchReport::records(5)) })
            .await;
        orchestrator
            .wrap("feed", || async { Ok(FetchReport::records(6)) })
            .await;

        let observations = saw_previous.lock();
        assert_eq!(&*observations, &[false, true]);
    }

    #[tokio::test]
    async fn test_canaries_skipped_for_failed_runs() {
        let fixture = Fixture::new(vec![source("feed")]);
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();
        fixture.canaries.register(
            "feed",
            CanaryAssertion::new("never_probe", move |_| {
                flag.store(true, Ordering::SeqCst);
                (CanaryVerdict::Pass, "ok".to_string())
            }),
        );

        fixture
            .orchestrator()
            .wrap("feed", || async {
                Err::<FetchReport, _>(VigilError::permanent("feed", "broken"))
            })
            .await;

        assert!(!invoked.load(Ordering::SeqCst));
    }
}
