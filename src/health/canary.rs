//! # Canary Assertions
//!
//! Advisory checks that run after a successful fetch and look for silent
//! data problems the resilience layer cannot see: a feed that returns
//! HTTP 200 with an empty body, a record volume far outside its usual
//! band, a run that took implausibly long. A canary verdict never gates
//! execution; it only produces structured warnings for operators.
//!
//! Assertions are registered per source. Critical sources without any
//! canary coverage are surfaced at startup.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::SourceCatalog;
use crate::constants::events;
use crate::pipeline::outcome::RunOutcome;

/// Advisory verdict for one assertion against one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryVerdict {
    Pass,
    Warn,
    Fail,
}

impl CanaryVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanaryVerdict::Pass => "pass",
            CanaryVerdict::Warn => "warn",
            CanaryVerdict::Fail => "fail",
        }
    }
}

impl std::fmt::Display for CanaryVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one assertion evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryResult {
    pub source: String,
    pub assertion: String,
    pub verdict: CanaryVerdict,
    pub message: String,
}

/// What an assertion gets to look at: the run under judgment and, when
/// available, the previous recorded run for the same source
pub struct CanaryCheck<'a> {
    pub outcome: &'a RunOutcome,
    pub previous: Option<&'a RunOutcome>,
}

type AssertionFn = dyn Fn(&CanaryCheck<'_>) -> (CanaryVerdict, String) + Send + Sync;

/// A named advisory assertion
pub struct CanaryAssertion {
    name: String,
    check: Box<AssertionFn>,
}

impl CanaryAssertion {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&CanaryCheck<'_>) -> (CanaryVerdict, String) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, check: &CanaryCheck<'_>) -> (CanaryVerdict, String) {
        (self.check)(check)
    }

    /// Flags empty weekday runs from sources that publish on business
    /// days. One empty weekday is a warning; two in a row is a failure,
    /// because a feed that silently went dark looks exactly like this.
    /// Weekend runs and failed runs are not judged.
    pub fn weekday_records_expected() -> Self {
        use chrono::{Datelike, Weekday};
        Self::new("weekday_records_expected", |check| {
            if check.outcome.is_error() {
                return (
                    CanaryVerdict::Pass,
                    "not evaluated for failed runs".to_string(),
                );
            }
            let weekday = check.outcome.finished_at.weekday();
            if matches!(weekday, Weekday::Sat | Weekday::Sun) {
                return (CanaryVerdict::Pass, "weekend run".to_string());
            }
            if check.outcome.record_count > 0 {
                return (
                    CanaryVerdict::Pass,
                    format!("{} records on a weekday", check.outcome.record_count),
                );
            }
            let previous_also_empty = check
                .previous
                .map(|prev| !prev.is_error() && prev.record_count == 0)
                .unwrap_or(false);
            if previous_also_empty {
                (
                    CanaryVerdict::Fail,
                    "second consecutive empty weekday run".to_string(),
                )
            } else {
                (CanaryVerdict::Warn, "no records on a weekday".to_string())
            }
        })
    }

    /// Checks the record count against a plausible band. Too few records
    /// means missing data; too many suggests duplication upstream.
    pub fn record_count_within(min: u64, max: u64) -> Self {
        Self::new(format!("record_count_within_{min}_{max}"), move |check| {
            if check.outcome.is_error() {
                return (
                    CanaryVerdict::Pass,
                    "not evaluated for failed runs".to_string(),
                );
            }
            let count = check.outcome.record_count;
            if count < min {
                (
                    CanaryVerdict::Fail,
                    format!("{count} records below expected minimum {min}"),
                )
            } else if count > max {
                (
                    CanaryVerdict::Warn,
                    format!("{count} records above expected maximum {max}"),
                )
            } else {
                (CanaryVerdict::Pass, format!("{count} records within band"))
            }
        })
    }

    /// Checks that the run completed inside a plausible wall-clock span.
    /// A negative span means the clocks disagree and the timestamps
    /// cannot be trusted.
    pub fn duration_within(max: std::time::Duration) -> Self {
        Self::new(
            format!("duration_within_{}s", max.as_secs()),
            move |check| {
                let span = check.outcome.duration();
                if span < chrono::Duration::zero() {
                    return (
                        CanaryVerdict::Fail,
                        "run finished before it started".to_string(),
                    );
                }
                let span = span.to_std().unwrap_or_default();
                if span > max {
                    (
                        CanaryVerdict::Warn,
                        format!(
                            "run took {}ms, expected at most {}ms",
                            span.as_millis(),
                            max.as_millis()
                        ),
                    )
                } else {
                    (CanaryVerdict::Pass, format!("run took {}ms", span.as_millis()))
                }
            },
        )
    }
}

impl std::fmt::Debug for CanaryAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanaryAssertion")
            .field("name", &self.name)
            .finish()
    }
}

/// Per-source registry of canary assertions
#[derive(Default)]
pub struct CanaryRegistry {
    assertions: RwLock<HashMap<String, Vec<Arc<CanaryAssertion>>>>,
}

impl CanaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assertion for a source
    pub fn register(&self, source: impl Into<String>, assertion: CanaryAssertion) {
        let source = source.into();
        debug!(
            source = %source,
            assertion = %assertion.name(),
            "Registered canary assertion"
        );
        self.assertions
            .write()
            .entry(source)
            .or_default()
            .push(Arc::new(assertion));
    }

    /// Whether a source has at least one assertion registered
    pub fn has_coverage(&self, source: &str) -> bool {
        self.assertions
            .read()
            .get(source)
            .map(|list| !list.is_empty())
            .unwrap_or(false)
    }

    /// Evaluate every assertion registered for the run's source.
    ///
    /// Results are advisory. Failures and warnings are logged here so
    /// callers do not have to remember to.
    pub fn run_for(&self, check: &CanaryCheck<'_>) -> Vec<CanaryResult> {
        let source = check.outcome.source.as_str();
        let assertions: Vec<Arc<CanaryAssertion>> = self
            .assertions
            .read()
            .get(source)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(assertions.len());
        for assertion in assertions {
            let (verdict, message) = assertion.evaluate(check);
            match verdict {
                CanaryVerdict::Fail => warn!(
                    event = events::CANARY_FAILED,
                    source = %source,
                    assertion = %assertion.name(),
                    message = %message,
                    "🐤 Canary assertion failed"
                ),
                CanaryVerdict::Warn => info!(
                    event = events::CANARY_WARNED,
                    source = %source,
                    assertion = %assertion.name(),
                    message = %message,
                    "🐤 Canary assertion warned"
                ),
                CanaryVerdict::Pass => {}
            }
            results.push(CanaryResult {
                source: source.to_string(),
                assertion: assertion.name().to_string(),
                verdict,
                message,
            });
        }
        results
    }

    /// Critical sources with no canary coverage. Logged as warnings and
    /// returned so startup code can surface them.
    pub fn validate_coverage(&self, catalog: &SourceCatalog) -> Vec<String> {
        let uncovered: Vec<String> = catalog
            .critical_names()
            .into_iter()
            .filter(|name| !self.has_coverage(name))
            .map(String::from)
            .collect();
        for name in &uncovered {
            warn!(
                source = %name,
                "🐤 Critical source has no canary assertions registered"
            );
        }
        uncovered
    }
}
