//! # Composite Health Scorer
//!
//! Aggregates four observability dimensions into one 0-100 platform score:
//! data freshness, run error rate, circuit breaker posture, and source
//! coverage. The composite is deliberately pessimistic in two ways that
//! matter for a fail-closed platform:
//!
//! - A dimension with nothing to observe is **unconfigured**, scores 0,
//!   and drops out of the weighting. Absence of data never reads as
//!   health.
//! - When any configured dimension falls below the floor, the composite
//!   is capped relative to that worst dimension, so one collapsed
//!   dimension cannot hide behind three good ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::catalog::SourceCatalog;
use crate::config::HealthSettings;
use crate::constants::{events, HealthBand};
use crate::pipeline::outcome::RunOutcome;
use crate::pipeline::run_log::RunLog;
use crate::resilience::{BreakerRegistry, CircuitState};

/// The four scored dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Freshness,
    ErrorRate,
    Breakers,
    Coverage,
}

impl DimensionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Freshness => "freshness",
            DimensionKind::ErrorRate => "error_rate",
            DimensionKind::Breakers => "breakers",
            DimensionKind::Coverage => "coverage",
        }
    }
}

impl std::fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scored dimension.
///
/// `weight` is the effective weight after renormalization over configured
/// dimensions; an unconfigured dimension always carries weight 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDimension {
    pub kind: DimensionKind,
    pub score: f64,
    pub weight: f64,
    pub configured: bool,
    pub detail: String,
}

/// The composite score with full per-dimension breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeHealthScore {
    /// Final 0-100 score after floor gating
    pub score: f64,
    pub band: HealthBand,
    /// Weighted sum before the floor gate
    pub weighted_sum: f64,
    /// Whether the floor gate capped the composite
    pub floor_gated: bool,
    pub dimensions: Vec<HealthDimension>,
    pub computed_at: DateTime<Utc>,
}

/// Computes the composite platform health score on demand.
///
/// Scoring is synchronous and read-only: it queries the run log, the
/// breaker registry, and the catalog, and mutates nothing.
pub struct HealthScorer {
    catalog: Arc<SourceCatalog>,
    breakers: Arc<BreakerRegistry>,
    run_log: Arc<dyn RunLog>,
    settings: HealthSettings,
}

impl HealthScorer {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        breakers: Arc<BreakerRegistry>,
        run_log: Arc<dyn RunLog>,
        settings: HealthSettings,
    ) -> Self {
        Self {
            catalog,
            breakers,
            run_log,
            settings,
        }
    }

    /// Compute the composite score from current state
    pub fn score(&self) -> CompositeHealthScore {
        let now = Utc::now();
        let error_window_runs = self.run_log.recent(self.settings.error_window());
        let coverage_window_runs = self.run_log.recent(self.settings.coverage_window());

        let mut dimensions = vec![
            self.freshness_dimension(now),
            self.error_rate_dimension(&error_window_runs),
            self.breaker_dimension(),
            self.coverage_dimension(&coverage_window_runs),
        ];

        let configured_weight: f64 = dimensions
            .iter()
            .filter(|d| d.configured)
            .map(|d| d.weight)
            .sum();

        let (weighted_sum, floor_gated, final_score) = if configured_weight > 0.0 {
            // Renormalize so configured dimensions share the full weight
            for dim in &mut dimensions {
                if dim.configured {
                    dim.weight /= configured_weight;
                } else {
                    dim.weight = 0.0;
                }
            }

            let weighted_sum: f64 = dimensions
                .iter()
                .filter(|d| d.configured)
                .map(|d| d.weight * d.score)
                .sum();

            let worst = dimensions
                .iter()
                .filter(|d| d.configured)
                .map(|d| d.score)
                .fold(f64::INFINITY, f64::min);

            if worst < self.settings.floor_score {
                let capped = weighted_sum.min(worst * self.settings.floor_multiplier);
                (weighted_sum, capped < weighted_sum, capped)
            } else {
                (weighted_sum, false, weighted_sum)
            }
        } else {
            // Nothing observable at all: the platform cannot claim health
            for dim in &mut dimensions {
                dim.weight = 0.0;
            }
            (0.0, false, 0.0)
        };

        let final_score = final_score.clamp(0.0, 100.0);
        let band = HealthBand::from_score(final_score);

        debug!(
            event = events::HEALTH_SCORED,
            score = final_score,
            band = %band,
            weighted_sum = weighted_sum,
            floor_gated = floor_gated,
            "🏥 Composite health scored"
        );

        CompositeHealthScore {
            score: final_score,
            band,
            weighted_sum,
            floor_gated,
            dimensions,
            computed_at: now,
        }
    }

    /// Freshness: how recently each interval-bearing source succeeded.
    ///
    /// Per-source score is 100 while the last success is within the
    /// expected interval, then falls linearly to 0 at `stale_multiple`
    /// times the interval. A source that never succeeded scores 0.
    fn freshness_dimension(&self, now: DateTime<Utc>) -> HealthDimension {
        let tracked: Vec<(&str, Duration)> = self
            .catalog
            .iter()
            .filter_map(|entry| {
                entry
                    .expected_interval()
                    .map(|interval| (entry.name.as_str(), interval))
            })
            .collect();

        if tracked.is_empty() {
            return HealthDimension {
                kind: DimensionKind::Freshness,
                score: 0.0,
                weight: self.settings.freshness_weight,
                configured: false,
                detail: "no sources with expected intervals".to_string(),
            };
        }

        let stale = self.settings.stale_multiple;
        let mut total = 0.0;
        let mut fresh = 0usize;
        for (name, interval) in &tracked {
            let per_source = match self.run_log.last_success_at(name) {
                None => 0.0,
                Some(at) => {
                    let elapsed = now
                        .signed_duration_since(at)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    let ratio = elapsed.as_secs_f64() / interval.as_secs_f64().max(f64::EPSILON);
                    if ratio <= 1.0 {
                        100.0
                    } else if ratio >= stale {
                        0.0
                    } else {
                        100.0 * (stale - ratio) / (stale - 1.0)
                    }
                }
            };
            if per_source >= 100.0 {
                fresh += 1;
            }
            total += per_source;
        }

        HealthDimension {
            kind: DimensionKind::Freshness,
            score: total / tracked.len() as f64,
            weight: self.settings.freshness_weight,
            configured: true,
            detail: format!(
                "{fresh}/{} sources within expected interval",
                tracked.len()
            ),
        }
    }

    /// Error rate: per-source ERROR fraction over the windowed runs,
    /// averaged across the sources that ran, then mapped through a
    /// quadratic ramp. Every source that ran weighs equally in the
    /// average no matter how often it ran. Below `error_penalty_start`
    /// there is no penalty; past it the penalty grows smoothly toward a
    /// zero score at a 100% error rate.
    fn error_rate_dimension(&self, recent: &[RunOutcome]) -> HealthDimension {
        if recent.is_empty() {
            return HealthDimension {
                kind: DimensionKind::ErrorRate,
                score: 0.0,
                weight: self.settings.error_rate_weight,
                configured: false,
                detail: "no runs in window".to_string(),
            };
        }

        let mut per_source: HashMap<&str, (usize, usize)> = HashMap::new();
        for outcome in recent {
            let counts = per_source.entry(outcome.source.as_str()).or_default();
            counts.0 += 1;
            if outcome.is_error() {
                counts.1 += 1;
            }
        }
        let fraction = per_source
            .values()
            .map(|(runs, errors)| *errors as f64 / *runs as f64)
            .sum::<f64>()
            / per_source.len() as f64;

        let start = self.settings.error_penalty_start;
        let penalty = if fraction <= start {
            0.0
        } else {
            (((fraction - start) / (1.0 - start)).powi(2)).min(1.0)
        };

        let errors = recent.iter().filter(|o| o.is_error()).count();
        HealthDimension {
            kind: DimensionKind::ErrorRate,
            score: 100.0 * (1.0 - penalty),
            weight: self.settings.error_rate_weight,
            configured: true,
            detail: format!(
                "{errors}/{} runs errored across {} sources",
                recent.len(),
                per_source.len()
            ),
        }
    }

    /// Breaker posture: closed breakers count fully, half-open ones half,
    /// open ones not at all.
    fn breaker_dimension(&self) -> HealthDimension {
        let statuses = self.breakers.status_all();
        if statuses.is_empty() {
            return HealthDimension {
                kind: DimensionKind::Breakers,
                score: 0.0,
                weight: self.settings.breaker_weight,
                configured: false,
                detail: "no breakers created yet".to_string(),
            };
        }

        let open = statuses
            .iter()
            .filter(|s| s.state == CircuitState::Open)
            .count();
        let half_open = statuses
            .iter()
            .filter(|s| s.state == CircuitState::HalfOpen)
            .count();
        let closed = statuses.len() - open - half_open;
        let healthy_fraction =
            (closed as f64 + 0.5 * half_open as f64) / statuses.len() as f64;

        HealthDimension {
            kind: DimensionKind::Breakers,
            score: 100.0 * healthy_fraction,
            weight: self.settings.breaker_weight,
            configured: true,
            detail: format!("{open} open, {half_open} half-open of {}", statuses.len()),
        }
    }

    /// Coverage: fraction of cataloged sources that reported any outcome
    /// within the coverage window. Silent sources are missing evidence,
    /// not passing ones.
    fn coverage_dimension(&self, recent: &[RunOutcome]) -> HealthDimension {
        if self.catalog.is_empty() {
            return HealthDimension {
                kind: DimensionKind::Coverage,
                score: 0.0,
                weight: self.settings.coverage_weight,
                configured: false,
                detail: "catalog is empty".to_string(),
            };
        }

        let seen: HashSet<&str> = recent.iter().map(|o| o.source.as_str()).collect();
        let covered = self
            .catalog
            .names()
            .filter(|name| seen.contains(name))
            .count();

        HealthDimension {
            kind: DimensionKind::Coverage,
            score: 100.0 * covered as f64 / self.catalog.len() as f64,
            weight: self.settings.coverage_weight,
            configured: true,
            detail: format!(
                "{covered}/{} sources reported within window",
                self.catalog.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceEntry;
    use crate::constants::RunStatus;
    use crate::pipeline::outcome::RunOutcome;
    use crate::pipeline::run_log::InMemoryRunLog;
    use crate::resilience::BreakerConfig;
    use uuid::Uuid;

    fn entry(name: &str, interval_minutes: Option<u64>) -> SourceEntry {
        SourceEntry {
            name: name.to_string(),
            expected_interval_minutes: interval_minutes,
            ..Default::default()
        }
    }

    fn outcome(source: &str, status: RunStatus, finished_mins_ago: i64) -> RunOutcome {
        let finished = Utc::now() - chrono::Duration::minutes(finished_mins_ago);
        RunOutcome {
            run_id: Uuid::new_v4(),
            source: source.to_string(),
            started_at: finished - chrono::Duration::seconds(5),
            finished_at: finished,
            status,
            record_count: if status == RunStatus::Success { 10 } else { 0 },
            attempts: 1,
            errors: Vec::new(),
        }
    }

    struct Fixture {
        catalog: Arc<SourceCatalog>,
        breakers: Arc<BreakerRegistry>,
        run_log: Arc<InMemoryRunLog>,
    }

    impl Fixture {
        fn new(entries: Vec<SourceEntry>) -> Self {
            Self {
                catalog: Arc::new(SourceCatalog::from_entries(entries).unwrap()),
                breakers: Arc::new(BreakerRegistry::new(BreakerConfig::default())),
                run_log: Arc::new(InMemoryRunLog::new(256)),
            }
        }

        fn scorer(&self) -> HealthScorer {
            HealthScorer::new(
                self.catalog.clone(),
                self.breakers.clone(),
                self.run_log.clone(),
                HealthSettings::default(),
            )
        }
    }

    #[test]
    fn test_everything_healthy_scores_100() {
        let fixture = Fixture::new(vec![entry("a", Some(60)), entry("b", Some(60))]);
        for source in ["a", "b"] {
            fixture
                .run_log
                .record(&outcome(source, RunStatus::Success, 10))
                .unwrap();
            fixture.breakers.record_success(source);
        }

        let composite = fixture.scorer().score();
        assert!(
            (composite.score - 100.0).abs() < 1e-9,
            "expected 100, got {}",
            composite.score
        );
        assert_eq!(composite.band, HealthBand::Healthy);
        assert!(!composite.floor_gated);
        assert!(composite.dimensions.iter().all(|d| d.configured));
        // Renormalized weights sum to 1
        let weight_sum: f64 = composite.dimensions.iter().map(|d| d.weight).sum();
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_system_scores_zero() {
        let fixture = Fixture::new(vec![]);
        let composite = fixture.scorer().score();
        assert_eq!(composite.score, 0.0);
        assert_eq!(composite.band, HealthBand::Unhealthy);
        assert!(composite.dimensions.iter().all(|d| !d.configured));
        assert!(composite.dimensions.iter().all(|d| d.weight == 0.0));
    }

    #[test]
    fn test_unconfigured_dimension_drops_out_of_weighting() {
        // No expected intervals: freshness is unconfigured
        let fixture = Fixture::new(vec![entry("a", None)]);
        fixture
            .run_log
            .record(&outcome("a", RunStatus::Success, 5))
            .unwrap();
        fixture.breakers.record_success("a");

        let composite = fixture.scorer().score();
        let freshness = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::Freshness)
            .unwrap();
        assert!(!freshness.configured);
        assert_eq!(freshness.weight, 0.0);
        // The other three dimensions are perfect, so the composite is too
        assert!((composite.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_floor_gate_caps_composite() {
        // One source, breaker open: breaker dimension is 0 while the rest
        // are perfect
        let fixture = Fixture::new(vec![entry("a", Some(60))]);
        fixture
            .run_log
            .record(&outcome("a", RunStatus::Success, 5))
            .unwrap();
        for _ in 0..5 {
            fixture.breakers.record_failure("a");
        }
        assert_eq!(fixture.breakers.state("a"), Some(CircuitState::Open));

        let composite = fixture.scorer().score();
        // worst = 0, so the cap is 0 * 1.5 = 0 regardless of the rest
        assert_eq!(composite.score, 0.0);
        assert!(composite.floor_gated);
        assert!(composite.weighted_sum > 0.0);
        assert_eq!(composite.band, HealthBand::Unhealthy);
    }

    #[test]
    fn test_stale_source_degrades_freshness() {
        let fixture = Fixture::new(vec![entry("a", Some(60))]);
        // Last success two hours ago against a one-hour interval
        fixture
            .run_log
            .record(&outcome("a", RunStatus::Success, 120))
            .unwrap();
        fixture.breakers.record_success("a");

        let composite = fixture.scorer().score();
        let freshness = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::Freshness)
            .unwrap();
        // ratio 2.0 with stale_multiple 3.0: halfway down the ramp
        assert!(freshness.score > 40.0 && freshness.score < 60.0);
    }

    #[test]
    fn test_never_succeeded_source_scores_zero_freshness() {
        let fixture = Fixture::new(vec![entry("a", Some(60))]);
        fixture
            .run_log
            .record(&outcome("a", RunStatus::Error, 5))
            .unwrap();
        fixture.breakers.record_failure("a");

        let composite = fixture.scorer().score();
        let freshness = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::Freshness)
            .unwrap();
        assert!(freshness.configured);
        assert_eq!(freshness.score, 0.0);
    }

    #[test]
    fn test_error_rate_ramp() {
        let fixture = Fixture::new(vec![entry("a", None)]);

        // 1 error in 25 runs: 4%, inside the grace band
        for _ in 0..24 {
            fixture
                .run_log
                .record(&outcome("a", RunStatus::Success, 5))
                .unwrap();
        }
        fixture
            .run_log
            .record(&outcome("a", RunStatus::Error, 5))
            .unwrap();

        let composite = fixture.scorer().score();
        let error_rate = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::ErrorRate)
            .unwrap();
        assert!((error_rate.score - 100.0).abs() < 1e-9);

        // Push to 50% errors: penalty bites but is not total
        for _ in 0..23 {
            fixture
                .run_log
                .record(&outcome("a", RunStatus::Error, 5))
                .unwrap();
        }
        let composite = fixture.scorer().score();
        let error_rate = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::ErrorRate)
            .unwrap();
        assert!(error_rate.score < 100.0);
        assert!(error_rate.score > 0.0);
    }

    #[test]
    fn test_error_rate_weighs_sources_equally() {
        let fixture = Fixture::new(vec![entry("a", None), entry("b", None)]);
        // a: 18 clean runs; b: 2 runs, both errors
        for _ in 0..18 {
            fixture
                .run_log
                .record(&outcome("a", RunStatus::Success, 5))
                .unwrap();
        }
        for _ in 0..2 {
            fixture
                .run_log
                .record(&outcome("b", RunStatus::Error, 5))
                .unwrap();
        }

        let composite = fixture.scorer().score();
        let error_rate = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::ErrorRate)
            .unwrap();
        // Averaged fractions give (0/18 + 2/2) / 2 = 0.5, not the pooled 2/20
        let expected = 100.0 * (1.0 - ((0.5 - 0.05) / 0.95_f64).powi(2));
        assert!(
            (error_rate.score - expected).abs() < 1e-9,
            "expected {expected}, got {}",
            error_rate.score
        );
        assert!(error_rate.detail.contains("2 sources"));
    }

    #[test]
    fn test_coverage_counts_reporting_sources() {
        let fixture = Fixture::new(vec![entry("a", None), entry("b", None), entry("c", None), entry("d", None)]);
        fixture
            .run_log
            .record(&outcome("a", RunStatus::Success, 5))
            .unwrap();
        fixture
            .run_log
            .record(&outcome("b", RunStatus::Error, 5))
            .unwrap();
        fixture.breakers.record_success("a");

        let composite = fixture.scorer().score();
        let coverage = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::Coverage)
            .unwrap();
        // Both outcomes count toward coverage regardless of status
        assert!((coverage.score - 50.0).abs() < 1e-9);
        assert!(coverage.detail.contains("2/4"));
    }

    #[test]
    fn test_open_breaker_zeroes_its_share() {
        let fixture = Fixture::new(vec![entry("a", None), entry("b", None)]);
        fixture.breakers.record_success("a");
        for _ in 0..5 {
            fixture.breakers.record_failure("b");
        }

        let composite = fixture.scorer().score();
        let breakers = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::Breakers)
            .unwrap();
        // One closed, one open
        assert!((breakers.score - 50.0).abs() < 1e-9);
        assert!(breakers.detail.contains("1 open"));
    }

    #[test]
    fn test_half_open_breaker_counts_half() {
        let fixture = Fixture::new(vec![entry("a", None), entry("b", None)]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            success_threshold: 2,
            open_duration: std::time::Duration::from_millis(40),
            max_trial_calls: 1,
        }));
        breakers.record_success("a");
        breakers.record_failure("b");
        breakers.record_failure("b");
        std::thread::sleep(std::time::Duration::from_millis(60));
        // The first admission after the open window starts the trial
        assert!(breakers.admit("b").is_allowed());
        assert_eq!(breakers.state("b"), Some(CircuitState::HalfOpen));

        let scorer = HealthScorer::new(
            fixture.catalog.clone(),
            breakers.clone(),
            fixture.run_log.clone(),
            HealthSettings::default(),
        );
        let composite = scorer.score();
        let dim = composite
            .dimensions
            .iter()
            .find(|d| d.kind == DimensionKind::Breakers)
            .unwrap();
        // One closed at 1.0 plus one half-open at 0.5, over two breakers
        assert!((dim.score - 75.0).abs() < 1e-9);
        breakers.release("b");
    }
}
