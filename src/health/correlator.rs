//! # Time-Windowed Failure Correlator
//!
//! Groups execution failures across sources inside a sliding time window
//! and classifies the blast radius. One source failing is local trouble;
//! many sources failing together usually means shared infrastructure
//! (an upstream provider, a network path, a credential store) rather than
//! many independent incidents.
//!
//! Two detectors run over the same window:
//!
//! - **Failure volume**: distinct sources with recorded execution
//!   failures, classified by how much of the catalog is involved.
//! - **Breaker cascade**: distinct sources whose breakers tripped open,
//!   which catches correlated degradation even when the raw failure
//!   events have already aged out.
//!
//! Correlation is observational: it emits incidents for operators and
//! never feeds back into admission decisions.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::SourceCatalog;
use crate::config::CorrelationSettings;
use crate::error::ErrorClass;
use crate::logging;
use crate::resilience::{BreakerRegistry, CircuitState};

/// One execution failure ingested for correlation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureEvent {
    pub source: String,
    pub class: ErrorClass,
    pub at: DateTime<Utc>,
}

/// What tripped the incident detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentTrigger {
    FailureVolume,
    BreakerCascade,
}

impl IncidentTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentTrigger::FailureVolume => "failure_volume",
            IncidentTrigger::BreakerCascade => "breaker_cascade",
        }
    }
}

impl std::fmt::Display for IncidentTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Blast radius classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentTier {
    Isolated,
    SourceCluster,
    Infrastructure,
}

impl IncidentTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentTier::Isolated => "isolated",
            IncidentTier::SourceCluster => "source_cluster",
            IncidentTier::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for IncidentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A correlated group of failures within one window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedIncident {
    pub trigger: IncidentTrigger,
    pub tier: IncidentTier,
    /// Distinct affected sources, sorted
    pub sources: Vec<String>,
    /// Events (or open transitions) backing this incident
    pub event_count: usize,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Set when every affected source declares the same provider
    pub provider_hint: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// Ingests execution failures and correlates them on demand.
///
/// The event buffer is bounded twice over: events older than the
/// configured window are pruned on ingest, and the buffer never exceeds
/// `event_capacity` entries even during a failure storm.
pub struct FailureCorrelator {
    catalog: Arc<SourceCatalog>,
    breakers: Arc<BreakerRegistry>,
    settings: CorrelationSettings,
    events: Mutex<VecDeque<FailureEvent>>,
}

impl FailureCorrelator {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        breakers: Arc<BreakerRegistry>,
        settings: CorrelationSettings,
    ) -> Self {
        Self {
            catalog,
            breakers,
            settings,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Record an execution failure observed now
    pub fn record_failure(&self, source: &str, class: ErrorClass) {
        self.record_failure_at(source, class, Utc::now());
    }

    /// Record an execution failure with an explicit timestamp.
    ///
    /// Useful when backfilling from a persisted run log after restart, so
    /// correlation does not treat old failures as fresh ones.
    pub fn record_failure_at(&self, source: &str, class: ErrorClass, at: DateTime<Utc>) {
        let mut events = self.events.lock();
        events.push_back(FailureEvent {
            source: source.to_string(),
            class,
            at,
        });
        self.prune(&mut events, Utc::now());
    }

    /// Number of buffered failure events
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Correlate over the configured window
    pub fn correlate(&self) -> Vec<CorrelatedIncident> {
        self.correlate_within(self.settings.window())
    }

    /// Correlate failures and breaker trips inside `window`
    pub fn correlate_within(&self, window: Duration) -> Vec<CorrelatedIncident> {
        let now = Utc::now();
        let mut incidents = Vec::new();

        if let Some(incident) = self.volume_incident(now, window) {
            incidents.push(incident);
        }
        if let Some(incident) = self.cascade_incident(now, window) {
            incidents.push(incident);
        }

        for incident in &incidents {
            if incident.tier > IncidentTier::Isolated {
                logging::log_incident(
                    incident.trigger.as_str(),
                    incident.tier.as_str(),
                    &incident.sources,
                    incident.event_count,
                    incident.provider_hint.as_deref(),
                );
            }
        }

        incidents
    }

    /// Sources whose failures fall inside the window, grouped into one
    /// incident when any exist
    fn volume_incident(&self, now: DateTime<Utc>, window: Duration) -> Option<CorrelatedIncident> {
        let events = self.events.lock();
        let in_window: Vec<&FailureEvent> = events
            .iter()
            .filter(|e| Self::within(now, e.at, window))
            .collect();
        if in_window.is_empty() {
            return None;
        }

        let sources: BTreeSet<&str> = in_window.iter().map(|e| e.source.as_str()).collect();
        let window_start = in_window.iter().map(|e| e.at).min().unwrap_or(now);
        let window_end = in_window.iter().map(|e| e.at).max().unwrap_or(now);
        let sources: Vec<String> = sources.into_iter().map(String::from).collect();

        Some(CorrelatedIncident {
            trigger: IncidentTrigger::FailureVolume,
            tier: self.classify(sources.len()),
            provider_hint: self
                .catalog
                .shared_provider(sources.iter().map(String::as_str))
                .map(String::from),
            event_count: in_window.len(),
            sources,
            window_start,
            window_end,
            detected_at: now,
        })
    }

    /// Breakers that tripped open inside the window. Fires only when the
    /// distinct tripped sources reach `cascade_min_trips`.
    fn cascade_incident(&self, now: DateTime<Utc>, window: Duration) -> Option<CorrelatedIncident> {
        let trips: Vec<_> = self
            .breakers
            .transitions_within(window)
            .into_iter()
            .filter(|t| t.to == CircuitState::Open)
            .collect();
        let sources: BTreeSet<&str> = trips.iter().map(|t| t.source.as_str()).collect();
        if sources.len() < self.settings.cascade_min_trips {
            return None;
        }

        let window_start = trips.iter().map(|t| t.at).min().unwrap_or(now);
        let window_end = trips.iter().map(|t| t.at).max().unwrap_or(now);
        let sources: Vec<String> = sources.into_iter().map(String::from).collect();

        Some(CorrelatedIncident {
            trigger: IncidentTrigger::BreakerCascade,
            tier: self.classify(sources.len()),
            provider_hint: self
                .catalog
                .shared_provider(sources.iter().map(String::as_str))
                .map(String::from),
            event_count: trips.len(),
            sources,
            window_start,
            window_end,
            detected_at: now,
        })
    }

    /// Distinct-source count needed to call an incident infrastructure-wide.
    ///
    /// Defaults to a fraction of the catalog with an absolute minimum, so
    /// small deployments do not declare infrastructure incidents off two
    /// noisy sources.
    fn infrastructure_threshold(&self) -> usize {
        if let Some(fixed) = self.settings.fixed_source_threshold {
            return fixed.max(1);
        }
        let fractional =
            (self.settings.infrastructure_fraction * self.catalog.len() as f64).ceil() as usize;
        fractional.max(self.settings.infrastructure_min)
    }

    fn classify(&self, distinct_sources: usize) -> IncidentTier {
        if distinct_sources >= self.infrastructure_threshold() {
            IncidentTier::Infrastructure
        } else if distinct_sources >= 2 {
            IncidentTier::SourceCluster
        } else {
            IncidentTier::Isolated
        }
    }

    fn within(now: DateTime<Utc>, at: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(at)
            .to_std()
            .map(|age| age <= window)
            .unwrap_or(true)
    }

    fn prune(&self, events: &mut VecDeque<FailureEvent>, now: DateTime<Utc>) {
        let window = self.settings.window();
        while let Some(front) = events.front() {
            if Self::within(now, front.at, window) {
                break;
            }
            events.pop_front();
        }
        while events.len() > self.settings.event_capacity {
            events.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceEntry;
    use crate::resilience::BreakerConfig;

    fn catalog(names_and_providers: &[(&str, Option<&str>)]) -> Arc<SourceCatalog> {
        let entries = names_and_providers
            .iter()
            .map(|(name, provider)| SourceEntry {
                name: name.to_string(),
                provider: provider.map(String::from),
                ..Default::default()
            })
            .collect();
        Arc::new(SourceCatalog::from_entries(entries).unwrap())
    }

    fn correlator(catalog: Arc<SourceCatalog>, settings: CorrelationSettings) -> FailureCorrelator {
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
        FailureCorrelator::new(catalog, breakers, settings)
    }

    #[test]
    fn test_no_events_no_incidents() {
        let c = correlator(
            catalog(&[("a", None), ("b", None)]),
            CorrelationSettings::default(),
        );
        assert!(c.correlate().is_empty());
    }

    #[test]
    fn test_single_source_is_isolated() {
        let c = correlator(
            catalog(&[("a", None), ("b", None)]),
            CorrelationSettings::default(),
        );
        c.record_failure("a", ErrorClass::Transient);
        c.record_failure("a", ErrorClass::Timeout);

        let incidents = c.correlate();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].trigger, IncidentTrigger::FailureVolume);
        assert_eq!(incidents[0].tier, IncidentTier::Isolated);
        assert_eq!(incidents[0].sources, vec!["a".to_string()]);
        assert_eq!(incidents[0].event_count, 2);
    }

    #[test]
    fn test_two_sources_form_a_cluster() {
        let c = correlator(
            catalog(&[("a", None), ("b", None), ("c", None)]),
            CorrelationSettings::default(),
        );
        c.record_failure("a", ErrorClass::Transient);
        c.record_failure("b", ErrorClass::Permanent);

        let incidents = c.correlate();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].tier, IncidentTier::SourceCluster);
        assert_eq!(
            incidents[0].sources,
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_infrastructure_tier_at_threshold() {
        // 20 sources: ceil(0.10 * 20) = 2, floored to infrastructure_min 3
        let names: Vec<String> = (0..20).map(|i| format!("src-{i}")).collect();
        let entries: Vec<(&str, Option<&str>)> =
            names.iter().map(|n| (n.as_str(), None)).collect();
        let c = correlator(catalog(&entries), CorrelationSettings::default());

        c.record_failure("src-0", ErrorClass::Transient);
        c.record_failure("src-1", ErrorClass::Transient);
        let incidents = c.correlate();
        assert_eq!(incidents[0].tier, IncidentTier::SourceCluster);

        c.record_failure("src-2", ErrorClass::Timeout);
        let incidents = c.correlate();
        assert_eq!(incidents[0].tier, IncidentTier::Infrastructure);
    }

    #[test]
    fn test_fixed_threshold_overrides_fraction() {
        let settings = CorrelationSettings {
            fixed_source_threshold: Some(2),
            ..Default::default()
        };
        let c = correlator(catalog(&[("a", None), ("b", None), ("c", None)]), settings);
        c.record_failure("a", ErrorClass::Transient);
        c.record_failure("b", ErrorClass::Transient);

        let incidents = c.correlate();
        assert_eq!(incidents[0].tier, IncidentTier::Infrastructure);
    }

    #[test]
    fn test_provider_hint_when_shared() {
        let c = correlator(
            catalog(&[
                ("a", Some("acme-api")),
                ("b", Some("acme-api")),
                ("c", Some("other")),
            ]),
            CorrelationSettings::default(),
        );
        c.record_failure("a", ErrorClass::Transient);
        c.record_failure("b", ErrorClass::Transient);

        let incidents = c.correlate();
        assert_eq!(incidents[0].provider_hint.as_deref(), Some("acme-api"));

        // A third source on a different provider clears the hint
        c.record_failure("c", ErrorClass::Transient);
        let incidents = c.correlate();
        assert_eq!(incidents[0].provider_hint, None);
    }

    #[test]
    fn test_old_events_age_out() {
        let c = correlator(
            catalog(&[("a", None), ("b", None)]),
            CorrelationSettings::default(),
        );
        // Two hours old against a 30 minute window
        c.record_failure_at(
            "a",
            ErrorClass::Transient,
            Utc::now() - chrono::Duration::hours(2),
        );
        c.record_failure("b", ErrorClass::Transient);

        let incidents = c.correlate();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].sources, vec!["b".to_string()]);
        assert_eq!(incidents[0].tier, IncidentTier::Isolated);
    }

    #[test]
    fn test_event_capacity_bounds_buffer() {
        let settings = CorrelationSettings {
            event_capacity: 10,
            ..Default::default()
        };
        let c = correlator(catalog(&[("a", None)]), settings);
        for _ in 0..50 {
            c.record_failure("a", ErrorClass::Transient);
        }
        assert_eq!(c.event_count(), 10);
    }

    #[test]
    fn test_breaker_cascade_detected() {
        let catalog = catalog(&[("a", None), ("b", None), ("c", None)]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        }));
        let c = FailureCorrelator::new(
            catalog,
            breakers.clone(),
            CorrelationSettings::default(),
        );

        for source in ["a", "b"] {
            breakers.record_failure(source);
            breakers.record_failure(source);
            assert_eq!(breakers.state(source), Some(CircuitState::Open));
        }

        let incidents = c.correlate();
        let cascade = incidents
            .iter()
            .find(|i| i.trigger == IncidentTrigger::BreakerCascade)
            .expect("cascade incident");
        assert_eq!(cascade.tier, IncidentTier::SourceCluster);
        assert_eq!(cascade.sources, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_single_trip_is_not_a_cascade() {
        let catalog = catalog(&[("a", None), ("b", None)]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        }));
        let c = FailureCorrelator::new(
            catalog,
            breakers.clone(),
            CorrelationSettings::default(),
        );
        breakers.record_failure("a");

        let incidents = c.correlate();
        assert!(incidents
            .iter()
            .all(|i| i.trigger != IncidentTrigger::BreakerCascade));
    }
}
