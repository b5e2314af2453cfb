//! # Circuit Breaker Registry
//!
//! Name-keyed registry owning every circuit breaker in the process.
//! Breakers are created lazily on first use with the configuration
//! resolved for that source: a per-source override from the catalog when
//! one exists, the global defaults otherwise.
//!
//! The registry is the sanctioned way to touch breakers. Handing out the
//! same `Arc<CircuitBreaker>` for a given name makes per-source decisions
//! linearizable while keeping unrelated sources free of shared locks.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::catalog::SourceCatalog;
use crate::resilience::circuit_breaker::{
    Admission, BreakerConfig, BreakerSnapshot, BreakerStatus, BreakerTransition, CircuitBreaker,
    CircuitState,
};

/// Registry of per-source circuit breakers
#[derive(Debug)]
pub struct BreakerRegistry {
    defaults: BreakerConfig,
    overrides: HashMap<String, BreakerConfig>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    /// Create a registry where every breaker uses the same defaults
    pub fn new(defaults: BreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: DashMap::new(),
        }
    }

    /// Create a registry with per-source overrides taken from the catalog.
    ///
    /// Sources with heterogeneous recovery characteristics get independent
    /// open durations this way; everything else inherits the defaults.
    pub fn from_catalog(defaults: BreakerConfig, catalog: &SourceCatalog) -> Self {
        let overrides = catalog
            .iter()
            .filter_map(|entry| {
                entry
                    .breaker
                    .as_ref()
                    .map(|settings| (entry.name.clone(), BreakerConfig::from_settings(settings)))
            })
            .collect();

        Self {
            defaults,
            overrides,
            breakers: DashMap::new(),
        }
    }

    /// Get or lazily create the breaker for a source
    pub fn breaker(&self, source: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(source) {
            return existing.clone();
        }

        let config = self
            .overrides
            .get(source)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone());

        self.breakers
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(source, config)))
            .value()
            .clone()
    }

    /// Ask whether a call to the source may proceed
    pub fn admit(&self, source: &str) -> Admission {
        self.breaker(source).admit()
    }

    /// Release an admission whose call was never made
    pub fn release(&self, source: &str) {
        if let Some(breaker) = self.breakers.get(source) {
            breaker.release();
        }
    }

    /// Record a successful call against the source
    pub fn record_success(&self, source: &str) {
        self.breaker(source).record_success();
    }

    /// Record a failed call against the source
    pub fn record_failure(&self, source: &str) {
        self.breaker(source).record_failure();
    }

    /// Current state of a source's breaker, if one exists yet
    pub fn state(&self, source: &str) -> Option<CircuitState> {
        self.breakers.get(source).map(|b| b.state())
    }

    /// Status of a source's breaker, if one exists yet
    pub fn status(&self, source: &str) -> Option<BreakerStatus> {
        self.breakers.get(source).map(|b| b.status())
    }

    /// Status of every breaker in the registry
    pub fn status_all(&self) -> Vec<BreakerStatus> {
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        handles.iter().map(|b| b.status()).collect()
    }

    /// All transitions recorded within the trailing window, oldest first
    pub fn transitions_within(&self, window: Duration) -> Vec<BreakerTransition> {
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        let mut transitions: Vec<BreakerTransition> = handles
            .iter()
            .flat_map(|b| b.transitions_within(window))
            .collect();
        transitions.sort_by_key(|t| t.at);
        transitions
    }

    /// Force a source's breaker open (operational override)
    pub fn force_open(&self, source: &str, reason: &str) {
        self.breaker(source).force_open(reason);
    }

    /// Force a source's breaker closed (operational override)
    pub fn force_close(&self, source: &str, reason: &str) {
        self.breaker(source).force_close(reason);
    }

    /// Snapshot every breaker for restart persistence
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let handles: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();
        handles.iter().map(|b| b.snapshot()).collect()
    }

    /// Restore breakers from persisted snapshots.
    ///
    /// Breakers are created as needed with their resolved configuration;
    /// snapshots for sources no longer configured still restore so their
    /// open windows keep protecting a renamed-back source.
    pub fn restore(&self, snapshots: &[BreakerSnapshot]) {
        for snapshot in snapshots {
            self.breaker(&snapshot.source).restore(snapshot);
        }
        debug!(count = snapshots.len(), "Circuit breaker registry restored");
    }

    /// Number of breakers created so far
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether any breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
