//! # Runtime Bootstrap
//!
//! ## Overview
//!
//! [`VigilRuntime`] assembles the whole platform from one validated
//! configuration: catalog, breaker registry, rate limiter, run log,
//! canaries, correlator, health scorer, lifecycle orchestrator, and poll
//! coordinator, wired together the same way every time.
//!
//! Construction is fail-closed: an invalid configuration refuses to
//! build anything. Embedding applications are expected to call
//! [`crate::logging::init_structured_logging`] before building the
//! runtime if they want file-backed logs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil_core::config::{SourceEntry, VigilConfig};
//! use vigil_core::runtime::VigilRuntime;
//!
//! # fn main() -> vigil_core::error::Result<()> {
//! let mut config = VigilConfig::default();
//! config.sources.push(SourceEntry {
//!     name: "sanctions-feed".to_string(),
//!     critical: true,
//!     ..Default::default()
//! });
//!
//! let runtime = VigilRuntime::from_config(config)?;
//! let score = runtime.health_score();
//! println!("platform health: {:.1} ({})", score.score, score.band);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use tracing::info;

use crate::catalog::SourceCatalog;
use crate::config::{ConfigManager, VigilConfig};
use crate::error::Result;
use crate::health::canary::{CanaryAssertion, CanaryRegistry};
use crate::health::correlator::{CorrelatedIncident, FailureCorrelator};
use crate::health::scorer::{CompositeHealthScore, HealthScorer};
use crate::pipeline::coordinator::{CycleReport, PollCoordinator, SourceFetcher};
use crate::pipeline::orchestrator::LifecycleOrchestrator;
use crate::pipeline::run_log::{InMemoryRunLog, RunLog};
use crate::pipeline::state_store::{JsonFileStateStore, StateStore};
use crate::resilience::{
    BreakerConfig, BreakerRegistry, RateLimitConfig, RateLimiter, RetryPolicy,
};

/// The assembled platform
pub struct VigilRuntime {
    config: VigilConfig,
    catalog: Arc<SourceCatalog>,
    breakers: Arc<BreakerRegistry>,
    limiter: Arc<RateLimiter>,
    run_log: Arc<InMemoryRunLog>,
    canaries: Arc<CanaryRegistry>,
    correlator: Arc<FailureCorrelator>,
    scorer: HealthScorer,
    orchestrator: Arc<LifecycleOrchestrator>,
    coordinator: PollCoordinator,
}

/// Manual impl: several components hold `dyn` trait objects, so `Debug`
/// cannot be derived field-by-field.
impl std::fmt::Debug for VigilRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VigilRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VigilRuntime {
    /// Build the runtime from a configuration, validating it first
    pub fn from_config(config: VigilConfig) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(SourceCatalog::from_entries(config.sources.clone())?);
        let breakers = Arc::new(BreakerRegistry::from_catalog(
            BreakerConfig::from_settings(&config.resilience.breaker),
            &catalog,
        ));
        let limiter = Arc::new(RateLimiter::from_catalog(
            RateLimitConfig::from_settings(&config.resilience.rate_limit),
            &catalog,
        ));
        let run_log = Arc::new(InMemoryRunLog::new(config.scheduler.run_log_capacity));
        let canaries = Arc::new(CanaryRegistry::new());
        let correlator = Arc::new(FailureCorrelator::new(
            catalog.clone(),
            breakers.clone(),
            config.correlation.clone(),
        ));
        let scorer = HealthScorer::new(
            catalog.clone(),
            breakers.clone(),
            run_log.clone() as Arc<dyn RunLog>,
            config.health.clone(),
        );
        let orchestrator = Arc::new(LifecycleOrchestrator::new(
            catalog.clone(),
            breakers.clone(),
            limiter.clone(),
            run_log.clone() as Arc<dyn RunLog>,
            canaries.clone(),
            correlator.clone(),
            RetryPolicy::from_settings(&config.resilience.retry),
            config.scheduler.run_timeout(),
        ));
        let state_store: Option<Arc<dyn StateStore>> = config
            .persistence
            .state_file
            .as_ref()
            .map(|path| Arc::new(JsonFileStateStore::new(path)) as Arc<dyn StateStore>);
        let coordinator = PollCoordinator::new(
            catalog.clone(),
            orchestrator.clone(),
            breakers.clone(),
            limiter.clone(),
            canaries.clone(),
            state_store,
            config.scheduler.max_concurrent_sources,
        );

        info!(
            sources = catalog.len(),
            critical = catalog.critical_names().len(),
            persistence = config.persistence.state_file.is_some(),
            "🛡️ Vigil runtime assembled"
        );

        Ok(Self {
            config,
            catalog,
            breakers,
            limiter,
            run_log,
            canaries,
            correlator,
            scorer,
            orchestrator,
            coordinator,
        })
    }

    /// Build the runtime from the YAML configuration on disk
    pub fn load() -> Result<Self> {
        let manager = ConfigManager::load()?;
        Self::from_config(manager.config().clone())
    }

    /// Register the fetcher implementation for a cataloged source
    pub fn register_fetcher(
        &self,
        source: impl Into<String>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<()> {
        self.coordinator.register_fetcher(source, fetcher)
    }

    /// Register a canary assertion for a source
    pub fn register_canary(&self, source: impl Into<String>, assertion: CanaryAssertion) {
        self.canaries.register(source, assertion);
    }

    /// Poll every cataloged source once
    pub async fn run_cycle(&self) -> CycleReport {
        self.coordinator.run_cycle().await
    }

    /// Compute the composite health score from current state
    pub fn health_score(&self) -> CompositeHealthScore {
        self.scorer.score()
    }

    /// Correlate recent failures into classified incidents
    pub fn correlate_failures(&self) -> Vec<CorrelatedIncident> {
        self.correlator.correlate()
    }

    /// Persist resilience state through the configured store
    pub fn persist_state(&self) -> Result<()> {
        self.coordinator.persist_state()
    }

    /// Restore resilience state from the configured store; returns
    /// whether a snapshot was applied
    pub fn restore_state(&self) -> Result<bool> {
        self.coordinator.restore_state()
    }

    /// Critical sources lacking canary coverage
    pub fn validate_canary_coverage(&self) -> Vec<String> {
        self.coordinator.validate_canary_coverage()
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn run_log(&self) -> Arc<dyn RunLog> {
        self.run_log.clone()
    }

    pub fn orchestrator(&self) -> &LifecycleOrchestrator {
        &self.orchestrator
    }

    pub fn coordinator(&self) -> &PollCoordinator {
        &self.coordinator
    }
}
