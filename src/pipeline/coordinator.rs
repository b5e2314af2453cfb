//! # Poll Coordinator
//!
//! Fans one poll cycle out across the catalog with bounded concurrency.
//! Every cataloged source with a registered fetcher is driven through the
//! lifecycle orchestrator; sources without one are reported rather than
//! silently skipped. The coordinator also owns restart persistence for
//! the resilience layer, so breaker windows and token debts survive a
//! process restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::catalog::SourceCatalog;
use crate::constants::events;
use crate::error::Result;
use crate::health::canary::CanaryRegistry;
use crate::logging;
use crate::pipeline::orchestrator::LifecycleOrchestrator;
use crate::pipeline::outcome::{FetchReport, RunOutcome};
use crate::pipeline::state_store::{ResilienceSnapshot, StateStore};
use crate::resilience::{BreakerRegistry, RateLimiter};

/// A source integration: fetches one batch of records from upstream.
///
/// Implementations do their own request building and parsing; resilience
/// concerns (admission, rate limits, timeouts, retries) belong to the
/// coordinator and must not be duplicated inside `fetch`.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchReport>;
}

/// What one poll cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcomes in completion order
    pub outcomes: Vec<RunOutcome>,
    /// Cataloged sources that had no fetcher registered this cycle
    pub unfetchable: Vec<String>,
}

impl CycleReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_error()).count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_error()).count()
    }

    /// A clean cycle polled every cataloged source without errors
    pub fn is_clean(&self) -> bool {
        self.unfetchable.is_empty() && self.error_count() == 0
    }
}

/// Drives poll cycles over the catalog
pub struct PollCoordinator {
    catalog: Arc<SourceCatalog>,
    orchestrator: Arc<LifecycleOrchestrator>,
    breakers: Arc<BreakerRegistry>,
    limiter: Arc<RateLimiter>,
    canaries: Arc<CanaryRegistry>,
    fetchers: RwLock<HashMap<String, Arc<dyn SourceFetcher>>>,
    state_store: Option<Arc<dyn StateStore>>,
    max_concurrent: usize,
}

impl PollCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<SourceCatalog>,
        orchestrator: Arc<LifecycleOrchestrator>,
        breakers: Arc<BreakerRegistry>,
        limiter: Arc<RateLimiter>,
        canaries: Arc<CanaryRegistry>,
        state_store: Option<Arc<dyn StateStore>>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            catalog,
            orchestrator,
            breakers,
            limiter,
            canaries,
            fetchers: RwLock::new(HashMap::new()),
            state_store,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Register the fetcher for a cataloged source.
    ///
    /// Registration for a name outside the catalog is refused; the
    /// catalog is the authority on what this platform may poll.
    pub fn register_fetcher(
        &self,
        source: impl Into<String>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<()> {
        let source = source.into();
        if !self.catalog.contains(&source) {
            return Err(crate::error::VigilError::configuration(
                "coordinator",
                format!("cannot register fetcher for uncataloged source '{source}'"),
            ));
        }
        self.fetchers.write().insert(source, fetcher);
        Ok(())
    }

    /// Sources with a registered fetcher, in no particular order
    pub fn registered_sources(&self) -> Vec<String> {
        self.fetchers.read().keys().cloned().collect()
    }

    /// Poll every cataloged source once, at most `max_concurrent` at a
    /// time. Failures are isolated per source; one bad feed never stops
    /// the rest of the cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();

        let registered = self.fetchers.read().clone();
        let mut jobs: Vec<(String, Arc<dyn SourceFetcher>)> = Vec::new();
        let mut unfetchable = Vec::new();
        for name in self.catalog.names() {
            match registered.get(name) {
                Some(fetcher) => jobs.push((name.to_string(), fetcher.clone())),
                None => {
                    error!(
                        cycle_id = %cycle_id,
                        source = %name,
                        "Cataloged source has no fetcher registered; skipping"
                    );
                    unfetchable.push(name.to_string());
                }
            }
        }

        info!(
            cycle_id = %cycle_id,
            sources = jobs.len(),
            unfetchable = unfetchable.len(),
            max_concurrent = self.max_concurrent,
            "🔄 Poll cycle starting"
        );

        let outcomes: Vec<RunOutcome> = stream::iter(jobs)
            .map(|(name, fetcher)| async move {
                self.orchestrator
                    .wrap(&name, || {
                        let fetcher = fetcher.clone();
                        async move { fetcher.fetch().await }
                    })
                    .await
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let report = CycleReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            unfetchable,
        };

        info!(
            cycle_id = %cycle_id,
            succeeded = report.success_count(),
            errored = report.error_count(),
            unfetchable = report.unfetchable.len(),
            duration_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "🔄 Poll cycle finished"
        );

        report
    }

    /// Persist breaker and bucket state through the configured store.
    /// A no-op when persistence is disabled.
    pub fn persist_state(&self) -> Result<()> {
        let Some(store) = &self.state_store else {
            return Ok(());
        };
        let snapshot =
            ResilienceSnapshot::new(self.breakers.snapshot(), self.limiter.snapshot());
        store.save(&snapshot)?;
        info!(
            event = events::STATE_PERSISTED,
            breakers = snapshot.breakers.len(),
            buckets = snapshot.buckets.len(),
            "💾 Resilience state persisted"
        );
        Ok(())
    }

    /// Restore breaker and bucket state from the configured store.
    ///
    /// Returns whether a snapshot was applied. A corrupt or unreadable
    /// snapshot is logged and skipped: starting fresh is safe because
    /// breakers re-learn failure state quickly, while refusing to start
    /// is not.
    pub fn restore_state(&self) -> Result<bool> {
        let Some(store) = &self.state_store else {
            return Ok(false);
        };
        match store.load() {
            Ok(Some(snapshot)) => {
                self.breakers.restore(&snapshot.breakers);
                self.limiter.restore(&snapshot.buckets, snapshot.taken_at);
                info!(
                    event = events::STATE_RESTORED,
                    breakers = snapshot.breakers.len(),
                    buckets = snapshot.buckets.len(),
                    taken_at = %snapshot.taken_at.to_rfc3339(),
                    "💾 Resilience state restored"
                );
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(error) => {
                logging::log_error(
                    "state_store",
                    "load",
                    &error.to_string(),
                    Some("continuing with fresh resilience state"),
                );
                Ok(false)
            }
        }
    }

    /// Critical sources with no canary assertions registered
    pub fn validate_canary_coverage(&self) -> Vec<String> {
        self.canaries.validate_coverage(&self.catalog)
    }
}
