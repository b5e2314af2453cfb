//! # Run Log
//!
//! The persistence seam for run outcomes. The orchestrator records every
//! [`RunOutcome`] here; the health scorer and correlator read history back
//! through the same trait, so swapping the in-memory log for a database-
//! backed one changes no scoring semantics.
//!
//! Query methods are infallible by design: an implementation that cannot
//! reach its store should log the fault and return empty results, which
//! downstream scoring treats as absence of evidence, never as health.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;

use crate::constants::{defaults, RunStatus};
use crate::error::Result;
use crate::pipeline::outcome::RunOutcome;

/// Store and query run outcomes
pub trait RunLog: Send + Sync {
    /// Persist one outcome
    fn record(&self, outcome: &RunOutcome) -> Result<()>;

    /// Outcomes that finished within the trailing window, oldest first
    fn recent(&self, window: Duration) -> Vec<RunOutcome>;

    /// The most recent outcome for a source, regardless of status
    fn last_outcome(&self, source: &str) -> Option<RunOutcome>;

    /// When the source last finished a non-error run. Zero-record runs
    /// count: the fetch worked even if nothing was there to fetch.
    fn last_success_at(&self, source: &str) -> Option<DateTime<Utc>>;
}

/// Bounded in-memory run log.
///
/// Keeps the most recent `capacity` outcomes in arrival order. Suitable
/// for single-process deployments and tests; production systems that need
/// durable history put a database behind the [`RunLog`] trait instead.
#[derive(Debug)]
pub struct InMemoryRunLog {
    capacity: usize,
    entries: RwLock<VecDeque<RunOutcome>>,
}

impl InMemoryRunLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(defaults::RUN_LOG_CAPACITY)
    }

    /// Number of retained outcomes
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl RunLog for InMemoryRunLog {
    fn record(&self, outcome: &RunOutcome) -> Result<()> {
        let mut entries = self.entries.write();
        entries.push_back(outcome.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    fn recent(&self, window: Duration) -> Vec<RunOutcome> {
        let now = Utc::now();
        self.entries
            .read()
            .iter()
            .filter(|outcome| {
                now.signed_duration_since(outcome.finished_at)
                    .to_std()
                    .map(|age| age <= window)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    fn last_outcome(&self, source: &str) -> Option<RunOutcome> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|outcome| outcome.source == source)
            .cloned()
    }

    fn last_success_at(&self, source: &str) -> Option<DateTime<Utc>> {
        self.entries
            .read()
            .iter()
            .rev()
            .find(|outcome| outcome.source == source && outcome.status != RunStatus::Error)
            .map(|outcome| outcome.finished_at)
    }
}
