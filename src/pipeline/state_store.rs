//! # Resilience State Store
//!
//! Persistence seam for circuit breaker and token bucket state. Snapshots
//! taken at shutdown are restored at startup so open breakers stay open
//! across process restarts instead of resetting to closed and hammering a
//! still-broken dependency.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::resilience::{BreakerSnapshot, BucketSnapshot};

/// Everything the resilience layer persists across restarts.
///
/// `taken_at` anchors the whole envelope to the wall clock: restore logic
/// credits rate limiter refill for the downtime and resumes breaker open
/// windows from where they left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub breakers: Vec<BreakerSnapshot>,
    pub buckets: Vec<BucketSnapshot>,
}

impl ResilienceSnapshot {
    pub fn new(breakers: Vec<BreakerSnapshot>, buckets: Vec<BucketSnapshot>) -> Self {
        Self {
            taken_at: Utc::now(),
            breakers,
            buckets,
        }
    }
}

/// Save and load resilience snapshots
pub trait StateStore: Send + Sync {
    fn save(&self, snapshot: &ResilienceSnapshot) -> Result<()>;

    /// Load the latest snapshot; None when nothing has been saved yet
    fn load(&self) -> Result<Option<ResilienceSnapshot>>;
}

/// Single-slot in-memory store for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    slot: Mutex<Option<ResilienceSnapshot>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn save(&self, snapshot: &ResilienceSnapshot) -> Result<()> {
        *self.slot.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ResilienceSnapshot>> {
        Ok(self.slot.lock().clone())
    }
}

/// JSON file-backed store.
///
/// Writes go to a sibling temp file first and rename into place, so a
/// crash mid-save leaves the previous snapshot intact.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStateStore {
    fn save(&self, snapshot: &ResilienceSnapshot) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&tmp_path, &serialized)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(
            path = %self.path.display(),
            breakers = snapshot.breakers.len(),
            buckets = snapshot.buckets.len(),
            "Resilience snapshot written"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<ResilienceSnapshot>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let snapshot: ResilienceSnapshot = serde_json::from_slice(&bytes)?;
                Ok(Some(snapshot))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
