//! # Token Bucket Rate Limiter
//!
//! Per-source token buckets enforcing polite request pacing against rate-
//! limited dependencies. Buckets refill lazily: tokens owed for elapsed
//! time are credited when the bucket is next touched, so idle sources cost
//! nothing between runs.
//!
//! `try_acquire` never blocks and never queues. A denied caller decides
//! for itself whether to back off and retry; the run orchestrator
//! delegates that to the retry executor.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::catalog::SourceCatalog;
use crate::config::RateLimitSettings;
use crate::constants::defaults;

/// Token bucket tuning parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Burst capacity; a full bucket allows this many unit-cost calls
    pub capacity: f64,
    /// Steady-state refill rate in tokens per second
    pub refill_per_second: f64,
}

impl RateLimitConfig {
    /// Convert from the YAML settings form
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            capacity: settings.capacity,
            refill_per_second: settings.refill_per_second,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::BUCKET_CAPACITY,
            refill_per_second: defaults::BUCKET_REFILL_PER_SECOND,
        }
    }
}

/// Serializable bucket state for restart persistence. Elapsed downtime is
/// credited on restore using the envelope's capture timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub source: String,
    pub tokens: f64,
}

/// One source's bucket; lives inside the limiter's concurrent map
#[derive(Debug)]
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            capacity: config.capacity,
            // Buckets start full so the first poll of a source never waits
            tokens: config.capacity,
            refill_per_second: config.refill_per_second,
            last_refill: Instant::now(),
        }
    }

    /// Credit tokens owed for time elapsed since the last touch
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self, cost: f64) -> bool {
        self.refill(Instant::now());
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }
}

/// Per-source token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    defaults: RateLimitConfig,
    overrides: HashMap<String, RateLimitConfig>,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    /// Create a limiter where every bucket uses the same defaults
    pub fn new(defaults: RateLimitConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            buckets: DashMap::new(),
        }
    }

    /// Create a limiter with per-source overrides taken from the catalog
    pub fn from_catalog(defaults: RateLimitConfig, catalog: &SourceCatalog) -> Self {
        let overrides = catalog
            .iter()
            .filter_map(|entry| {
                entry
                    .rate_limit
                    .as_ref()
                    .map(|settings| (entry.name.clone(), RateLimitConfig::from_settings(settings)))
            })
            .collect();

        Self {
            defaults,
            overrides,
            buckets: DashMap::new(),
        }
    }

    fn config_for(&self, source: &str) -> &RateLimitConfig {
        self.overrides.get(source).unwrap_or(&self.defaults)
    }

    /// Try to take `cost` tokens from the source's bucket.
    ///
    /// Returns false without blocking when the bucket cannot cover the
    /// cost. A cost above the bucket's capacity can never succeed and is
    /// reported as a plain denial.
    pub fn try_acquire(&self, source: &str, cost: f64) -> bool {
        let config = self.config_for(source).clone();
        if cost > config.capacity {
            debug!(
                source = %source,
                cost = cost,
                capacity = config.capacity,
                "Rate limit cost exceeds bucket capacity; denying"
            );
            return false;
        }

        let mut bucket = self
            .buckets
            .entry(source.to_string())
            .or_insert_with(|| TokenBucket::new(&config));
        let acquired = bucket.try_acquire(cost);

        trace!(
            source = %source,
            cost = cost,
            remaining = bucket.tokens,
            acquired = acquired,
            "Rate limit acquisition"
        );
        acquired
    }

    /// Convenience form of [`Self::try_acquire`] with unit cost
    pub fn try_acquire_one(&self, source: &str) -> bool {
        self.try_acquire(source, 1.0)
    }

    /// Tokens currently available for a source, after crediting elapsed
    /// time. A source never seen reports its configured capacity.
    pub fn available(&self, source: &str) -> f64 {
        match self.buckets.get_mut(source) {
            Some(mut bucket) => {
                bucket.refill(Instant::now());
                bucket.tokens
            }
            None => self.config_for(source).capacity,
        }
    }

    /// Snapshot every bucket for restart persistence. Buckets are brought
    /// current first so the snapshot needs only one timestamp.
    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let now = Instant::now();
        let mut snapshots = Vec::with_capacity(self.buckets.len());
        for mut entry in self.buckets.iter_mut() {
            entry.refill(now);
            snapshots.push(BucketSnapshot {
                source: entry.key().clone(),
                tokens: entry.tokens,
            });
        }
        snapshots
    }

    /// Restore buckets from persisted snapshots, crediting refill for the
    /// downtime between `taken_at` and now.
    pub fn restore(&self, snapshots: &[BucketSnapshot], taken_at: DateTime<Utc>) {
        let downtime = Utc::now()
            .signed_duration_since(taken_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        for snapshot in snapshots {
            let config = self.config_for(&snapshot.source).clone();
            let credited = (snapshot.tokens + downtime.as_secs_f64() * config.refill_per_second)
                .min(config.capacity)
                .max(0.0);
            self.buckets.insert(
                snapshot.source.clone(),
                TokenBucket {
                    capacity: config.capacity,
                    tokens: credited,
                    refill_per_second: config.refill_per_second,
                    last_refill: Instant::now(),
                },
            );
        }
        debug!(count = snapshots.len(), "Rate limiter buckets restored");
    }
}
