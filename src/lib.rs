#![allow(clippy::doc_markdown)] // Allow technical terms like YAML, JSON in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Vigil Core
//!
//! Resilience and health-observability runtime for a fail-closed
//! intelligence-monitoring platform.
//!
//! ## Overview
//!
//! Vigil Core sits between a polling scheduler and a fleet of upstream
//! data sources (sanctions lists, corporate registries, disclosure
//! feeds) whose availability cannot be trusted. Every fetch passes
//! through circuit-breaker admission, token-bucket rate limiting, a
//! per-attempt timeout, and classified retry with exponential backoff.
//! Every outcome, including rejections, is recorded and feeds a
//! composite health score, time-windowed failure correlation, and
//! advisory canary assertions.
//!
//! The design bias is fail-closed throughout: unknown sources are
//! refused, missing evidence never reads as health, and a collapsed
//! dimension caps the composite score instead of hiding behind the
//! average.
//!
//! ## Architecture
//!
//! The lifecycle orchestrator is the single integration point. It is the
//! only component that consults breakers for admission and the only
//! writer of run outcomes, so the admission protocol (admit, then
//! exactly one of release or record) lives in one place. Read-side
//! components (scorer, correlator, canaries) observe state but never
//! gate execution.
//!
//! ## Module Organization
//!
//! - [`catalog`] - The approved-source allow-list
//! - [`config`] - YAML configuration with environment overlays
//! - [`constants`] - Event names, status enums, and default values
//! - [`error`] - Classified error taxonomy driving retry and correlation
//! - [`health`] - Composite scoring, failure correlation, canaries
//! - [`logging`] - Structured logging to console and JSON files
//! - [`pipeline`] - Run lifecycle, poll cycles, outcome history, persistence
//! - [`resilience`] - Circuit breakers, rate limiting, retry with backoff
//! - [`runtime`] - One-call assembly of the whole platform
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use vigil_core::config::{SourceEntry, VigilConfig};
//! use vigil_core::error::Result;
//! use vigil_core::pipeline::{FetchReport, SourceFetcher};
//! use vigil_core::runtime::VigilRuntime;
//!
//! struct SanctionsFetcher;
//!
//! #[async_trait]
//! impl SourceFetcher for SanctionsFetcher {
//!     async fn fetch(&self) -> Result<FetchReport> {
//!         // request, parse, count records
//!         Ok(FetchReport::records(128))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let mut config = VigilConfig::default();
//! config.sources.push(SourceEntry {
//!     name: "sanctions-feed".to_string(),
//!     critical: true,
//!     expected_interval_minutes: Some(60),
//!     ..Default::default()
//! });
//!
//! let runtime = VigilRuntime::from_config(config)?;
//! runtime.register_fetcher("sanctions-feed", Arc::new(SanctionsFetcher))?;
//!
//! let report = runtime.run_cycle().await;
//! let score = runtime.health_score();
//! println!("cycle: {} ok, health {:.1}", report.success_count(), score.score);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod logging;
pub mod pipeline;
pub mod resilience;
pub mod runtime;

pub use catalog::SourceCatalog;
pub use config::{ConfigManager, SourceEntry, VigilConfig};
pub use constants::{HealthBand, RunStatus};
pub use constants::events as system_events;
pub use error::{ErrorClass, Result, VigilError};
pub use health::{
    CanaryAssertion, CanaryRegistry, CanaryVerdict, CompositeHealthScore, CorrelatedIncident,
    FailureCorrelator, HealthScorer, IncidentTier,
};
pub use pipeline::{
    CycleReport, FetchReport, LifecycleOrchestrator, PollCoordinator, RunLog, RunOutcome,
    SourceFetcher,
};
pub use resilience::{
    Admission, BreakerRegistry, CircuitBreaker, CircuitState, RateLimiter, RetryPolicy,
};
pub use runtime::VigilRuntime;
