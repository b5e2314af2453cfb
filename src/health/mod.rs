//! # Health Observability
//!
//! ## Overview
//!
//! Read-side health machinery layered over the run log and the breaker
//! registry:
//!
//! - **Scorer**: composite 0-100 platform score from freshness, error
//!   rate, breaker posture, and coverage, with fail-closed handling of
//!   missing evidence
//! - **Correlator**: time-windowed grouping of execution failures into
//!   classified incidents, with provider attribution when the affected
//!   sources share one
//! - **Canaries**: advisory per-source assertions that catch silent data
//!   problems after otherwise successful runs
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use vigil_core::catalog::SourceCatalog;
//! use vigil_core::config::{HealthSettings, SourceEntry};
//! use vigil_core::health::HealthScorer;
//! use vigil_core::pipeline::run_log::InMemoryRunLog;
//! use vigil_core::resilience::{BreakerConfig, BreakerRegistry};
//!
//! let catalog = Arc::new(SourceCatalog::from_entries(vec![SourceEntry {
//!     name: "sanctions-feed".to_string(),
//!     ..Default::default()
//! }]).unwrap());
//! let breakers = Arc::new(BreakerRegistry::new(BreakerConfig::default()));
//! let run_log = Arc::new(InMemoryRunLog::with_default_capacity());
//!
//! let scorer = HealthScorer::new(catalog, breakers, run_log, HealthSettings::default());
//! let composite = scorer.score();
//! assert_eq!(composite.score, 0.0); // nothing observed yet
//! ```

pub mod canary;
pub mod correlator;
pub mod scorer;

pub use canary::{CanaryAssertion, CanaryCheck, CanaryRegistry, CanaryResult, CanaryVerdict};
pub use correlator::{
    CorrelatedIncident, FailureCorrelator, FailureEvent, IncidentTier, IncidentTrigger,
};
pub use scorer::{CompositeHealthScore, DimensionKind, HealthDimension, HealthScorer};
